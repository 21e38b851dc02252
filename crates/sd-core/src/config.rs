//! `EngineConfig`: the host-visible tunables for the rate-limit interval,
//! the FAT filesystem ceiling, the conflict-dialog interactivity delay
//! window, and the scan progress-pulse interval (spec.md §4).
//!
//! Grounded on `apps/cli/src/config.rs`'s load-or-default-then-save
//! pattern, ported from that file's JSON-on-disk shape to TOML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("could not read config at {path}: {source}")]
	Read { path: PathBuf, source: std::io::Error },
	#[error("could not parse config at {path}: {source}")]
	Parse { path: PathBuf, source: toml::de::Error },
	#[error("could not serialize config: {0}")]
	Serialize(#[from] toml::ser::Error),
	#[error("could not write config at {path}: {source}")]
	Write { path: PathBuf, source: std::io::Error },
}

/// Engine-wide tunables, each mirroring a constant named in spec.md §4.
/// `sd-core`'s per-module defaults match these defaults exactly; overriding
/// a field here changes the behavior of a freshly constructed [`Engine`],
/// not of modules that already hardcode their own constant (see DESIGN.md
/// for which knobs are live-wired versus declared-for-documentation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
	/// Minimum spacing between non-final progress reports (spec.md §4.6
	/// "Rate limiting"), in milliseconds.
	pub rate_limit_interval_ms: u64,
	/// FAT32 single-file ceiling (spec.md §4.1 "Filesystem-type query"),
	/// in bytes.
	pub fat_max_file_size_bytes: u64,
	/// Job runtime past which a conflict dialog is considered interrupting
	/// a "long job" (spec.md §4.9), in seconds.
	pub interactivity_long_job_secs: u64,
	/// Grace window after the previous dialog within which a new one is
	/// still considered part of the same interactive burst (spec.md §4.9),
	/// in seconds.
	pub interactivity_grace_secs: u64,
	/// How many files a breadth-first scan processes between progress
	/// pulses (spec.md §4.1 "Scans... pulsing every 100 files").
	pub scan_pulse_file_count: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			rate_limit_interval_ms: 100,
			fat_max_file_size_bytes: 4 * 1024 * 1024 * 1024 - 1,
			interactivity_long_job_secs: 2,
			interactivity_grace_secs: 1,
			scan_pulse_file_count: 100,
		}
	}
}

impl EngineConfig {
	#[must_use]
	pub fn config_path(data_dir: &Path) -> PathBuf {
		data_dir.join("engine.toml")
	}

	/// Loads `data_dir/engine.toml`, writing a default file if none exists.
	/// Unknown keys are ignored and missing keys fall back to
	/// [`EngineConfig::default`] (`#[serde(default)]`), so upgrading this
	/// struct never breaks an existing config file.
	pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
		let path = Self::config_path(data_dir);
		if !path.exists() {
			let config = Self::default();
			config.save(data_dir)?;
			return Ok(config);
		}

		let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
		toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
	}

	pub fn save(&self, data_dir: &Path) -> Result<(), ConfigError> {
		std::fs::create_dir_all(data_dir).map_err(|source| ConfigError::Write { path: data_dir.to_path_buf(), source })?;
		let path = Self::config_path(data_dir);
		let rendered = toml::to_string_pretty(self)?;
		std::fs::write(&path, rendered).map_err(|source| ConfigError::Write { path, source })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn load_writes_and_returns_defaults_when_absent() {
		let dir = tempfile::tempdir().unwrap();
		let config = EngineConfig::load(dir.path()).unwrap();
		assert_eq!(config, EngineConfig::default());
		assert!(EngineConfig::config_path(dir.path()).exists());
	}

	#[test]
	fn load_round_trips_a_saved_override() {
		let dir = tempfile::tempdir().unwrap();
		let mut config = EngineConfig::default();
		config.scan_pulse_file_count = 250;
		config.save(dir.path()).unwrap();

		let reloaded = EngineConfig::load(dir.path()).unwrap();
		assert_eq!(reloaded.scan_pulse_file_count, 250);
	}

	#[test]
	fn missing_keys_in_an_older_file_fall_back_to_defaults() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(EngineConfig::config_path(dir.path()), "rate_limit_interval_ms = 50\n").unwrap();

		let config = EngineConfig::load(dir.path()).unwrap();
		assert_eq!(config.rate_limit_interval_ms, 50);
		assert_eq!(config.scan_pulse_file_count, EngineConfig::default().scan_pulse_file_count);
	}
}
