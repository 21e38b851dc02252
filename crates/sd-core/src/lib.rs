//! Aggregator crate (SPEC_FULL.md §2.1): wires the filesystem, archive,
//! dialog, undo, power, recent-files, mount-eject and clipboard
//! capabilities into one [`sd_file_actions::Deps`], owns the process-wide
//! change queue, and supervises the per-directory monitors that feed it.
//!
//! Grounded on `core/Cargo.toml`'s role as the crate every other surface
//! (the CLI, a future GUI host) depends on, trimmed to this port's actual
//! scope: no database, no sync, no library/location model — just the
//! file-operations engine.

pub mod config;

use std::{collections::HashMap, path::{Path, PathBuf}, sync::Arc};

use sd_core_change_queue::ChangeQueue;
use sd_core_dialog::DialogService;
use sd_core_dir_monitor::{DirMonitorError, DirectoryMonitor};
use sd_file_actions::Deps;

pub use config::{ConfigError, EngineConfig};

/// Owns one [`Deps`] bundle plus the directory monitors watching
/// directories the UI currently has open (spec.md §4.8). Every
/// `sd_file_actions` entry point is called as `sd_file_actions::copy_async(&engine.deps, ...)`;
/// this type's job is lifetime management of the monitors and the shared
/// [`ChangeQueue`] they and every job feed.
pub struct Engine {
	pub deps: Deps,
	pub config: EngineConfig,
	monitors: std::sync::Mutex<HashMap<PathBuf, DirectoryMonitor>>,
}

impl Engine {
	/// Builds an engine over the real local filesystem and archive codecs,
	/// with `dialog` as the conflict/error interaction backend (usually
	/// [`sd_core_dialog::ChannelDialogService`] for a real UI, or
	/// [`sd_core_dialog::PolicyDialogService`] for headless hosts).
	#[must_use]
	pub fn new(dialog: Arc<dyn DialogService>, config: EngineConfig) -> Self {
		Self { deps: Deps::local(dialog), config, monitors: std::sync::Mutex::new(HashMap::new()) }
	}

	#[must_use]
	pub fn change_queue(&self) -> &ChangeQueue {
		&self.deps.changes
	}

	/// Starts watching `dir` (spec.md §4.8); idempotent, replacing any
	/// existing monitor for the same path. `non_native` augments the
	/// watch with the mount-removal poller for remote/gvfs-style mounts.
	pub fn watch_directory(&self, dir: PathBuf, non_native: bool) -> Result<(), DirMonitorError> {
		let monitor = DirectoryMonitor::new(dir.clone(), self.deps.changes.clone(), non_native)?;
		self.monitors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(dir, monitor);
		Ok(())
	}

	/// Stops watching `dir`; a no-op if it wasn't being watched.
	pub fn unwatch_directory(&self, dir: &Path) {
		self.monitors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(dir);
	}

	#[must_use]
	pub fn is_watching(&self, dir: &Path) -> bool {
		self.monitors.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains_key(dir)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};

	#[test]
	fn watch_then_unwatch_directory_updates_membership() {
		let dir = tempfile::tempdir().unwrap();
		let engine = Engine::new(Arc::new(PolicyDialogService(HeadlessPolicy::AlwaysSkip)), EngineConfig::default());

		engine.watch_directory(dir.path().to_path_buf(), false).unwrap();
		assert!(engine.is_watching(dir.path()));

		engine.unwatch_directory(dir.path());
		assert!(!engine.is_watching(dir.path()));
	}

	#[tokio::test]
	async fn copy_async_runs_through_the_aggregated_deps() {
		let src_dir = tempfile::tempdir().unwrap();
		let dst_dir = tempfile::tempdir().unwrap();
		let file = src_dir.path().join("a.txt");
		tokio::fs::write(&file, b"hi").await.unwrap();

		let engine = Engine::new(Arc::new(PolicyDialogService(HeadlessPolicy::AlwaysSkip)), EngineConfig::default());
		let outcome = sd_file_actions::copy_async(
			&engine.deps,
			vec![file],
			dst_dir.path().to_path_buf(),
			sd_core_job_system::ParentHandle::None,
		)
		.await;

		assert!(outcome.success);
		assert!(dst_dir.path().join("a.txt").exists());
	}
}
