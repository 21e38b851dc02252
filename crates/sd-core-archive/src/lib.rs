//! The `Archive` capability (spec.md §6): extraction and compression driven
//! through an event stream rather than the original's signal callbacks,
//! since Rust async favors that over a registered-handler API.

mod local;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use sd_core_job_errors::ArchiveError;
use sd_core_task_system::CancellationToken;

pub use local::LocalArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
	Zip,
	Tar,
	TarGz,
	TarBz2,
}

impl ArchiveFormat {
	/// Best-effort detection from a filename, used when extracting (the
	/// compress side always receives an explicit format per spec.md §3
	/// `CompressJob.format`).
	#[must_use]
	pub fn detect(path: &std::path::Path) -> Option<Self> {
		let name = path.file_name()?.to_str()?.to_lowercase();
		if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
			Some(Self::TarGz)
		} else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
			Some(Self::TarBz2)
		} else if name.ends_with(".tar") {
			Some(Self::Tar)
		} else if name.ends_with(".zip") {
			Some(Self::Zip)
		} else {
			None
		}
	}
}

/// Events streamed out of an in-flight extract/compress, matching the
/// signal names of spec.md §6 (`scanned`, `decide_destination`,
/// `progress`, `error`, `completed`, `request_passphrase`).
#[derive(Debug, Clone)]
pub enum ArchiveEvent {
	Scanned { total_files: u64, total_decompressed_bytes: u64 },
	Progress { bytes_done: u64, files_done: u64 },
	Completed,
}

pub type EventSink = Arc<dyn Fn(ArchiveEvent) + Send + Sync>;

/// Offered the capability's own suggested `candidate` destination plus the
/// archive's top-level entry names; returns the destination the job will
/// actually extract into (spec.md §4.4 step 3).
pub type DecideDestination = Arc<dyn Fn(&std::path::Path, &[String]) -> PathBuf + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ScanInfo {
	pub expected_total_files: u64,
	pub total_decompressed_bytes: u64,
	pub top_level_entries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractOutcome {
	pub output_root: PathBuf,
}

#[async_trait]
pub trait Extractor: Send + Sync {
	async fn scan(&self, archive: &PathBuf) -> Result<ScanInfo, ArchiveError>;

	/// Streams `ArchiveEvent`s to `on_event` while extracting. Calls
	/// `decide_destination` exactly once, before writing any file, per
	/// spec.md §4.4 step 3. Returns `Err(ArchiveError::PassphraseRequired)`
	/// if the archive is encrypted and no (or a wrong) `passphrase` was
	/// supplied; the job loop is responsible for re-invoking with a new one
	/// after the opaque passphrase prompt (spec.md §4.4 step 5).
	async fn extract(
		&self,
		archive: &PathBuf,
		decide_destination: DecideDestination,
		passphrase: Option<String>,
		on_event: EventSink,
		token: &CancellationToken,
	) -> Result<ExtractOutcome, ArchiveError>;
}

#[async_trait]
pub trait Compressor: Send + Sync {
	async fn compress(
		&self,
		sources: &[PathBuf],
		output_file: &PathBuf,
		format: ArchiveFormat,
		passphrase: Option<String>,
		on_event: EventSink,
		token: &CancellationToken,
	) -> Result<(), ArchiveError>;
}
