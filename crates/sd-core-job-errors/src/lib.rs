//! Shared error taxonomy for the file-operations engine.
//!
//! Every crate in the workspace reports failures through the enums defined
//! here rather than inventing its own. This mirrors the split the teacher
//! workspace uses between `sd-core-job-errors` (leaf taxonomy) and the
//! `anyhow`-wrapped boundary at the CLI binary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error tagset a `FileSystem` capability can
/// return, per spec.md §6.
#[derive(Debug, Clone, Copy, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum FsErrorKind {
	#[error("cancelled")]
	Cancelled,
	#[error("already exists")]
	Exists,
	#[error("not found")]
	NotFound,
	#[error("directory not empty")]
	NotEmpty,
	#[error("operation not supported")]
	NotSupported,
	#[error("not a directory")]
	NotDirectory,
	#[error("permission denied")]
	PermissionDenied,
	#[error("invalid filename")]
	InvalidFilename,
	#[error("invalid argument")]
	InvalidArgument,
	#[error("would recurse")]
	WouldRecurse,
	#[error("would merge")]
	WouldMerge,
	#[error("failed, already handled")]
	FailedHandled,
}

impl FsErrorKind {
	/// Maps a [`std::io::ErrorKind`] onto our tagset the way
	/// `LocalFileSystem` must, since `tokio::fs` only exposes the stdlib
	/// taxonomy.
	#[must_use]
	pub fn from_io(kind: std::io::ErrorKind) -> Self {
		use std::io::ErrorKind as K;
		match kind {
			K::NotFound => Self::NotFound,
			K::AlreadyExists => Self::Exists,
			K::PermissionDenied => Self::PermissionDenied,
			K::InvalidInput | K::InvalidData => Self::InvalidArgument,
			_ => Self::FailedHandled,
		}
	}
}

/// A single failed filesystem call, with the path it failed on attached so
/// the job loop can decide skip/retry without re-deriving context.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("{kind} at {path:?}: {message}")]
pub struct FsError {
	pub kind: FsErrorKind,
	pub path: PathBuf,
	pub message: String,
}

impl FsError {
	#[must_use]
	pub fn new(kind: FsErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
		Self {
			kind,
			path: path.into(),
			message: message.into(),
		}
	}

	#[must_use]
	pub fn from_io(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
		Self::new(FsErrorKind::from_io(err.kind()), path, err.to_string())
	}
}

/// Errors surfaced by an `Archive` capability.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ArchiveError {
	#[error("archive entry is encrypted and requires a passphrase")]
	PassphraseRequired,
	#[error("supplied passphrase was rejected")]
	BadPassphrase,
	#[error(transparent)]
	Fs(#[from] FsError),
	#[error("{0}")]
	Codec(String),
}

/// Errors surfaced by the blocking dialog protocol (§4.9).
#[derive(Debug, Error)]
pub enum DialogError {
	#[error("dialog channel closed before a response arrived")]
	ChannelClosed,
	#[error("job was cancelled while waiting on a dialog")]
	Cancelled,
}

/// The per-job error a `Job` run can terminate with.
///
/// `NonCritical` mirrors the teacher's `Error::NonCritical(Vec<Error>)`
/// idiom (`copier/job.rs`, `deleter/job.rs`): a job that skipped or failed
/// some files but otherwise ran to completion still reports a `Completed`
/// return status with these attached, rather than aborting the whole run.
#[derive(Debug, Error)]
pub enum JobError {
	#[error("job was cancelled")]
	Cancelled,
	#[error(transparent)]
	Fs(#[from] FsError),
	#[error(transparent)]
	Archive(#[from] ArchiveError),
	#[error(transparent)]
	Dialog(#[from] DialogError),
	#[error("invalid path")]
	InvalidPath,
	#[error("fatal: {0}")]
	Fatal(String),
	#[error("{} file(s) failed", .0.len())]
	NonCritical(Vec<JobError>),
	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl JobError {
	/// The `(source, target)` pair a failure occurred on, when known, so the
	/// job loop can record it against `CopyStats`/progress without the
	/// caller having to match on every variant (teacher idiom:
	/// `Error::get_paths` in `copier/job.rs`).
	#[must_use]
	pub fn path(&self) -> Option<&std::path::Path> {
		match self {
			Self::Fs(e) => Some(&e.path),
			_ => None,
		}
	}
}

pub type JobResult<T> = Result<T, JobError>;
