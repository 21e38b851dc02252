//! The `FileSystem` capability (spec.md §6) and the destination-filesystem
//! policy abstraction design note §9 asks for (`DestinationFsPolicy`).
//!
//! Grounded on the teacher's `copier/tasks` idiom of wrapping every I/O call
//! in a typed result instead of matching on `std::io::Error` directly at the
//! call site (`IO(e.into())` in `core/crates/file-actions`).

mod local;
pub mod policy;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use sd_core_job_errors::FsError;

pub use local::LocalFileSystem;
pub use policy::{DestinationFsPolicy, PosixPolicy};

bitflags::bitflags! {
	/// Flags for [`FileSystem::copy`] / [`FileSystem::move_`], per spec.md §6.
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct CopyFlags: u32 {
		const NO_FOLLOW_SYMLINKS    = 0b0000_0001;
		const OVERWRITE             = 0b0000_0010;
		const NO_FALLBACK_FOR_MOVE  = 0b0000_0100;
		const ALL_METADATA          = 0b0000_1000;
		const TARGET_DEFAULT_PERMS  = 0b0001_0000;
		const TARGET_DEFAULT_MTIME  = 0b0010_0000;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
	File,
	Directory,
	Symlink,
}

/// Result of [`FileSystem::query_info`].
#[derive(Debug, Clone)]
pub struct Info {
	pub file_type: FileType,
	pub size: u64,
	pub modified_secs: Option<i64>,
}

/// Result of [`FileSystem::query_filesystem_info`].
#[derive(Debug, Clone)]
pub struct FsTypeInfo {
	/// Lowercase filesystem tag (e.g. `"ext4"`, `"vfat"`, `"ntfs"`, `"tmpfs"`).
	pub fs_type: String,
	pub free_bytes: u64,
	pub total_bytes: u64,
	pub readonly: bool,
}

impl FsTypeInfo {
	#[must_use]
	pub fn is_ram(&self) -> bool {
		matches!(self.fs_type.as_str(), "tmpfs" | "ramfs" | "devtmpfs")
	}

	#[must_use]
	pub fn is_fat_like(&self) -> bool {
		matches!(self.fs_type.as_str(), "vfat" | "fat" | "fat32" | "exfat" | "msdos")
	}

	#[must_use]
	pub fn needs_mangling(&self) -> bool {
		matches!(
			self.fs_type.as_str(),
			"vfat" | "fat" | "fat32" | "exfat" | "msdos" | "ntfs" | "fuseblk" | "fuse" | "cifs" | "smb3"
		)
	}
}

/// Sink for per-file byte progress, invoked by [`FileSystem::copy`] while the
/// transfer is in flight. `(bytes_done, bytes_total)`.
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// The filesystem capability the job engine is written against. A GUI host
/// supplies [`LocalFileSystem`] (or a VFS-backed equivalent); tests use the
/// same `LocalFileSystem` over a `tempdir`.
#[async_trait]
pub trait FileSystem: Send + Sync {
	async fn query_info(&self, path: &PathBuf, follow_symlinks: bool) -> Result<Info, FsError>;

	async fn query_filesystem_info(&self, path: &PathBuf) -> Result<FsTypeInfo, FsError>;

	/// Non-recursive directory listing; breadth-first recursion is the
	/// caller's job (scan_sources in `sd-core-job-system`).
	async fn enumerate(&self, path: &PathBuf) -> Result<Vec<(PathBuf, Info)>, FsError>;

	async fn copy(
		&self,
		src: &PathBuf,
		dst: &PathBuf,
		flags: CopyFlags,
		progress: Option<ProgressSink>,
	) -> Result<(), FsError>;

	/// `Err(FsError{kind: WouldRecurse, ..})` signals the caller to descend
	/// and move children individually (cross-filesystem case, spec.md §4.2
	/// step 8).
	async fn move_(
		&self,
		src: &PathBuf,
		dst: &PathBuf,
		flags: CopyFlags,
		progress: Option<ProgressSink>,
	) -> Result<(), FsError>;

	async fn make_directory(&self, path: &PathBuf) -> Result<(), FsError>;

	async fn delete(&self, path: &PathBuf) -> Result<(), FsError>;

	async fn trash(&self, path: &PathBuf) -> Result<(), FsError>;

	/// Purges every item already in the trash, leaving the trash root
	/// directories themselves intact (spec.md §8 testable property on
	/// `empty_trash`). Separate from [`FileSystem::trash`] because it has no
	/// single path to key errors on.
	async fn empty_trash(&self) -> Result<(), FsError>;

	async fn set_mode(&self, path: &PathBuf, mode: u32) -> Result<(), FsError>;

	async fn current_mode(&self, path: &PathBuf) -> Result<u32, FsError>;

	async fn write_new_file(&self, path: &PathBuf, contents: &[u8]) -> Result<(), FsError>;

	async fn make_symbolic_link(&self, path: &PathBuf, target: &PathBuf) -> Result<(), FsError>;
}
