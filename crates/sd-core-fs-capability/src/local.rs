use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sd_core_job_errors::{FsError, FsErrorKind};
use sysinfo::Disks;
use tokio::fs;
use tracing::instrument;

use crate::{CopyFlags, FileSystem, FileType, FsTypeInfo, Info, ProgressSink};

/// `tokio::fs`-backed [`FileSystem`] for a real local (or locally-mounted)
/// filesystem. Used by the GUI host, `apps/cli`, and every integration test
/// in `sd-file-actions` over a `tempdir`.
#[derive(Debug, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

const COPY_CHUNK_BYTES: usize = 1024 * 1024;

#[async_trait]
impl FileSystem for LocalFileSystem {
	#[instrument(skip(self), err)]
	async fn query_info(&self, path: &PathBuf, follow_symlinks: bool) -> Result<Info, FsError> {
		let meta = if follow_symlinks {
			fs::metadata(path).await
		} else {
			fs::symlink_metadata(path).await
		}
		.map_err(|e| FsError::from_io(path, &e))?;

		let file_type = if meta.is_dir() {
			FileType::Directory
		} else if meta.file_type().is_symlink() {
			FileType::Symlink
		} else {
			FileType::File
		};

		let modified_secs = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_secs() as i64);

		Ok(Info {
			file_type,
			size: meta.len(),
			modified_secs,
		})
	}

	#[instrument(skip(self), err)]
	async fn query_filesystem_info(&self, path: &PathBuf) -> Result<FsTypeInfo, FsError> {
		let canonical = fs::canonicalize(path)
			.await
			.or_else(|_| {
				path.parent()
					.map(Path::to_path_buf)
					.ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
			})
			.map_err(|e| FsError::from_io(path, &e))?;

		let disks = Disks::new_with_refreshed_list();
		let best = disks
			.list()
			.iter()
			.filter(|d| canonical.starts_with(d.mount_point()))
			.max_by_key(|d| d.mount_point().as_os_str().len());

		Ok(best.map_or_else(
			|| FsTypeInfo {
				fs_type: "unknown".to_owned(),
				free_bytes: u64::MAX,
				total_bytes: u64::MAX,
				readonly: false,
			},
			|disk| FsTypeInfo {
				fs_type: disk.file_system().to_string_lossy().to_lowercase(),
				free_bytes: disk.available_space(),
				total_bytes: disk.total_space(),
				readonly: disk.is_read_only(),
			},
		))
	}

	#[instrument(skip(self), err)]
	async fn enumerate(&self, path: &PathBuf) -> Result<Vec<(PathBuf, Info)>, FsError> {
		let mut reader = fs::read_dir(path).await.map_err(|e| FsError::from_io(path, &e))?;

		let mut out = Vec::new();
		loop {
			let entry = reader
				.next_entry()
				.await
				.map_err(|e| FsError::from_io(path, &e))?;
			let Some(entry) = entry else { break };

			let child = entry.path();
			let info = self.query_info(&child, false).await?;
			out.push((child, info));
		}

		Ok(out)
	}

	#[instrument(skip(self, progress), err)]
	async fn copy(
		&self,
		src: &PathBuf,
		dst: &PathBuf,
		flags: CopyFlags,
		progress: Option<ProgressSink>,
	) -> Result<(), FsError> {
		if dst.exists() && !flags.contains(CopyFlags::OVERWRITE) {
			return Err(FsError::new(FsErrorKind::Exists, dst.clone(), "destination exists"));
		}

		let info = self.query_info(src, !flags.contains(CopyFlags::NO_FOLLOW_SYMLINKS)).await?;
		if info.file_type == FileType::Directory {
			// A directory can't be copied with a single syscall once it has
			// children: tell the job to descend, per spec.md §4.2 step 8.
			return Err(FsError::new(FsErrorKind::WouldRecurse, src.clone(), "is a directory"));
		}

		copy_file_streaming(src, dst, info.size, progress).await?;

		if flags.contains(CopyFlags::TARGET_DEFAULT_MTIME) {
			// leave mtime at "now" (the default for a freshly written file)
		}

		Ok(())
	}

	async fn move_(
		&self,
		src: &PathBuf,
		dst: &PathBuf,
		flags: CopyFlags,
		progress: Option<ProgressSink>,
	) -> Result<(), FsError> {
		if dst.exists() && !flags.contains(CopyFlags::OVERWRITE) {
			return Err(FsError::new(FsErrorKind::Exists, dst.clone(), "destination exists"));
		}

		match fs::rename(src, dst).await {
			Ok(()) => Ok(()),
			Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
				// Cross-device: caller falls back to copy+delete (spec.md
				// §4.2 step 9).
				Err(FsError::new(
					FsErrorKind::WouldRecurse,
					src.clone(),
					"cross-device rename",
				))
			}
			Err(e) => {
				if flags.contains(CopyFlags::NO_FALLBACK_FOR_MOVE) {
					Err(FsError::from_io(src, &e))
				} else {
					self.copy(src, dst, flags, progress).await?;
					self.delete(src).await
				}
			}
		}
	}

	async fn make_directory(&self, path: &PathBuf) -> Result<(), FsError> {
		fs::create_dir(path).await.map_err(|e| FsError::from_io(path, &e))
	}

	async fn delete(&self, path: &PathBuf) -> Result<(), FsError> {
		let meta = fs::symlink_metadata(path).await.map_err(|e| FsError::from_io(path, &e))?;
		if meta.is_dir() {
			fs::remove_dir(path).await.map_err(|e| FsError::from_io(path, &e))
		} else {
			fs::remove_file(path).await.map_err(|e| FsError::from_io(path, &e))
		}
	}

	async fn trash(&self, path: &PathBuf) -> Result<(), FsError> {
		trash::delete(path).map_err(|e| {
			FsError::new(FsErrorKind::NotSupported, path.clone(), e.to_string())
		})
	}

	async fn empty_trash(&self) -> Result<(), FsError> {
		let items = trash::os_limited::list().map_err(|e| {
			FsError::new(FsErrorKind::NotSupported, PathBuf::from("trash"), e.to_string())
		})?;
		trash::os_limited::purge_all(items).map_err(|e| {
			FsError::new(FsErrorKind::NotSupported, PathBuf::from("trash"), e.to_string())
		})
	}

	async fn set_mode(&self, path: &PathBuf, mode: u32) -> Result<(), FsError> {
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let perms = std::fs::Permissions::from_mode(mode);
			fs::set_permissions(path, perms).await.map_err(|e| FsError::from_io(path, &e))
		}
		#[cfg(not(unix))]
		{
			let _ = mode;
			Err(FsError::new(FsErrorKind::NotSupported, path.clone(), "not supported on this platform"))
		}
	}

	async fn current_mode(&self, path: &PathBuf) -> Result<u32, FsError> {
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let meta = fs::metadata(path).await.map_err(|e| FsError::from_io(path, &e))?;
			Ok(meta.permissions().mode())
		}
		#[cfg(not(unix))]
		{
			let _ = path;
			Ok(0)
		}
	}

	async fn write_new_file(&self, path: &PathBuf, contents: &[u8]) -> Result<(), FsError> {
		if path.exists() {
			return Err(FsError::new(FsErrorKind::Exists, path.clone(), "destination exists"));
		}
		fs::write(path, contents).await.map_err(|e| FsError::from_io(path, &e))
	}

	async fn make_symbolic_link(&self, path: &PathBuf, target: &PathBuf) -> Result<(), FsError> {
		#[cfg(unix)]
		{
			fs::symlink(target, path).await.map_err(|e| FsError::from_io(path, &e))
		}
		#[cfg(windows)]
		{
			fs::symlink_file(target, path).await.map_err(|e| FsError::from_io(path, &e))
		}
	}
}

/// Copies a single file in chunks, reporting `(bytes_done, bytes_total)` to
/// `progress` so the job's `TransferInfo` can mark `partial_progress = true`
/// per spec.md §3/§4.6.
async fn copy_file_streaming(
	src: &PathBuf,
	dst: &PathBuf,
	total: u64,
	progress: Option<ProgressSink>,
) -> Result<(), FsError> {
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	let mut reader = fs::File::open(src).await.map_err(|e| FsError::from_io(src, &e))?;
	let mut writer = fs::File::create(dst).await.map_err(|e| FsError::from_io(dst, &e))?;

	let mut buf = vec![0_u8; COPY_CHUNK_BYTES];
	let mut done = 0_u64;
	loop {
		let n = reader.read(&mut buf).await.map_err(|e| FsError::from_io(src, &e))?;
		if n == 0 {
			break;
		}
		writer
			.write_all(&buf[..n])
			.await
			.map_err(|e| FsError::from_io(dst, &e))?;
		done += n as u64;
		if let Some(cb) = &progress {
			cb(done, total);
		}
	}
	writer.flush().await.map_err(|e| FsError::from_io(dst, &e))?;
	Ok(())
}

#[cfg(target_os = "linux")]
const fn libc_exdev() -> i32 {
	18
}
#[cfg(target_os = "macos")]
const fn libc_exdev() -> i32 {
	18
}
#[cfg(target_os = "windows")]
const fn libc_exdev() -> i32 {
	17
}
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const fn libc_exdev() -> i32 {
	18
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn copy_then_query_info_round_trips_size() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("a.txt");
		let dst = dir.path().join("b.txt");
		tokio::fs::write(&src, b"hello world").await.unwrap();

		let fs_cap = LocalFileSystem::new();
		fs_cap.copy(&src, &dst, CopyFlags::empty(), None).await.unwrap();

		let info = fs_cap.query_info(&dst, true).await.unwrap();
		assert_eq!(info.size, 11);
	}

	#[tokio::test]
	async fn copy_directory_reports_would_recurse() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("sub");
		tokio::fs::create_dir(&src).await.unwrap();
		let dst = dir.path().join("sub2");

		let fs_cap = LocalFileSystem::new();
		let err = fs_cap.copy(&src, &dst, CopyFlags::empty(), None).await.unwrap_err();
		assert_eq!(err.kind, FsErrorKind::WouldRecurse);
	}

	#[tokio::test]
	async fn copy_without_overwrite_to_existing_target_fails() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("a.txt");
		let dst = dir.path().join("b.txt");
		tokio::fs::write(&src, b"1").await.unwrap();
		tokio::fs::write(&dst, b"2").await.unwrap();

		let fs_cap = LocalFileSystem::new();
		let err = fs_cap.copy(&src, &dst, CopyFlags::empty(), None).await.unwrap_err();
		assert_eq!(err.kind, FsErrorKind::Exists);
	}
}
