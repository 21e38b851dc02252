//! The scan pass (spec.md §4.1 `scan_sources`): breadth-first enumeration of
//! sources into a [`SourceInfo`] aggregate, with retry/skip/skip-all
//! recovery on readdir and query-info failures.

use std::{collections::HashMap, path::PathBuf};

use sd_core_dialog::{AllowedResponses, DialogRequest, DialogService, ResponseTag};
use sd_core_fs_capability::{FileSystem, FileType};
use sd_core_job_errors::JobError;
use sd_core_task_system::CancellationToken;
use tracing::instrument;

use crate::common::CommonJob;

/// Tags the operation a scan/progress run is for; also drives progress
/// phrasing (spec.md §4.6) and whether the scan recurses into directories at
/// all (Trash does not, per spec.md §4.1 "if a directory and the op is not
/// Trash, recurse").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
	Copy,
	Move,
	Delete,
	Trash,
	/// The "recent" scheme's delete reinterpreted as "clear from recent
	/// list" (spec.md §4.2 "Special sinks"); wording-only distinction from
	/// `Delete`.
	ClearRecent,
	Extract,
	Compress,
	Permissions,
}

/// Per-directory subtotal recorded so a late skip can retract exactly what
/// that subtree contributed (spec.md §3 "Scanned dirs info").
#[derive(Debug, Clone, Copy, Default)]
pub struct ScannedDirInfo {
	pub num_files_children: u64,
	pub num_bytes_children: u64,
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
	pub num_files: u64,
	pub num_bytes: u64,
	pub largest_file_bytes: u64,
	pub op: OpKind,
	pub num_files_since_progress: u64,
	pub scanned_dirs_info: HashMap<PathBuf, ScannedDirInfo>,
}

impl SourceInfo {
	#[must_use]
	fn new(op: OpKind) -> Self {
		Self {
			num_files: 0,
			num_bytes: 0,
			largest_file_bytes: 0,
			op,
			num_files_since_progress: 0,
			scanned_dirs_info: HashMap::new(),
		}
	}

	fn add_file(&mut self, size: u64) {
		self.num_files += 1;
		self.num_bytes += size;
		self.num_files_since_progress += 1;
		self.largest_file_bytes = self.largest_file_bytes.max(size);
	}

	/// Retracts a file/dir's contribution from the running totals when it is
	/// skipped after having already been scanned (spec.md §4.1
	/// `source_info_remove_file_from_count`).
	pub fn remove_file_from_count(&mut self, size: u64) {
		self.num_files = self.num_files.saturating_sub(1);
		self.num_bytes = self.num_bytes.saturating_sub(size);
	}

	/// Retracts an entire previously-scanned directory's subtree, used when
	/// a partially-scanned directory is skipped (spec.md §3 invariant on
	/// `scanned_dirs_info`).
	pub fn remove_dir_from_count(&mut self, dir: &std::path::Path) {
		if let Some(info) = self.scanned_dirs_info.remove(dir) {
			self.num_files = self.num_files.saturating_sub(info.num_files_children);
			self.num_bytes = self.num_bytes.saturating_sub(info.num_bytes_children);
		}
	}
}

/// Pulses progress every 100 files while scanning (spec.md §4.1 "pulses
/// progress every 100 files (not per byte)").
const SCAN_PROGRESS_PULSE: u64 = 100;

/// Breadth-first scan of `sources` per spec.md §4.1. Recurses into
/// directories unless `op == OpKind::Trash`. Offers Retry/Skip/Skip-all/
/// Cancel on readdir or query-info failure; `Skip-all` latches onto the job
/// for the remainder of the scan.
#[instrument(skip(fs, dialog, job, sources, on_pulse), fields(op = ?op))]
pub async fn scan_sources(
	fs: &dyn FileSystem,
	dialog: &dyn DialogService,
	job: &CommonJob,
	sources: &[PathBuf],
	op: OpKind,
	mut on_pulse: impl FnMut(&SourceInfo),
) -> Result<SourceInfo, JobError> {
	let mut info = SourceInfo::new(op);
	let mut queue: Vec<PathBuf> = sources.to_vec();

	while let Some(path) = queue.pop() {
		if job.token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let query = loop {
			match fs.query_info(&path, false).await {
				Ok(query) => break Some(query),
				Err(e) => match offer_retry_skip(job, dialog, &job.token, &path, &e.message).await? {
					RetryOrSkip::Retry => continue,
					RetryOrSkip::Skip => break None,
				},
			}
		};

		let Some(query) = query else {
			job.mark_skipped(&path);
			continue;
		};

		match query.file_type {
			FileType::Directory if op != OpKind::Trash => {
				let mut dir_info = ScannedDirInfo::default();

				match fs.enumerate(&path).await {
					Ok(children) => {
						for (child, child_info) in children {
							match child_info.file_type {
								FileType::Directory => queue.push(child),
								FileType::File | FileType::Symlink => {
									dir_info.num_files_children += 1;
									dir_info.num_bytes_children += child_info.size;
									info.add_file(child_info.size);
									maybe_pulse(&info, &mut on_pulse);
								}
							}
						}
						info.scanned_dirs_info.insert(path.clone(), dir_info);
					}
					Err(e) => {
						match offer_retry_skip(job, dialog, &job.token, &path, &e.message).await? {
							RetryOrSkip::Retry => queue.push(path),
							RetryOrSkip::Skip => {
								// Partial enumeration already counted stays
								// counted (spec.md §4.1): we just don't
								// descend further into this directory.
								job.mark_readdir_skip(&path);
								info.scanned_dirs_info.insert(path, dir_info);
							}
						}
					}
				}
			}
			FileType::Directory => {
				// Trash: directories count as one opaque unit, no descent.
				info.add_file(0);
				maybe_pulse(&info, &mut on_pulse);
			}
			FileType::File | FileType::Symlink => {
				info.add_file(query.size);
				maybe_pulse(&info, &mut on_pulse);
			}
		}
	}

	Ok(info)
}

fn maybe_pulse(info: &SourceInfo, on_pulse: &mut impl FnMut(&SourceInfo)) {
	if info.num_files_since_progress >= SCAN_PROGRESS_PULSE {
		on_pulse(info);
	}
}

enum RetryOrSkip {
	Retry,
	Skip,
}

/// `skip_all_error` latches so the user isn't re-prompted for every failing
/// path once they've chosen Skip-all (spec.md §4.1).
async fn offer_retry_skip(
	job: &CommonJob,
	dialog: &dyn DialogService,
	token: &CancellationToken,
	path: &std::path::Path,
	message: &str,
) -> Result<RetryOrSkip, JobError> {
	if job.skip_all_error.load(std::sync::atomic::Ordering::SeqCst) {
		return Ok(RetryOrSkip::Skip);
	}

	let request = DialogRequest::new(
		"Error while scanning",
		format!("Could not read \"{}\": {message}", path.display()),
		AllowedResponses::RETRY | AllowedResponses::SKIP | AllowedResponses::SKIP_ALL | AllowedResponses::CANCEL,
	);

	let response = dialog.ask(request, token).await;
	match response.tag {
		ResponseTag::Retry => Ok(RetryOrSkip::Retry),
		ResponseTag::Skip => Ok(RetryOrSkip::Skip),
		ResponseTag::SkipAll => {
			job.skip_all_error.store(true, std::sync::atomic::Ordering::SeqCst);
			Ok(RetryOrSkip::Skip)
		}
		_ => Err(JobError::Cancelled),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use sd_core_fs_capability::LocalFileSystem;

	#[tokio::test]
	async fn scan_empty_directory_yields_zero_totals_with_one_scanned_dir_entry() {
		let dir = tempfile::tempdir().unwrap();
		let fs = LocalFileSystem::new();
		let dialog = PolicyDialogService(HeadlessPolicy::AlwaysSkip);
		let job = CommonJob::new_for_test();

		let info = scan_sources(&fs, &dialog, &job, &[dir.path().to_path_buf()], OpKind::Copy, |_| {})
			.await
			.unwrap();

		assert_eq!(info.num_files, 0);
		assert_eq!(info.num_bytes, 0);
		assert_eq!(info.scanned_dirs_info.len(), 1);
	}

	#[tokio::test]
	async fn scan_counts_nested_files_and_bytes() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();
		std::fs::write(dir.path().join("a.txt"), b"12345").unwrap();
		std::fs::write(dir.path().join("sub/b.txt"), b"1234567890").unwrap();

		let fs = LocalFileSystem::new();
		let dialog = PolicyDialogService(HeadlessPolicy::AlwaysSkip);
		let job = CommonJob::new_for_test();

		let info = scan_sources(&fs, &dialog, &job, &[dir.path().to_path_buf()], OpKind::Copy, |_| {})
			.await
			.unwrap();

		assert_eq!(info.num_files, 2);
		assert_eq!(info.num_bytes, 15);
		assert_eq!(info.largest_file_bytes, 10);
	}

	#[tokio::test]
	async fn trash_op_does_not_recurse_into_directories() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::create_dir(dir.path().join("sub")).unwrap();
		std::fs::write(dir.path().join("sub/b.txt"), b"x").unwrap();

		let fs = LocalFileSystem::new();
		let dialog = PolicyDialogService(HeadlessPolicy::AlwaysSkip);
		let job = CommonJob::new_for_test();

		let info = scan_sources(&fs, &dialog, &job, &[dir.path().to_path_buf()], OpKind::Trash, |_| {})
			.await
			.unwrap();

		assert_eq!(info.num_files, 1);
	}
}
