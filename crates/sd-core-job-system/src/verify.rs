//! Destination verification (spec.md §4.1 `verify_destination`).

use std::path::Path;

use sd_core_dialog::{AllowedResponses, DialogRequest, DialogService, ResponseTag};
use sd_core_fs_capability::{DestinationFsPolicy, FileType, FsTypeInfo};
use sd_core_job_errors::JobError;

use crate::common::CommonJob;

pub struct VerifyOutcome {
	pub fs_type: FsTypeInfo,
	pub policy: Box<dyn DestinationFsPolicy>,
}

/// Queries type and filesystem id of `destination`, following symlinks in
/// the two-stage dance spec.md §4.1 describes, then checks existence,
/// writability, free space and the FAT 4 GiB ceiling.
pub async fn verify_destination(
	fs: &dyn sd_core_fs_capability::FileSystem,
	dialog: &dyn DialogService,
	job: &CommonJob,
	destination: &Path,
	required_bytes: u64,
	largest_file_bytes: u64,
) -> Result<VerifyOutcome, JobError> {
	let info = loop {
		match fs.query_info(&destination.to_path_buf(), false).await {
			Ok(info) if info.file_type == FileType::Symlink => {
				// Re-query following the link (spec.md §4.1 "two-stage
				// dance").
				match fs.query_info(&destination.to_path_buf(), true).await {
					Ok(resolved) => break resolved,
					Err(e) => {
						if retry_or_abort(job, dialog, &e.message).await? {
							continue;
						}
						return Err(JobError::Cancelled);
					}
				}
			}
			Ok(info) => break info,
			Err(e) => {
				if retry_or_abort(job, dialog, &e.message).await? {
					continue;
				}
				return Err(JobError::Cancelled);
			}
		}
	};

	if info.file_type != FileType::Directory {
		fatal_ok_dialog(dialog, job, "Destination is not a folder").await;
		return Err(JobError::Fatal("destination is not a directory".into()));
	}

	let parent = destination;
	let fs_type = job.fs_policy_cache.query(fs, parent).await?;

	if fs_type.readonly {
		fatal_ok_dialog(dialog, job, "Destination is read-only").await;
		return Err(JobError::Fatal("destination is read-only".into()));
	}

	let mut fs_type = fs_type;
	loop {
		if fs_type.is_ram() || fs_type.free_bytes >= required_bytes {
			break;
		}

		let request = DialogRequest::new(
			"Not enough free space",
			format!(
				"This operation requires {required_bytes} bytes but only {} are available.",
				fs_type.free_bytes
			),
			AllowedResponses::PROCEED | AllowedResponses::RETRY | AllowedResponses::CANCEL,
		);
		let response = dialog.ask(request, &job.token).await;
		match response.tag {
			ResponseTag::Proceed => break,
			ResponseTag::Retry => {
				fs_type = fs.query_filesystem_info(&parent.to_path_buf()).await?;
			}
			_ => return Err(JobError::Cancelled),
		}
	}

	let policy = job.fs_policy_cache.policy_for(fs, parent).await?;

	if let Some(max) = policy.max_file_size() {
		if largest_file_bytes > max {
			let request = DialogRequest::new(
				"File too large for destination",
				format!(
					"The destination filesystem can't store files larger than {max} bytes."
				),
				AllowedResponses::PROCEED | AllowedResponses::CANCEL,
			);
			let response = dialog.ask(request, &job.token).await;
			if response.tag != ResponseTag::Proceed {
				return Err(JobError::Cancelled);
			}
		}
	}

	Ok(VerifyOutcome { fs_type, policy })
}

async fn retry_or_abort(job: &CommonJob, dialog: &dyn DialogService, message: &str) -> Result<bool, JobError> {
	let request = DialogRequest::new(
		"Error",
		format!("Could not access destination: {message}"),
		AllowedResponses::RETRY | AllowedResponses::CANCEL,
	);
	let response = dialog.ask(request, &job.token).await;
	Ok(response.tag == ResponseTag::Retry)
}

async fn fatal_ok_dialog(dialog: &dyn DialogService, job: &CommonJob, message: &str) {
	let request = DialogRequest::new("Error", message, AllowedResponses::CANCEL);
	let _ = dialog.ask(request, &job.token).await;
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use sd_core_fs_capability::LocalFileSystem;

	#[tokio::test]
	async fn verify_succeeds_for_a_writable_directory() {
		let dir = tempfile::tempdir().unwrap();
		let fs = LocalFileSystem::new();
		let dialog = PolicyDialogService(HeadlessPolicy::AlwaysProceed);
		let job = CommonJob::new_for_test();

		let outcome = verify_destination(&fs, &dialog, &job, dir.path(), 10, 10).await.unwrap();
		assert!(!outcome.fs_type.readonly);
	}

	#[tokio::test]
	async fn verify_rejects_a_file_as_destination() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("not_a_dir");
		std::fs::write(&file, b"x").unwrap();

		let fs = LocalFileSystem::new();
		let dialog = PolicyDialogService(HeadlessPolicy::AlwaysCancel);
		let job = CommonJob::new_for_test();

		let err = verify_destination(&fs, &dialog, &job, &file, 10, 10).await.unwrap_err();
		assert!(matches!(err, JobError::Fatal(_)));
	}
}
