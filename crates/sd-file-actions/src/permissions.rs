//! Recursive permissions change (spec.md §4.5 "Recursive permissions").
//!
//! Grounded on `core/crates/file-actions/src/permissions_changer/job.rs`'s
//! walk-and-chmod shape, generalized from the teacher's directory-only mask
//! scheme to the spec's four-way `{file_value, file_mask, dir_value,
//! dir_mask}` split by descendant type.

use std::path::PathBuf;

use sd_core_job_errors::JobError;
use sd_core_job_system::{abort, finalize, inhibit_power, new_job, start, CommonJob, OpKind, ParentHandle};
use sd_core_task_system::BoxFuture;
use sd_core_undo::OpKind as UndoOpKind;
use tracing::instrument;

use crate::Deps;

/// The four mode/mask pairs spec.md §4.5 describes, selected by the
/// descendant's type (file vs directory).
#[derive(Debug, Clone, Copy)]
pub struct PermissionsChange {
	pub file_value: u32,
	pub file_mask: u32,
	pub dir_value: u32,
	pub dir_mask: u32,
}

/// Result of `set_permissions_recursive`.
#[derive(Debug, Default)]
pub struct PermissionsOutcome {
	pub success: bool,
	pub errors: Vec<JobError>,
}

pub async fn set_permissions_recursive(
	deps: &Deps,
	dir: PathBuf,
	change: PermissionsChange,
	parent: ParentHandle,
) -> PermissionsOutcome {
	let job = new_job(OpKind::Permissions, 0, 0, parent, None, Some(UndoOpKind::RecPermissions));
	inhibit_power(&job, deps.power.as_ref(), "changing permissions").await;
	start(&job);

	let mut outcome = PermissionsOutcome::default();

	match apply_recursive(deps, &job, &dir, true, change).await {
		Ok(()) => outcome.success = !job.token.is_cancelled(),
		Err(e) => {
			outcome.errors.push(e);
			job.token.cancel();
		}
	}

	if job.token.is_cancelled() {
		abort(&job);
	}
	finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), outcome.success).await;
	deps.changes.consume();
	outcome
}

/// Walks `path`, applying `new = (current & !mask) | value` to every
/// descendant (non-follow-symlink); `is_dir_hint` avoids a redundant
/// `query_info` on the root, whose type the caller already knows.
#[instrument(skip(deps, job))]
fn apply_recursive<'a>(
	deps: &'a Deps,
	job: &'a CommonJob,
	path: &'a PathBuf,
	is_dir_hint: bool,
	change: PermissionsChange,
) -> BoxFuture<'a, Result<(), JobError>> {
	Box::pin(async move {
		if job.token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let (value, mask) = if is_dir_hint {
			(change.dir_value, change.dir_mask)
		} else {
			(change.file_value, change.file_mask)
		};

		let current = deps.fs.current_mode(path).await?;
		job.record_mode_pre_image(path.clone(), current);
		let new_mode = (current & !mask) | value;
		if new_mode != current {
			deps.fs.set_mode(path, new_mode).await?;
		}
		job.progress.report_file_done(path, None, 0);

		if is_dir_hint {
			for (child, info) in deps.fs.enumerate(path).await? {
				let child_is_dir = info.file_type == sd_core_fs_capability::FileType::Directory;
				if info.file_type == sd_core_fs_capability::FileType::Symlink {
					continue;
				}
				apply_recursive(deps, job, &child, child_is_dir, change).await?;
			}
		}

		Ok(())
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use std::sync::Arc;

	fn headless_deps() -> Deps {
		Deps::local(Arc::new(PolicyDialogService(HeadlessPolicy::AlwaysSkip)))
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn strips_write_bit_from_files_and_dirs_separately() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let sub = dir.path().join("sub");
		tokio::fs::create_dir(&sub).await.unwrap();
		let file = sub.join("a.txt");
		tokio::fs::write(&file, b"x").await.unwrap();
		tokio::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o666)).await.unwrap();
		tokio::fs::set_permissions(&sub, std::fs::Permissions::from_mode(0o777)).await.unwrap();

		let deps = headless_deps();
		let change = PermissionsChange {
			file_value: 0,
			file_mask: 0o222,
			dir_value: 0,
			dir_mask: 0o022,
		};
		let outcome = set_permissions_recursive(&deps, dir.path().to_path_buf(), change, ParentHandle::None).await;
		assert!(outcome.success);

		let file_mode = tokio::fs::metadata(&file).await.unwrap().permissions().mode() & 0o777;
		assert_eq!(file_mode, 0o444);
		let dir_mode = tokio::fs::metadata(&sub).await.unwrap().permissions().mode() & 0o777;
		assert_eq!(dir_mode, 0o755);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn reapplying_same_change_is_idempotent() {
		use std::os::unix::fs::PermissionsExt;

		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("a.txt");
		tokio::fs::write(&file, b"x").await.unwrap();
		tokio::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).await.unwrap();

		let deps = headless_deps();
		let change = PermissionsChange {
			file_value: 0o644,
			file_mask: 0o777,
			dir_value: 0o755,
			dir_mask: 0o777,
		};

		set_permissions_recursive(&deps, dir.path().to_path_buf(), change, ParentHandle::None).await;
		let outcome = set_permissions_recursive(&deps, dir.path().to_path_buf(), change, ParentHandle::None).await;
		assert!(outcome.success);

		let mode = tokio::fs::metadata(&file).await.unwrap().permissions().mode() & 0o777;
		assert_eq!(mode, 0o644);
	}
}
