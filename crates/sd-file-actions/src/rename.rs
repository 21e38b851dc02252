//! Rename (spec.md §4.5 "Rename", §6 `rename`): obtain the source's live
//! location, call the backend's rename, and report success/cancel/error.
//!
//! Grounded on the teacher's `RenamerJob` in
//! `core/crates/file-actions/src/renamer.rs`, reduced to a single
//! function since this port has no separate `Task` behaviors to
//! parameterize and no file-handle indirection to wait on.

use std::path::{Path, PathBuf};

use sd_core_change_queue::ChangeEntry;
use sd_core_dialog::{AllowedResponses, DialogRequest, ResponseTag};
use sd_core_fs_capability::CopyFlags;
use sd_core_job_errors::{FsErrorKind, JobError};
use sd_core_task_system::CancellationToken;
use sd_core_undo::{Op, OpKind as UndoOpKind};

use crate::Deps;

/// Result of `rename` (spec.md §3 `RenameJob`'s `cancelled`/`success`
/// outputs).
#[derive(Debug, Default)]
pub struct RenameOutcome {
	pub success: bool,
	pub cancelled: bool,
	pub new_location: Option<PathBuf>,
	pub error: Option<JobError>,
}

/// `rename` (spec.md §6): `location` is the item's current path, `new_name`
/// the requested display name within the same parent directory.
///
/// `rename F -> F` is a no-op that still reports success (spec.md §5
/// "Idempotence / no-ops").
pub async fn rename(deps: &Deps, location: PathBuf, new_name: String) -> RenameOutcome {
	let Some(parent_dir) = location.parent().map(Path::to_path_buf) else {
		return RenameOutcome {
			success: false,
			error: Some(JobError::Fs(sd_core_job_errors::FsError::new(
				FsErrorKind::InvalidArgument,
				location,
				"has no parent directory",
			))),
			..RenameOutcome::default()
		};
	};

	if location.file_name().and_then(|n| n.to_str()) == Some(new_name.as_str()) {
		return RenameOutcome {
			success: true,
			new_location: Some(location),
			..RenameOutcome::default()
		};
	}

	let target = parent_dir.join(&new_name);
	let token = CancellationToken::new();

	match deps.fs.move_(&location, &target, CopyFlags::NO_FALLBACK_FOR_MOVE, None).await {
		Ok(()) => {
			deps.changes.enqueue(ChangeEntry::Moved { from: location.clone(), to: target.clone() });

			if !deps.undo.is_operating().await {
				let mut op = Op::new(UndoOpKind::Move);
				op.add_origin_target_pair(target.clone(), location.clone());
				deps.undo.record(op).await;
			}

			RenameOutcome {
				success: true,
				new_location: Some(target),
				..RenameOutcome::default()
			}
		}
		Err(e) if e.kind == FsErrorKind::Cancelled => RenameOutcome {
			cancelled: true,
			..RenameOutcome::default()
		},
		Err(e) => {
			let request = DialogRequest::new("Could not rename item", e.message.clone(), AllowedResponses::CANCEL);
			let response = deps.dialog.ask(request, &token).await;
			let cancelled = response.tag == ResponseTag::Cancel;
			RenameOutcome {
				cancelled,
				error: Some(JobError::Fs(e)),
				..RenameOutcome::default()
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use std::sync::Arc;

	fn headless_deps() -> Deps {
		Deps::local(Arc::new(PolicyDialogService(HeadlessPolicy::AlwaysSkip)))
	}

	#[tokio::test]
	async fn rename_to_same_name_is_a_no_op_success() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("a.txt");
		tokio::fs::write(&file, b"x").await.unwrap();

		let deps = headless_deps();
		let outcome = rename(&deps, file.clone(), "a.txt".to_owned()).await;

		assert!(outcome.success);
		assert_eq!(outcome.new_location.unwrap(), file);
	}

	#[tokio::test]
	async fn rename_moves_file_within_same_directory() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("a.txt");
		tokio::fs::write(&file, b"x").await.unwrap();

		let deps = headless_deps();
		let outcome = rename(&deps, file.clone(), "b.txt".to_owned()).await;

		assert!(outcome.success);
		assert!(!file.exists());
		assert!(dir.path().join("b.txt").exists());
	}

	#[tokio::test]
	async fn rename_onto_existing_sibling_fails_without_overwrite() {
		let dir = tempfile::tempdir().unwrap();
		let a = dir.path().join("a.txt");
		let b = dir.path().join("b.txt");
		tokio::fs::write(&a, b"x").await.unwrap();
		tokio::fs::write(&b, b"y").await.unwrap();

		let deps = headless_deps();
		let outcome = rename(&deps, a.clone(), "b.txt".to_owned()).await;

		assert!(!outcome.success);
		assert!(a.exists());
	}
}
