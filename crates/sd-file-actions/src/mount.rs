//! `unmount_mount_full` (spec.md §6), including the "Empty Trash before
//! ejecting?" gate design note §9 calls out as an open question.
//!
//! Grounded on `delete.rs`'s `empty_trash` for the confirmation-dialog shape;
//! not a [`sd_core_job_system::CommonJob`] itself, same reasoning as
//! `empty_trash` — spec.md §3 lists no job-shaped data for unmounting.

use sd_core_dialog::{AllowedResponses, DialogRequest, ResponseTag};
use sd_core_job_system::{Mount, MountOperation, ParentHandle};
use sd_core_task_system::CancellationToken;

use crate::Deps;

/// `unmount_mount_full` (spec.md §6): optionally offers to empty the trash
/// before ejecting, then unmounts (and, if requested, physically ejects)
/// `mount`.
///
/// Preserves the original's surprising behavior (design note §9, "Open
/// question (empty-trash confirmation inside unmount)"): the "Empty Trash
/// before ejecting?" dialog offers `Cancel` / `Don't empty` (`Skip`) /
/// `Empty and eject` (`EmptyTrash`). If the user picks `Empty and eject`,
/// the trash is purged *before* the unmount is attempted; if the unmount
/// that follows then fails (or would itself need a second confirmation this
/// port doesn't model), the already-emptied trash is **not** rolled back.
/// This is called out here rather than treated as a bug per the design
/// note's instruction to carry the ambiguity forward.
pub async fn unmount_mount_full(
	deps: &Deps,
	mount: Mount,
	operation: Option<MountOperation>,
	eject: bool,
	check_trash: bool,
	_parent: ParentHandle,
) -> bool {
	if check_trash {
		let token = CancellationToken::new();
		let request = DialogRequest::new(
			"Empty Trash before ejecting?",
			"You are ejecting a volume containing files you have deleted. Would you like to empty the Trash first?",
			AllowedResponses::EMPTY_TRASH | AllowedResponses::SKIP | AllowedResponses::CANCEL,
		);
		match deps.dialog.ask(request, &token).await.tag {
			ResponseTag::Cancel => return false,
			ResponseTag::EmptyTrash => {
				let _ = deps.fs.empty_trash().await;
			}
			_ => {}
		}
	}

	deps.mount_eject.unmount(&mount.root, operation.as_ref(), eject).await.is_ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use std::{path::PathBuf, sync::Arc};

	fn headless_deps(policy: HeadlessPolicy) -> Deps {
		Deps::local(Arc::new(PolicyDialogService(policy)))
	}

	#[tokio::test]
	async fn unmount_without_trash_check_always_calls_eject() {
		let deps = headless_deps(HeadlessPolicy::AlwaysCancel);
		let ok = unmount_mount_full(
			&deps,
			Mount { root: PathBuf::from("/mnt/x") },
			None,
			true,
			false,
			ParentHandle::None,
		)
		.await;
		assert!(ok);
	}

	#[tokio::test]
	async fn cancelling_trash_prompt_aborts_before_unmount() {
		let deps = headless_deps(HeadlessPolicy::AlwaysCancel);
		let ok = unmount_mount_full(
			&deps,
			Mount { root: PathBuf::from("/mnt/x") },
			None,
			true,
			true,
			ParentHandle::None,
		)
		.await;
		assert!(!ok);
	}
}
