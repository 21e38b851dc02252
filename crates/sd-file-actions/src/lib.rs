//! The job types and public entry points of spec.md §6, built on
//! `sd-core-job-system`'s lifecycle and `sd-core-fs-capability`'s
//! `FileSystem` trait.
//!
//! Grounded on `core/crates/file-actions/src/{copier,deleter,mover}/*`: one
//! module per operation family, each exposing `*_async` entry points that
//! allocate a [`CommonJob`](sd_core_job_system::CommonJob), run it to
//! completion on the current task, and return an outcome struct rather than
//! the teacher's report-and-callback shape (there is no resumable job store
//! to report into here).

pub mod compress;
pub mod copy_move;
pub mod create;
pub mod delete;
pub mod extract;
pub mod mount;
pub mod permissions;
pub mod rename;

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use sd_core_archive::{Compressor, Extractor};
use sd_core_change_queue::ChangeQueue;
use sd_core_dialog::{DialogService, NoopPassphrasePrompt, PassphrasePrompt};
use sd_core_fs_capability::FileSystem;
use sd_core_job_system::{
	Clipboard, MountEject, NoopClipboard, NoopMountEject, NoopPowerInhibit, NoopRecentFiles, PowerInhibit, RecentFiles,
};
use sd_core_undo::{InMemoryUndoManager, UndoManager};

pub use copy_move::{copy_async, copy_move, duplicate_async, link_async, move_async, CopyMoveAction, CopyMoveOutcome};
pub use create::{new_file, new_file_from_template, new_folder, paste_image_from_clipboard, save_image_from_texture, CreateOutcome};
pub use delete::{delete_async, empty_trash, trash_or_delete_async, DeleteOutcome};
pub use extract::{extract_files, ExtractOutcome};
pub use mount::unmount_mount_full;
pub use permissions::set_permissions_recursive;
pub use rename::rename;

/// This port's replacement for the teacher's `SdPath` URI-scheme dispatch
/// (SPEC_FULL.md §3.1): sources and destinations carry their scheme
/// explicitly instead of being resolved through a virtual filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
	Local(PathBuf),
	Trash(PathBuf),
	Starred(PathBuf),
	Recent(PathBuf),
}

impl Destination {
	#[must_use]
	pub fn path(&self) -> &Path {
		match self {
			Self::Local(p) | Self::Trash(p) | Self::Starred(p) | Self::Recent(p) => p,
		}
	}

	#[must_use]
	pub fn into_path(self) -> PathBuf {
		match self {
			Self::Local(p) | Self::Trash(p) | Self::Starred(p) | Self::Recent(p) => p,
		}
	}
}

/// The capabilities every job in this crate is written against (spec.md
/// §6), bundled so entry points take one argument instead of seven. `sd-core`
/// constructs one of these at startup and hands out `&Deps` to callers;
/// tests build a headless one directly.
pub struct Deps {
	pub fs: Arc<dyn FileSystem>,
	pub dialog: Arc<dyn DialogService>,
	pub undo: Arc<dyn UndoManager>,
	pub power: Arc<dyn PowerInhibit>,
	pub recent: Arc<dyn RecentFiles>,
	pub changes: ChangeQueue,
	pub extractor: Arc<dyn Extractor>,
	pub compressor: Arc<dyn Compressor>,
	pub passphrase: Arc<dyn PassphrasePrompt>,
	pub mount_eject: Arc<dyn MountEject>,
	pub clipboard: Arc<dyn Clipboard>,
}

impl Deps {
	/// Headless dependency set for tests and `apps/cli`: local filesystem,
	/// local archive codec, in-memory undo, no-op power/recent, a fresh
	/// change queue, and whatever [`DialogService`] the caller supplies
	/// (usually [`sd_core_dialog::PolicyDialogService`]).
	#[must_use]
	pub fn local(dialog: Arc<dyn DialogService>) -> Self {
		let archive = Arc::new(sd_core_archive::LocalArchive);
		Self {
			fs: Arc::new(sd_core_fs_capability::LocalFileSystem::new()),
			dialog,
			undo: Arc::new(InMemoryUndoManager::new()),
			power: Arc::new(NoopPowerInhibit::new()),
			recent: Arc::new(NoopRecentFiles::new()),
			changes: ChangeQueue::new(),
			extractor: archive.clone(),
			compressor: archive,
			passphrase: Arc::new(NoopPassphrasePrompt::new()),
			mount_eject: Arc::new(NoopMountEject::new()),
			clipboard: Arc::new(NoopClipboard::new()),
		}
	}
}
