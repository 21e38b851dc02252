//! Create file/folder (spec.md §4.5 "Create file or directory"):
//! resolve a default filename, create with exists/invalid-filename retry,
//! then register with the change queue and recent-files list.
//!
//! Unlike copy/move/delete, a create touches exactly one path and has no
//! scan/verify pass or progress bar in spec.md §4.5, so this skips
//! [`sd_core_job_system::CommonJob`] entirely and just uses a throwaway
//! [`CancellationToken`] for the one dialog it might show — grounded on the
//! teacher's own `new_file`/`new_folder` handlers in
//! `core/crates/file-actions`, which are thin wrappers with no job object of
//! their own either.

use std::path::{Path, PathBuf};

use sd_core_change_queue::ChangeEntry;
use sd_core_dialog::{AllowedResponses, DialogRequest};
use sd_core_job_errors::{FsErrorKind, JobError};
use sd_core_job_system::{FsPolicyCache, ParentHandle};
use sd_core_task_system::CancellationToken;
use sd_core_undo::{Op, OpKind as UndoOpKind};

use crate::Deps;

/// Result of `new_folder`/`new_file`/`new_file_from_template` (spec.md §3
/// `CreateJob`).
#[derive(Debug, Default)]
pub struct CreateOutcome {
	pub success: bool,
	pub created_file: Option<PathBuf>,
	pub errors: Vec<JobError>,
}

const MAX_RENAME_ATTEMPTS: u32 = 1000;

pub async fn new_folder(deps: &Deps, parent_dir: PathBuf, folder_name: Option<String>, parent: ParentHandle) -> CreateOutcome {
	let initial = folder_name.unwrap_or_else(|| "Untitled Folder".to_owned());
	create_loop(
		deps,
		&parent_dir,
		&initial,
		parent,
		UndoOpKind::CreateFolder,
		/* ignore_extension_for_numbering */ true,
		|path| {
			let deps = deps;
			Box::pin(async move { deps.fs.make_directory(path).await })
		},
	)
	.await
}

pub async fn new_file(
	deps: &Deps,
	parent_dir: PathBuf,
	target_filename: Option<String>,
	initial_contents: Vec<u8>,
	parent: ParentHandle,
) -> CreateOutcome {
	let initial = target_filename.unwrap_or_else(|| "Untitled Document".to_owned());
	create_loop(
		deps,
		&parent_dir,
		&initial,
		parent,
		UndoOpKind::CreateEmptyFile,
		false,
		|path| {
			let deps = deps;
			let contents = initial_contents.clone();
			Box::pin(async move { deps.fs.write_new_file(path, &contents).await })
		},
	)
	.await
}

pub async fn new_file_from_template(
	deps: &Deps,
	parent_dir: PathBuf,
	target_filename: Option<String>,
	template: Option<PathBuf>,
	parent: ParentHandle,
) -> CreateOutcome {
	let initial = target_filename
		.or_else(|| template.as_ref().and_then(|t| t.file_name()).and_then(|n| n.to_str()).map(str::to_owned))
		.unwrap_or_else(|| "Untitled Document".to_owned());

	create_loop(
		deps,
		&parent_dir,
		&initial,
		parent,
		UndoOpKind::CreateFileFromTemplate,
		false,
		move |path| {
			let deps = deps;
			let template = template.clone();
			Box::pin(async move {
				match &template {
					Some(src) => {
						deps.fs
							.copy(src, path, sd_core_fs_capability::CopyFlags::NO_FOLLOW_SYMLINKS, None)
							.await
					}
					None => deps.fs.write_new_file(path, b"").await,
				}
			})
		},
	)
	.await
}

/// `paste_image_from_clipboard` (spec.md §6): reads whatever image the
/// clipboard currently holds and writes it under `parent_dir` as a new file,
/// going through the same exists/invalid-filename retry loop as `new_file`.
/// An empty clipboard is not an error (spec.md §4.5 has no dedicated
/// clause for this; a clipboard with no image simply produces nothing to
/// paste): this returns a non-`success` outcome with no queued errors.
pub async fn paste_image_from_clipboard(deps: &Deps, parent_dir: PathBuf, parent: ParentHandle) -> CreateOutcome {
	let Some(image) = deps.clipboard.read_image().await else {
		return CreateOutcome::default();
	};

	let initial = format!("Clipboard Image.{}", image.extension);
	create_loop(
		deps,
		&parent_dir,
		&initial,
		parent,
		UndoOpKind::CreateEmptyFile,
		false,
		|path| {
			let deps = deps;
			let bytes = image.bytes.clone();
			Box::pin(async move { deps.fs.write_new_file(path, &bytes).await })
		},
	)
	.await
}

/// `save_image_from_texture` (spec.md §6): writes already-encoded image
/// bytes supplied by the caller (a rendered texture, a screenshot) under
/// `parent_dir` using `base_name` as the starting filename.
pub async fn save_image_from_texture(
	deps: &Deps,
	parent_dir: PathBuf,
	base_name: String,
	texture: sd_core_job_system::EncodedImage,
	parent: ParentHandle,
) -> CreateOutcome {
	let initial = if base_name.contains('.') { base_name } else { format!("{base_name}.{}", texture.extension) };
	create_loop(
		deps,
		&parent_dir,
		&initial,
		parent,
		UndoOpKind::CreateEmptyFile,
		false,
		|path| {
			let deps = deps;
			let bytes = texture.bytes.clone();
			Box::pin(async move { deps.fs.write_new_file(path, &bytes).await })
		},
	)
	.await
}

/// Shared retry loop behind every entry point above (spec.md §4.5): mangle
/// once on `InvalidFilename`, append a counted suffix on `Exists`, surface
/// anything else as a fatal skip.
async fn create_loop<'d, F>(
	deps: &'d Deps,
	parent_dir: &Path,
	initial_name: &str,
	parent: ParentHandle,
	undo_kind: UndoOpKind,
	ignore_extension_for_numbering: bool,
	attempt: F,
) -> CreateOutcome
where
	F: for<'a> Fn(&'a PathBuf) -> sd_core_task_system::BoxFuture<'a, Result<(), sd_core_job_errors::FsError>>,
{
	let _ = parent; // opaque parent handle carried for API symmetry; create has no job-level dialog parenting need.
	let token = CancellationToken::new();
	let policy_cache = FsPolicyCache::new();

	let (stem, ext) = split_name(initial_name, ignore_extension_for_numbering);
	let mut candidate_name = initial_name.to_owned();
	let mut mangled_once = false;
	let mut counter = 2;

	let mut outcome = CreateOutcome::default();

	loop {
		let path = parent_dir.join(&candidate_name);
		match attempt(&path).await {
			Ok(()) => {
				deps.changes.enqueue(ChangeEntry::Added(path.clone()));
				if let Some(uri) = path.to_str() {
					deps.recent.add(&format!("file://{uri}")).await;
				}

				if !deps.undo.is_operating().await {
					let mut op = Op::new(undo_kind);
					op.add_origin_target_pair(path.clone(), path.clone());
					deps.undo.record(op).await;
				}

				outcome.success = true;
				outcome.created_file = Some(path);
				return outcome;
			}

			Err(e) if !mangled_once && matches!(e.kind, FsErrorKind::InvalidFilename | FsErrorKind::InvalidArgument) => {
				mangled_once = true;
				let policy = match policy_cache.policy_for(deps.fs.as_ref(), parent_dir).await {
					Ok(p) => p,
					Err(e) => {
						outcome.errors.push(JobError::Fs(e));
						return outcome;
					}
				};
				let (mangled, changed) = policy.mangle(&candidate_name);
				if changed {
					candidate_name = mangled;
					continue;
				}
				outcome.errors.push(JobError::Fs(e));
				return outcome;
			}

			Err(e) if e.kind == FsErrorKind::Exists => {
				if counter > MAX_RENAME_ATTEMPTS {
					outcome.errors.push(JobError::Fs(e));
					return outcome;
				}
				candidate_name = if ext.is_empty() {
					format!("{stem} ({counter})")
				} else {
					format!("{stem} ({counter}).{ext}")
				};
				counter += 1;
			}

			Err(e) => {
				offer_fatal(deps, &token, &e.message).await;
				outcome.errors.push(JobError::Fs(e));
				return outcome;
			}
		}
	}
}

fn split_name(name: &str, ignore_extension: bool) -> (String, String) {
	if ignore_extension {
		return (name.to_owned(), String::new());
	}
	let path = Path::new(name);
	let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name).to_owned();
	let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_owned();
	(stem, ext)
}

async fn offer_fatal(deps: &Deps, token: &CancellationToken, message: &str) {
	let request = DialogRequest::new("Could not create item", message, AllowedResponses::CANCEL);
	let _ = deps.dialog.ask(request, token).await;
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
	async fn new_folder_creates_untitled_folder_by_default() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps();
		let outcome = new_folder(&deps, dir.path().to_path_buf(), None, ParentHandle::None).await;

		assert!(outcome.success);
		assert!(outcome.created_file.unwrap().is_dir());
	}

	#[tokio::test]
	async fn new_folder_numbers_on_conflict() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::create_dir(dir.path().join("Stuff")).await.unwrap();
		let deps = headless_deps();
		let outcome = new_folder(&deps, dir.path().to_path_buf(), Some("Stuff".to_owned()), ParentHandle::None).await;

		assert!(outcome.success);
		assert_eq!(outcome.created_file.unwrap(), dir.path().join("Stuff (2)"));
	}

	#[tokio::test]
	async fn new_file_writes_initial_contents() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps();
		let outcome = new_file(&deps, dir.path().to_path_buf(), Some("notes.txt".to_owned()), b"hi".to_vec(), ParentHandle::None)
			.await;

		assert!(outcome.success);
		let path = outcome.created_file.unwrap();
		assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hi");
	}

	struct FakeClipboard(Option<sd_core_job_system::EncodedImage>);

	#[async_trait::async_trait]
	impl sd_core_job_system::Clipboard for FakeClipboard {
		async fn read_image(&self) -> Option<sd_core_job_system::EncodedImage> {
			self.0.clone()
		}
	}

	#[tokio::test]
	async fn paste_image_from_clipboard_writes_file_when_present() {
		let dir = tempfile::tempdir().unwrap();
		let mut deps = headless_deps();
		deps.clipboard = Arc::new(FakeClipboard(Some(sd_core_job_system::EncodedImage {
			bytes: b"pixels".to_vec(),
			extension: "png".to_owned(),
		})));

		let outcome = paste_image_from_clipboard(&deps, dir.path().to_path_buf(), ParentHandle::None).await;

		assert!(outcome.success);
		let path = outcome.created_file.unwrap();
		assert_eq!(path.file_name().unwrap(), "Clipboard Image.png");
		assert_eq!(tokio::fs::read(&path).await.unwrap(), b"pixels");
	}

	#[tokio::test]
	async fn paste_image_from_clipboard_with_empty_clipboard_does_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let mut deps = headless_deps();
		deps.clipboard = Arc::new(FakeClipboard(None));

		let outcome = paste_image_from_clipboard(&deps, dir.path().to_path_buf(), ParentHandle::None).await;

		assert!(!outcome.success);
		assert!(outcome.created_file.is_none());
	}

	#[tokio::test]
	async fn save_image_from_texture_uses_base_name_and_extension() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps();
		let texture = sd_core_job_system::EncodedImage { bytes: b"tex".to_vec(), extension: "jpg".to_owned() };

		let outcome = save_image_from_texture(&deps, dir.path().to_path_buf(), "Screenshot".to_owned(), texture, ParentHandle::None).await;

		assert!(outcome.success);
		let path = outcome.created_file.unwrap();
		assert_eq!(path.file_name().unwrap(), "Screenshot.jpg");
		assert_eq!(tokio::fs::read(&path).await.unwrap(), b"tex");
	}
}
