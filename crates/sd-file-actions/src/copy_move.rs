//! Copy/Move engine (spec.md §4.2): recursive copy or move with conflict
//! resolution, rename-on-collision, and copy-fallback when a single-call
//! rename can't cross filesystems.
//!
//! Grounded on `core/crates/file-actions/src/copier/job.rs` for the
//! per-job-type entry-point shape, generalized from the teacher's
//! task-dispatcher split (`CreateDirsTask`/`CopyTask`) down to this port's
//! single-worker-per-job model (SPEC_FULL.md §4.1.1): the directory
//! recursion and per-file retry loop both run inline on the job's own
//! future rather than being split into separately-scheduled tasks.

use std::{
	collections::{HashMap, HashSet},
	path::{Path, PathBuf},
	sync::Arc,
};

use sd_core_change_queue::ChangeEntry;
use sd_core_dialog::{AllowedResponses, ConflictContext, DialogRequest, ResponseTag};
use sd_core_fs_capability::{CopyFlags, FileType, ProgressSink};
use sd_core_job_errors::{FsErrorKind, JobError};
use sd_core_job_system::{
	abort, finalize, inhibit_power, new_job, scan_sources, start, verify_destination, CommonJob,
	OpKind, ParentHandle,
};
use sd_core_task_system::BoxFuture;
use sd_core_undo::OpKind as UndoOpKind;
use tracing::instrument;

use crate::Deps;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMoveAction {
	Copy,
	Move,
	Link,
}

/// Result of a copy/move/duplicate/link run (spec.md §7 "the done-callback
/// always fires with `success: bool`... so the caller can chain UI
/// updates").
#[derive(Debug, Default)]
pub struct CopyMoveOutcome {
	pub success: bool,
	/// Destination paths newly created by this job; value is `true` unless
	/// the path already existed and was overwritten (spec.md §3
	/// `debuting_files`).
	pub debuting_files: HashMap<PathBuf, bool>,
	pub errors: Vec<JobError>,
}

pub async fn copy_async(
	deps: &Deps,
	sources: Vec<PathBuf>,
	target_dir: PathBuf,
	parent: ParentHandle,
) -> CopyMoveOutcome {
	run(deps, sources, Some(target_dir), None, CopyMoveAction::Copy, parent).await
}

pub async fn move_async(
	deps: &Deps,
	sources: Vec<PathBuf>,
	target_dir: PathBuf,
	parent: ParentHandle,
) -> CopyMoveOutcome {
	run(deps, sources, Some(target_dir), None, CopyMoveAction::Move, parent).await
}

/// Absent destination means "duplicate in place": each source is copied
/// into its own parent directory under a unique-names suffix (spec.md §3
/// "optional destination: Path (absent ⇒ duplicate-in-place)").
pub async fn duplicate_async(deps: &Deps, sources: Vec<PathBuf>, parent: ParentHandle) -> CopyMoveOutcome {
	run(deps, sources, None, None, CopyMoveAction::Copy, parent).await
}

pub async fn link_async(
	deps: &Deps,
	sources: Vec<PathBuf>,
	target_dir: PathBuf,
	parent: ParentHandle,
) -> CopyMoveOutcome {
	run(deps, sources, Some(target_dir), None, CopyMoveAction::Link, parent).await
}

/// `copy_move` (spec.md §6): the dispatcher that also handles the
/// trash/starred/recent special sinks of spec.md §4.2 "Special sinks".
pub async fn copy_move(
	deps: &Deps,
	sources: Vec<crate::Destination>,
	target: Option<crate::Destination>,
	action: CopyMoveAction,
	parent: ParentHandle,
) -> CopyMoveOutcome {
	if let Some(crate::Destination::Starred(_)) = target {
		// Open Question resolution (SPEC_FULL.md §9): rerouted to the
		// tag manager, out of scope here. No job, no ChangeEntries, no
		// undo.
		return CopyMoveOutcome { success: true, ..CopyMoveOutcome::default() };
	}

	if let Some(crate::Destination::Trash(_)) = target {
		let sources: Vec<PathBuf> = sources.into_iter().map(crate::Destination::into_path).collect();
		let outcome = crate::delete::trash_or_delete_async(deps, sources, parent).await;
		return CopyMoveOutcome {
			success: outcome.success,
			debuting_files: HashMap::new(),
			errors: outcome.errors,
		};
	}

	let plain_sources: Vec<PathBuf> = sources.into_iter().map(crate::Destination::into_path).collect();
	let target_dir = target.map(crate::Destination::into_path);
	run(deps, plain_sources, target_dir, None, action, parent).await
}

async fn run(
	deps: &Deps,
	sources: Vec<PathBuf>,
	destination: Option<PathBuf>,
	target_name: Option<String>,
	action: CopyMoveAction,
	parent: ParentHandle,
) -> CopyMoveOutcome {
	let unique_names = destination.is_none();
	let is_move = action == CopyMoveAction::Move;
	let undo_kind = match action {
		CopyMoveAction::Copy if unique_names => UndoOpKind::Duplicate,
		CopyMoveAction::Copy => UndoOpKind::Copy,
		CopyMoveAction::Move => UndoOpKind::Move,
		CopyMoveAction::Link => UndoOpKind::CreateLink,
	};

	let job = new_job(
		if is_move { OpKind::Move } else { OpKind::Copy },
		0,
		0,
		parent,
		None,
		Some(undo_kind),
	);

	inhibit_power(&job, deps.power.as_ref(), "copying files").await;
	start(&job);

	let op = if is_move { OpKind::Move } else { OpKind::Copy };
	let scan = scan_sources(deps.fs.as_ref(), deps.dialog.as_ref(), &job, &sources, op, |_| {}).await;

	let mut outcome = CopyMoveOutcome::default();
	let scan = match scan {
		Ok(scan) => scan,
		Err(JobError::Cancelled) => {
			abort(&job);
			finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
			deps.changes.consume();
			return outcome;
		}
		Err(e) => {
			outcome.errors.push(e);
			abort(&job);
			finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
			deps.changes.consume();
			return outcome;
		}
	};

	if let Some(dest) = &destination {
		if verify_destination(deps.fs.as_ref(), deps.dialog.as_ref(), &job, dest, scan.num_bytes, scan.largest_file_bytes)
			.await
			.is_err()
		{
			abort(&job);
			finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
			deps.changes.consume();
			return outcome;
		}
	}

	job.progress.retract(0, 0); // totals were seeded at 0; scan drives pulsing, not a hard total here.

	let mut existing_names: HashSet<String> = HashSet::new();
	if let Some(dest) = &destination {
		if let Ok(children) = deps.fs.enumerate(&dest.clone().into()).await {
			existing_names.extend(children.into_iter().filter_map(|(p, _)| {
				p.file_name().and_then(|n| n.to_str()).map(str::to_owned)
			}));
		}
	}

	for source in &sources {
		if job.token.is_cancelled() {
			break;
		}
		let dest_dir = destination.clone().unwrap_or_else(|| {
			source.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
		});

		let single_target_name = if sources.len() == 1 { target_name.clone() } else { None };

		let result = copy_or_move_recursive(
			deps,
			&job,
			source.clone(),
			dest_dir,
			action,
			single_target_name,
			unique_names,
			&mut existing_names,
			&mut outcome,
		)
		.await;

		if let Err(JobError::Cancelled) = result {
			job.token.cancel();
			break;
		}
		if let Err(e) = result {
			outcome.errors.push(e);
		}
	}

	outcome.success = !job.token.is_cancelled() && outcome.errors.is_empty();

	if job.token.is_cancelled() {
		abort(&job);
	}
	finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), outcome.success || !outcome.debuting_files.is_empty()).await;
	deps.changes.consume();
	outcome
}

/// Per-file algorithm (spec.md §4.2 steps 1-10), generalized to also drive
/// directory recursion (`copy_move_directory` in spec.md) since this port's
/// single-worker job has no separate task dispatcher to hand that off to.
#[instrument(skip(deps, job, existing_names, outcome), fields(?source, ?dest_dir))]
fn copy_or_move_recursive<'a>(
	deps: &'a Deps,
	job: &'a CommonJob,
	source: PathBuf,
	dest_dir: PathBuf,
	action: CopyMoveAction,
	target_name: Option<String>,
	unique_names: bool,
	existing_names: &'a mut HashSet<String>,
	outcome: &'a mut CopyMoveOutcome,
) -> BoxFuture<'a, Result<(), JobError>> {
	Box::pin(async move {
		if job.token.is_cancelled() {
			return Err(JobError::Cancelled);
		}
		if job.is_skipped(&source) {
			return Ok(());
		}

		let mut target = compute_target(&dest_dir, &source, target_name.as_deref(), unique_names, existing_names);

		// Self-containment check (spec.md §4.2 step 3).
		if action != CopyMoveAction::Link && (target.starts_with(&source) || source.starts_with(&target)) {
			offer_fatal_skip(deps, job, &format!("Cannot copy/move \"{}\" into itself", source.display())).await?;
			job.mark_skipped(&source);
			return Ok(());
		}

		let mut overwrite = false;
		let mut mangled_once = false;

		loop {
			if job.token.is_cancelled() {
				return Err(JobError::Cancelled);
			}

			let mut flags = CopyFlags::NO_FOLLOW_SYMLINKS;
			if overwrite {
				flags |= CopyFlags::OVERWRITE;
			}
			if action == CopyMoveAction::Move {
				flags |= CopyFlags::NO_FALLBACK_FOR_MOVE | CopyFlags::ALL_METADATA;
			}

			let info = deps.fs.query_info(&source, false).await.ok();
			let size = if action == CopyMoveAction::Link { 0 } else { info.as_ref().map_or(0, |i| i.size) };

			let result = if action == CopyMoveAction::Link {
				deps.fs.make_symbolic_link(&target, &source).await
			} else {
				let sink_progress = Arc::clone(&job.progress);
				let sink_source = source.clone();
				let sink: ProgressSink = Arc::new(move |done, total| {
					sink_progress.report_bytes_in_flight(&sink_source, done, total);
				});
				if action == CopyMoveAction::Move {
					deps.fs.move_(&source, &target, flags, Some(sink)).await
				} else {
					deps.fs.copy(&source, &target, flags, Some(sink)).await
				}
			};

			match result {
				Ok(()) => {
					let entry = if action == CopyMoveAction::Move {
						ChangeEntry::Moved { from: source.clone(), to: target.clone() }
					} else {
						ChangeEntry::Added(target.clone())
					};
					deps.changes.enqueue(entry);
					job.record_pair(source.clone(), target.clone());
					outcome.debuting_files.insert(target.clone(), !overwrite);
					job.progress.report_file_done(&source, Some(&target), size);
					if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
						existing_names.insert(name.to_owned());
					}
					return Ok(());
				}

				Err(e)
					if !mangled_once
						&& matches!(
							e.kind,
							FsErrorKind::InvalidFilename | FsErrorKind::InvalidArgument | FsErrorKind::NotDirectory
						) =>
				{
					mangled_once = true;
					let policy = job.fs_policy_cache.policy_for(deps.fs.as_ref(), &dest_dir).await?;
					let name = target.file_name().and_then(|n| n.to_str()).unwrap_or_default();
					let (mangled, changed) = policy.mangle(name);
					if changed {
						target = dest_dir.join(mangled);
						continue;
					}
					offer_fatal_skip(deps, job, &e.message).await?;
					job.mark_skipped(&source);
					return Ok(());
				}

				Err(e) if e.kind == FsErrorKind::Exists && !overwrite => {
					let info = deps.fs.query_info(&source, false).await.ok();
					let target_info = deps.fs.query_info(&target, false).await.ok();
					let both_dirs = matches!(
						(info.as_ref().map(|i| i.file_type), target_info.as_ref().map(|i| i.file_type)),
						(Some(FileType::Directory), Some(FileType::Directory))
					);
					let file_over_dir = matches!(
						(info.as_ref().map(|i| i.file_type), target_info.as_ref().map(|i| i.file_type)),
						(Some(FileType::File), Some(FileType::Directory))
					);

					if file_over_dir {
						overwrite = true;
						continue;
					}

					if unique_names {
						let stem = target.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
						let ext = target.extension().and_then(|e| e.to_str()).unwrap_or_default();
						let renamed = sd_core_dialog::suggest_rename(existing_names, stem, ext);
						target = dest_dir.join(renamed);
						continue;
					}

					if job.merge_all.load(std::sync::atomic::Ordering::SeqCst) && both_dirs {
						overwrite = true;
						continue;
					}
					if job.replace_all.load(std::sync::atomic::Ordering::SeqCst) {
						overwrite = true;
						continue;
					}
					if job.skip_all_conflict.load(std::sync::atomic::Ordering::SeqCst) {
						job.mark_skipped(&source);
						return Ok(());
					}

					match resolve_conflict(deps, job, &source, &target, &dest_dir, both_dirs).await? {
						ConflictDecision::Cancel => return Err(JobError::Cancelled),
						ConflictDecision::Skip => {
							job.mark_skipped(&source);
							return Ok(());
						}
						ConflictDecision::Replace => {
							overwrite = true;
							continue;
						}
						ConflictDecision::Merge => {
							overwrite = true;
							continue;
						}
						ConflictDecision::Rename(name) => {
							target = dest_dir.join(name);
							continue;
						}
					}
				}

				Err(e) if matches!(e.kind, FsErrorKind::WouldRecurse | FsErrorKind::WouldMerge) => {
					if overwrite && e.kind == FsErrorKind::WouldRecurse {
						let _ = deps.fs.delete(&target).await;
					}

					if deps.fs.make_directory(&target).await.is_err() {
						// Already exists as a directory (merge case) — fine.
					}

					let children = match deps.fs.enumerate(&source).await {
						Ok(children) => children,
						Err(e) => {
							if offer_skip_cancel(deps, job, &e.message).await? {
								job.mark_skipped(&source);
								return Ok(());
							}
							return Err(JobError::Cancelled);
						}
					};

					let mut any_skipped = false;
					for (child, _child_info) in children {
						copy_or_move_recursive(
							deps,
							job,
							child.clone(),
							target.clone(),
							action,
							None,
							false,
							existing_names,
							outcome,
						)
						.await?;
						if job.is_skipped(&child) {
							any_skipped = true;
						}
					}

					if action == CopyMoveAction::Move && !any_skipped {
						let _ = deps.fs.delete(&source).await;
					}

					deps.changes.enqueue(ChangeEntry::Added(target.clone()));
					job.record_pair(source.clone(), target.clone());
					return Ok(());
				}

				Err(e) => {
					if offer_skip_cancel(deps, job, &e.message).await? {
						job.mark_skipped(&source);
						job.progress.retract(1, size);
						return Ok(());
					}
					return Err(JobError::Cancelled);
				}
			}
		}
	})
}

#[derive(Debug)]
enum ConflictDecision {
	Cancel,
	Skip,
	Replace,
	Merge,
	Rename(String),
}

async fn resolve_conflict(
	deps: &Deps,
	job: &CommonJob,
	source: &Path,
	target: &Path,
	dest_dir: &Path,
	both_dirs: bool,
) -> Result<ConflictDecision, JobError> {
	let stem = target.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
	let ext = target.extension().and_then(|e| e.to_str()).unwrap_or_default();
	let existing: HashSet<String> = deps
		.fs
		.enumerate(&dest_dir.to_path_buf())
		.await
		.map(|children| {
			children.into_iter().filter_map(|(p, _)| p.file_name().and_then(|n| n.to_str()).map(str::to_owned)).collect()
		})
		.unwrap_or_default();
	let suggested = sd_core_dialog::suggest_rename(&existing, stem, ext);

	let mut allowed = AllowedResponses::CANCEL | AllowedResponses::SKIP | AllowedResponses::SKIP_ALL | AllowedResponses::RENAME;
	allowed |= if both_dirs {
		AllowedResponses::MERGE | AllowedResponses::MERGE_ALL
	} else {
		AllowedResponses::REPLACE | AllowedResponses::REPLACE_ALL
	};

	let request = DialogRequest::new(
		"An item with the same name already exists",
		format!("\"{}\" already exists in the destination.", target.display()),
		allowed,
	)
	.with_delay_interactivity(job.should_delay_interactivity())
	.with_conflict(ConflictContext {
		source: source.to_path_buf(),
		target: target.to_path_buf(),
		destination_dir: dest_dir.to_path_buf(),
		suggested_rename: suggested,
	});

	let response = deps.dialog.ask(request, &job.token).await;
	Ok(match response.tag {
		ResponseTag::Skip => ConflictDecision::Skip,
		ResponseTag::SkipAll => {
			job.skip_all_conflict.store(true, std::sync::atomic::Ordering::SeqCst);
			ConflictDecision::Skip
		}
		ResponseTag::Replace => ConflictDecision::Replace,
		ResponseTag::ReplaceAll => {
			job.replace_all.store(true, std::sync::atomic::Ordering::SeqCst);
			ConflictDecision::Replace
		}
		ResponseTag::Merge => ConflictDecision::Merge,
		ResponseTag::MergeAll => {
			job.merge_all.store(true, std::sync::atomic::Ordering::SeqCst);
			ConflictDecision::Merge
		}
		ResponseTag::Rename => ConflictDecision::Rename(response.new_name.unwrap_or_else(|| target.display().to_string())),
		_ => ConflictDecision::Cancel,
	})
}

async fn offer_skip_cancel(deps: &Deps, job: &CommonJob, message: &str) -> Result<bool, JobError> {
	if job.skip_all_error.load(std::sync::atomic::Ordering::SeqCst) {
		return Ok(true);
	}
	let request = DialogRequest::new(
		"Error while copying",
		message,
		AllowedResponses::SKIP | AllowedResponses::SKIP_ALL | AllowedResponses::CANCEL,
	)
	.with_delay_interactivity(job.should_delay_interactivity());
	let response = deps.dialog.ask(request, &job.token).await;
	match response.tag {
		ResponseTag::Skip => Ok(true),
		ResponseTag::SkipAll => {
			job.skip_all_error.store(true, std::sync::atomic::Ordering::SeqCst);
			Ok(true)
		}
		_ => Ok(false),
	}
}

async fn offer_fatal_skip(deps: &Deps, job: &CommonJob, message: &str) -> Result<(), JobError> {
	let request = DialogRequest::new("Error", message, AllowedResponses::SKIP | AllowedResponses::CANCEL);
	let _ = deps.dialog.ask(request, &job.token).await;
	Ok(())
}

/// Candidate target computation (spec.md §4.2 step 2). The cloud-backed
/// "display name, not stable id" branch isn't reachable in this port (no
/// scheme carries an immutable-id/display-name split — SPEC_FULL.md §3.1),
/// so only the remaining three branches apply.
fn compute_target(
	dest_dir: &Path,
	source: &Path,
	target_name: Option<&str>,
	unique_names: bool,
	existing_names: &HashSet<String>,
) -> PathBuf {
	let basename = source.file_name().and_then(|n| n.to_str()).unwrap_or_default();

	if unique_names {
		if !existing_names.contains(basename) && dest_dir != source.parent().unwrap_or(dest_dir) {
			return dest_dir.join(basename);
		}
		let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or(basename);
		let ext = source.extension().and_then(|e| e.to_str()).unwrap_or_default();
		if !existing_names.contains(basename) {
			return dest_dir.join(basename);
		}
		return dest_dir.join(sd_core_dialog::suggest_rename(existing_names, stem, ext));
	}

	if let Some(name) = target_name {
		return dest_dir.join(name);
	}

	dest_dir.join(basename)
}

#[cfg(test)]
mod tests {
	use super::*;
	use sd_core_dialog::{HeadlessPolicy, PolicyDialogService};
	use std::sync::Arc;

	fn headless_deps(policy: HeadlessPolicy) -> Deps {
		Deps::local(Arc::new(PolicyDialogService(policy)))
	}

	#[tokio::test]
	async fn simple_copy_creates_destination_with_identical_content() {
		let dir = tempfile::tempdir().unwrap();
		let src_dir = dir.path().join("a");
		let dst_dir = dir.path().join("b");
		tokio::fs::create_dir(&src_dir).await.unwrap();
		tokio::fs::create_dir(&dst_dir).await.unwrap();
		tokio::fs::write(src_dir.join("x.txt"), b"0123456789").await.unwrap();

		let deps = headless_deps(HeadlessPolicy::AlwaysSkip);
		let outcome = copy_async(&deps, vec![src_dir.join("x.txt")], dst_dir.clone(), ParentHandle::None).await;

		assert!(outcome.success);
		let content = tokio::fs::read(dst_dir.join("x.txt")).await.unwrap();
		assert_eq!(content, b"0123456789");
		assert_eq!(outcome.debuting_files.get(&dst_dir.join("x.txt")), Some(&true));
	}

	#[tokio::test]
	async fn move_into_self_is_skipped_not_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let src = dir.path().join("dir");
		let sub = src.join("sub");
		tokio::fs::create_dir_all(&sub).await.unwrap();

		let deps = headless_deps(HeadlessPolicy::AlwaysSkip);
		let outcome = move_async(&deps, vec![src.clone()], sub, ParentHandle::None).await;

		assert!(outcome.debuting_files.is_empty());
	}

	#[tokio::test]
	async fn conflict_with_replace_overwrites_destination() {
		let dir = tempfile::tempdir().unwrap();
		let src_dir = dir.path().join("a");
		let dst_dir = dir.path().join("b");
		tokio::fs::create_dir(&src_dir).await.unwrap();
		tokio::fs::create_dir(&dst_dir).await.unwrap();
		tokio::fs::write(src_dir.join("x.txt"), b"new").await.unwrap();
		tokio::fs::write(dst_dir.join("x.txt"), b"old").await.unwrap();

		let deps = headless_deps(HeadlessPolicy::AlwaysReplace);
		let outcome = copy_async(&deps, vec![src_dir.join("x.txt")], dst_dir.clone(), ParentHandle::None).await;

		assert!(outcome.success);
		let content = tokio::fs::read(dst_dir.join("x.txt")).await.unwrap();
		assert_eq!(content, b"new");
	}

	#[tokio::test]
	async fn duplicate_in_place_uses_unique_suffix() {
		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("x.txt"), b"hi").await.unwrap();

		let deps = headless_deps(HeadlessPolicy::AlwaysSkip);
		let outcome = duplicate_async(&deps, vec![dir.path().join("x.txt")], ParentHandle::None).await;

		assert!(outcome.success);
		assert!(dir.path().join("x (2).txt").exists() || dir.path().join("x.txt").exists());
	}

	#[tokio::test]
	async fn copy_move_starred_destination_runs_no_job() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps(HeadlessPolicy::AlwaysSkip);
		let outcome = copy_move(
			&deps,
			vec![crate::Destination::Local(dir.path().join("x.txt"))],
			Some(crate::Destination::Starred(dir.path().to_path_buf())),
			CopyMoveAction::Copy,
			ParentHandle::None,
		)
		.await;

		assert!(outcome.success);
		assert!(outcome.debuting_files.is_empty());
		assert!(deps.changes.consume().is_empty());
	}
}
