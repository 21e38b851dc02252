//! Archive extraction (spec.md §4.4 "Extract", §6 `extract_files`).
//!
//! Grounded on `core/crates/file-actions/src/decompress/job.rs` for the
//! scan→free-space→decide-destination→stream-progress shape, adapted to
//! this port's `Extractor` capability (an event stream instead of the
//! teacher's polling `sd_task_system::Task` loop) and its per-archive
//! weighted-progress math (spec.md §4.4 step 4).

use std::{
	path::{Path, PathBuf},
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use sd_core_archive::{ArchiveEvent, ExtractOutcome as ArchiveExtractOutcome};
use sd_core_change_queue::ChangeEntry;
use sd_core_dialog::{AllowedResponses, DialogRequest, ResponseTag};
use sd_core_job_errors::{ArchiveError, FsError, JobError};
use sd_core_job_system::{abort, finalize, inhibit_power, new_job, start, CommonJob, OpKind, ParentHandle};
use sd_core_undo::OpKind as UndoOpKind;

use crate::Deps;

/// Result of `extract_files` (spec.md §3 `ExtractJob`).
#[derive(Debug, Default)]
pub struct ExtractOutcome {
	pub success: bool,
	pub output_files: Vec<PathBuf>,
	pub errors: Vec<JobError>,
}

pub async fn extract_files(deps: &Deps, sources: Vec<PathBuf>, destination_dir: PathBuf, parent: ParentHandle) -> ExtractOutcome {
	let job = new_job(OpKind::Extract, 0, 0, parent, None, Some(UndoOpKind::Extract));
	inhibit_power(&job, deps.power.as_ref(), "extracting archives").await;
	start(&job);

	let mut outcome = ExtractOutcome::default();

	let mut total_compressed_size = 0u64;
	let mut sizes = Vec::with_capacity(sources.len());
	for src in &sources {
		let size = deps.fs.query_info(src, true).await.map(|i| i.size).unwrap_or(0);
		sizes.push(size);
		total_compressed_size += size;
	}

	let base_progress = AtomicU64::new(0); // fixed-point, numerator over u32::MAX denominator

	'archives: for (src, compressed_size) in sources.iter().zip(sizes.iter().copied()) {
		if job.token.is_cancelled() {
			break;
		}

		let scan = match deps.extractor.scan(src).await {
			Ok(s) => s,
			Err(e) => {
				outcome.errors.push(JobError::Archive(e));
				continue;
			}
		};

		if let Ok(fs_info) = deps.fs.query_filesystem_info(&destination_dir).await {
			if fs_info.free_bytes < scan.total_decompressed_bytes {
				outcome.errors.push(JobError::Fatal(format!(
					"not enough free space to extract {} ({} bytes needed)",
					src.display(),
					scan.total_decompressed_bytes
				)));
				continue;
			}
		}

		let weight = if total_compressed_size > 0 {
			compressed_size as f64 / total_compressed_size as f64
		} else {
			1.0 / sources.len().max(1) as f64
		};
		let archive_base = base_progress.load(Ordering::SeqCst) as f64 / u32::MAX as f64;

		let decided_destination: Arc<std::sync::Mutex<Option<PathBuf>>> = Arc::new(std::sync::Mutex::new(None));
		let decide_box = {
			let decided_destination = decided_destination.clone();
			let destination_dir = destination_dir.clone();
			Arc::new(move |candidate: &Path, _entries: &[String]| -> PathBuf {
				let name = candidate.file_name().map(|n| n.to_os_string()).unwrap_or_default();
				let chosen = unique_sibling(&destination_dir, Path::new(&name));
				*decided_destination.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(chosen.clone());
				chosen
			})
		};

		let total = scan.expected_total_files.max(1);
		let progress = Arc::clone(&job.progress);
		let progress_subject = src.clone();
		let on_event = Arc::new(move |event: ArchiveEvent| {
			if let ArchiveEvent::Progress { files_done, .. } = event {
				let archive_fraction = files_done as f64 / total as f64;
				let overall = archive_base + weight * archive_fraction;
				progress.set_fraction(overall, Some(&progress_subject));
			}
		});

		let mut passphrase: Option<String> = None;
		let archive_result: Result<ArchiveExtractOutcome, ArchiveError> = loop {
			match deps
				.extractor
				.extract(src, decide_box.clone(), passphrase.clone(), on_event.clone(), &job.token)
				.await
			{
				Err(ArchiveError::PassphraseRequired | ArchiveError::BadPassphrase) => {
					match deps.passphrase.ask(src, &job.token).await {
						Some(p) => {
							passphrase = Some(p);
							continue;
						}
						None => break Err(ArchiveError::PassphraseRequired),
					}
				}
				other => break other,
			}
		};

		match archive_result {
			Ok(result) => {
				deps.changes.enqueue(ChangeEntry::Added(result.output_root.clone()));
				job.record_pair(src.clone(), result.output_root.clone());
				outcome.output_files.push(result.output_root);
				base_progress.fetch_add((weight * u32::MAX as f64) as u64, Ordering::SeqCst);
				let cumulative = base_progress.load(Ordering::SeqCst) as f64 / u32::MAX as f64;
				job.progress.set_fraction(cumulative, Some(src));
			}
			Err(ArchiveError::PassphraseRequired) => {
				cleanup_partial(deps, &decided_destination).await;
			}
			Err(e) => {
				cleanup_partial(deps, &decided_destination).await;
				if offer_skip_cancel(deps, &job, &e.to_string()).await {
					continue;
				}
				outcome.errors.push(JobError::Archive(e));
				job.token.cancel();
				break 'archives;
			}
		}
	}

	outcome.success = !job.token.is_cancelled() && !outcome.output_files.is_empty();
	if outcome.success {
		job.progress.set_fraction(1.0, None);
	}
	if job.token.is_cancelled() {
		abort(&job);
	}
	finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), outcome.success).await;
	deps.changes.consume();
	outcome
}

async fn cleanup_partial(deps: &Deps, decided_destination: &std::sync::Mutex<Option<PathBuf>>) {
	let path = decided_destination.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
	if let Some(path) = path {
		let _ = delete_recursive_best_effort(deps, &path).await;
	}
}

/// Best-effort recursive delete of a partially-written extraction
/// destination (spec.md §4.4 step 5, "if the partially-created destination
/// exists, recursively delete it"); errors are swallowed since this already
/// runs on the failure path.
fn delete_recursive_best_effort<'a>(deps: &'a Deps, path: &'a Path) -> sd_core_task_system::BoxFuture<'a, Result<(), FsError>> {
	Box::pin(async move {
		match deps.fs.delete(&path.to_path_buf()).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind == sd_core_job_errors::FsErrorKind::NotEmpty => {
				for (child, _) in deps.fs.enumerate(&path.to_path_buf()).await? {
					delete_recursive_best_effort(deps, &child).await?;
				}
				deps.fs.delete(&path.to_path_buf()).await
			}
			Err(e) if e.kind == sd_core_job_errors::FsErrorKind::NotFound => Ok(()),
			Err(e) => Err(e),
		}
	})
}

async fn offer_skip_cancel(deps: &Deps, job: &CommonJob, message: &str) -> bool {
	if job.skip_all_error.load(Ordering::SeqCst) {
		return true;
	}
	let request = DialogRequest::new("Error while extracting", message, AllowedResponses::SKIP | AllowedResponses::SKIP_ALL | AllowedResponses::CANCEL);
	match deps.dialog.ask(request, &job.token).await.tag {
		ResponseTag::Skip => true,
		ResponseTag::SkipAll => {
			job.skip_all_error.store(true, Ordering::SeqCst);
			true
		}
		_ => false,
	}
}

/// Generates a unique sibling of `name` under `dir`, the same numbered-
/// suffix scheme as create.rs's conflict handling.
fn unique_sibling(dir: &Path, name: &Path) -> PathBuf {
	let candidate = dir.join(name);
	if !candidate.exists() {
		return candidate;
	}

	let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("archive");
	let ext = name.extension().and_then(|e| e.to_str()).unwrap_or("");
	let mut counter = 2;
	loop {
		let numbered = if ext.is_empty() {
			format!("{stem} ({counter})")
		} else {
			format!("{stem} ({counter}).{ext}")
		};
		let candidate = dir.join(numbered);
		if !candidate.exists() {
			return candidate;
		}
		counter += 1;
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

	#[test]
	fn unique_sibling_numbers_on_conflict() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("a.zip"), b"x").unwrap();
		let chosen = unique_sibling(dir.path(), Path::new("a.zip"));
		assert_eq!(chosen, dir.path().join("a (2).zip"));
	}

	#[tokio::test]
	async fn extract_files_with_no_sources_reports_failure_without_undo() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps();
		let outcome = extract_files(&deps, vec![], dir.path().to_path_buf(), ParentHandle::None).await;
		assert!(!outcome.success);
		assert!(outcome.output_files.is_empty());
	}
}
