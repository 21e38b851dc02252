//! Archive compression (spec.md §4.4 "Compress", §6 `compress`).
//!
//! Grounded on `core/crates/file-actions/src/compress/job.rs` for the
//! scan-then-hand-to-codec shape, paired with `extract.rs`'s event-stream
//! adaptation of the teacher's polling `Task` loop onto this port's
//! [`Compressor`] capability.

use std::path::PathBuf;

use sd_core_archive::ArchiveFormat;
use sd_core_change_queue::ChangeEntry;
use sd_core_dialog::{AllowedResponses, DialogRequest};
use sd_core_job_errors::JobError;
use sd_core_job_system::{abort, finalize, inhibit_power, new_job, scan_sources, start, OpKind, ParentHandle};
use sd_core_undo::OpKind as UndoOpKind;

use crate::Deps;

/// Result of `compress` (spec.md §3 `CompressJob`).
#[derive(Debug, Default)]
pub struct CompressOutcome {
	pub success: bool,
	pub error: Option<String>,
}

/// `compress` (spec.md §6): scans `sources` to total size/count, drops any
/// path the scan had to skip, and hands what remains to the archive
/// capability. If nothing survives the scan, the job fails without
/// recording undo (spec.md §4.4 "Compress": "If nothing remains, mark
/// failure without undo").
pub async fn compress(
	deps: &Deps,
	sources: Vec<PathBuf>,
	output_file: PathBuf,
	format: ArchiveFormat,
	passphrase: Option<String>,
	parent: ParentHandle,
) -> CompressOutcome {
	let job = new_job(OpKind::Compress, 0, 0, parent, None, Some(UndoOpKind::Compress));
	inhibit_power(&job, deps.power.as_ref(), "compressing files").await;
	start(&job);

	let mut outcome = CompressOutcome::default();

	let scan = scan_sources(deps.fs.as_ref(), deps.dialog.as_ref(), &job, &sources, OpKind::Compress, |_| {}).await;
	let scan = match scan {
		Ok(scan) => scan,
		Err(JobError::Cancelled) => {
			abort(&job);
			finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
			deps.changes.consume();
			return outcome;
		}
		Err(e) => {
			outcome.error = Some(e.to_string());
			abort(&job);
			finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
			deps.changes.consume();
			return outcome;
		}
	};
	let _ = (scan.num_files, scan.num_bytes); // accumulated totals, kept for parity with spec.md's total_size/total_files

	let remaining: Vec<PathBuf> = sources.into_iter().filter(|s| !job.is_skipped(s)).collect();
	if remaining.is_empty() {
		outcome.success = false;
		abort(&job);
		finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), false).await;
		deps.changes.consume();
		return outcome;
	}

	let progress = std::sync::Arc::clone(&job.progress);
	let progress_subject = output_file.clone();
	let on_event = std::sync::Arc::new(move |event: sd_core_archive::ArchiveEvent| {
		if let sd_core_archive::ArchiveEvent::Progress { .. } = event {
			progress.report_file_done(&progress_subject, None, 0);
		}
	});

	let result = deps
		.compressor
		.compress(&remaining, &output_file, format, passphrase, on_event, &job.token)
		.await;

	match result {
		Ok(()) => {
			deps.changes.enqueue(ChangeEntry::Added(output_file.clone()));
			for source in &remaining {
				job.record_pair(source.clone(), output_file.clone());
			}
			// Undo is dropped if the output archive does not exist at the
			// end (spec.md §7 "For compress, undo is dropped if the output
			// archive does not exist").
			let output_exists = deps.fs.query_info(&output_file, true).await.is_ok();
			outcome.success = output_exists;
			if !output_exists {
				abort(&job);
			}
		}
		Err(e) => {
			let request = DialogRequest::new("Error while compressing", e.to_string(), AllowedResponses::CANCEL);
			let _ = deps.dialog.ask(request, &job.token).await;
			outcome.error = Some(e.to_string());
			outcome.success = false;
			abort(&job);
		}
	}

	finalize(&job, deps.power.as_ref(), deps.undo.as_ref(), outcome.success).await;
	deps.changes.consume();
	outcome
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
	async fn compress_with_no_sources_fails_without_undo() {
		let dir = tempfile::tempdir().unwrap();
		let deps = headless_deps();
		let outcome = compress(
			&deps,
			vec![],
			dir.path().join("out.zip"),
			ArchiveFormat::Zip,
			None,
			ParentHandle::None,
		)
		.await;
		assert!(!outcome.success);
		assert!(deps.undo.history().await.is_empty());
	}

	#[tokio::test]
	async fn compress_single_file_produces_output_archive() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("a.txt");
		tokio::fs::write(&file, b"hello").await.unwrap();

		let deps = headless_deps();
		let outcome = compress(
			&deps,
			vec![file],
			dir.path().join("out.zip"),
			ArchiveFormat::Zip,
			None,
			ParentHandle::None,
		)
		.await;

		assert!(outcome.success);
		assert!(dir.path().join("out.zip").exists());
	}
}
