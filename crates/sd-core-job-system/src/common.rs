//! [`CommonJob`]: the fields spec.md §3 "Job (abstract)" lists as shared by
//! every job, plus the lifecycle functions of spec.md §4.1
//! (`new_job`/`inhibit_power`/`start`/`finalize`/`abort`).

use std::{
	collections::HashSet,
	path::{Path, PathBuf},
	sync::{atomic::AtomicBool, Arc, Mutex},
	time::Instant,
};

use sd_core_task_system::CancellationToken;
use sd_core_undo::{InMemoryUndoManager, Op, UndoManager};
use tracing::{debug, instrument};

use crate::{
	fs_policy_cache::FsPolicyCache,
	parent::ParentHandle,
	power::{InhibitCookie, InhibitFlags, PowerInhibit},
	progress::ProgressHandle,
	scan::OpKind,
};

/// Common job state (spec.md §3). Lives for as long as the worker task that
/// owns the job; freed after the completion callback runs.
pub struct CommonJob {
	pub token: CancellationToken,
	/// `Arc`-wrapped so extract/compress can clone a handle into the
	/// `'static` event-sink closures their archive capability calls require
	/// (`sd-core-archive`'s `EventSink`), without cloning the whole job.
	pub progress: Arc<ProgressHandle>,
	pub parent: ParentHandle,
	pub dbus_interactivity: Option<String>,
	pub start_time: Instant,
	pub inhibit_cookie: Mutex<Option<InhibitCookie>>,

	/// Latched "apply to all subsequent conflicts/errors of this kind"
	/// flags (spec.md §3, "Latched response" in the glossary).
	pub skip_all_error: AtomicBool,
	pub skip_all_conflict: AtomicBool,
	pub merge_all: AtomicBool,
	pub replace_all: AtomicBool,
	pub delete_all: AtomicBool,

	pub undo_op: Mutex<Option<Op>>,
	pub skip_files: Mutex<HashSet<PathBuf>>,
	pub skip_readdir_error: Mutex<HashSet<PathBuf>>,
	pub last_dialog_at: Mutex<Option<Instant>>,
	pub fs_policy_cache: FsPolicyCache,
}

impl CommonJob {
	/// `new_job` (spec.md §4.1): allocates the common state with a fresh
	/// cancellation token and progress handle.
	#[must_use]
	pub fn new(
		op: OpKind,
		total_files: u64,
		total_bytes: u64,
		parent: ParentHandle,
		dbus_interactivity: Option<String>,
		undo_kind: Option<sd_core_undo::OpKind>,
	) -> Self {
		Self {
			token: CancellationToken::new(),
			progress: Arc::new(ProgressHandle::new(op, total_files, total_bytes)),
			parent,
			dbus_interactivity,
			start_time: Instant::now(),
			inhibit_cookie: Mutex::new(None),
			skip_all_error: AtomicBool::new(false),
			skip_all_conflict: AtomicBool::new(false),
			merge_all: AtomicBool::new(false),
			replace_all: AtomicBool::new(false),
			delete_all: AtomicBool::new(false),
			undo_op: Mutex::new(undo_kind.map(Op::new)),
			skip_files: Mutex::new(HashSet::new()),
			skip_readdir_error: Mutex::new(HashSet::new()),
			last_dialog_at: Mutex::new(None),
			fs_policy_cache: FsPolicyCache::new(),
		}
	}

	#[cfg(test)]
	#[must_use]
	pub fn new_for_test() -> Self {
		Self::new(OpKind::Copy, 0, 0, ParentHandle::None, None, None)
	}

	pub fn mark_skipped(&self, path: &Path) {
		self.skip_files
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.insert(path.to_path_buf());
	}

	#[must_use]
	pub fn is_skipped(&self, path: &Path) -> bool {
		self.skip_files.lock().unwrap_or_else(std::sync::PoisonError::into_inner).contains(path)
	}

	pub fn mark_readdir_skip(&self, path: &Path) {
		self.skip_readdir_error
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.insert(path.to_path_buf());
	}

	/// `delay_interactivity = (elapsed > 2s) AND (time_since_last_dialog <
	/// 1s)` (spec.md §4.9), recorded here and consulted by every dialog call
	/// site before constructing a `DialogRequest`.
	#[must_use]
	pub fn should_delay_interactivity(&self) -> bool {
		let last = *self.last_dialog_at.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
		let since_last = last.map_or(std::time::Duration::from_secs(u64::MAX), |t| t.elapsed());
		let result = sd_core_dialog::should_delay_interactivity(self.start_time.elapsed(), since_last);
		*self.last_dialog_at.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Instant::now());
		result
	}

	pub fn record_pair(&self, origin: impl Into<PathBuf>, target: impl Into<PathBuf>) {
		if let Some(op) = self.undo_op.lock().unwrap_or_else(std::sync::PoisonError::into_inner).as_mut() {
			op.add_origin_target_pair(origin, target);
		}
	}

	pub fn record_mode_pre_image(&self, path: impl Into<PathBuf>, mode: u32) {
		if let Some(op) = self.undo_op.lock().unwrap_or_else(std::sync::PoisonError::into_inner).as_mut() {
			op.add_mode_pre_image(path, mode);
		}
	}
}

/// `new_job` entry point: see [`CommonJob::new`].
#[must_use]
pub fn new_job(
	op: OpKind,
	total_files: u64,
	total_bytes: u64,
	parent: ParentHandle,
	dbus_interactivity: Option<String>,
	undo_kind: Option<sd_core_undo::OpKind>,
) -> CommonJob {
	CommonJob::new(op, total_files, total_bytes, parent, dbus_interactivity, undo_kind)
}

/// `inhibit_power` (spec.md §4.1): requests session inhibit for
/// suspend+logout; a no-op power capability makes this a cheap no-op too.
#[instrument(skip(job, power))]
pub async fn inhibit_power(job: &CommonJob, power: &dyn PowerInhibit, reason: &str) {
	let cookie = power.inhibit(reason, InhibitFlags::LOGOUT | InhibitFlags::SUSPEND).await;
	*job.inhibit_cookie.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = cookie;
}

/// `start` (spec.md §4.1): marks progress as running.
pub fn start(job: &CommonJob) {
	job.progress.set_paused(false);
	debug!("job started");
}

/// `finalize` (spec.md §4.1): releases the power inhibit, marks progress
/// finished, and records the undo builder into the undo manager iff the job
/// completed successfully and was not itself a replay of a previous undo.
pub async fn finalize(
	job: &CommonJob,
	power: &dyn PowerInhibit,
	undo_manager: &dyn UndoManager,
	success: bool,
) {
	if let Some(cookie) = job.inhibit_cookie.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() {
		power.uninhibit(cookie).await;
	}

	if success && !undo_manager.is_operating().await {
		let op = job.undo_op.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
		if let Some(op) = op {
			if !op.is_empty() {
				undo_manager.record(op).await;
			}
		}
	}

	if job.token.is_cancelled() {
		job.progress.set_cancelled();
	}
	debug!(success, "job finalized");
}

/// `abort` (spec.md §4.1): idempotent, callable from any thread. Trips the
/// cancellation token and clears the undo builder so a partially-done
/// operation is never recorded (spec.md §5 "Cancellation").
pub fn abort(job: &CommonJob) {
	job.token.cancel();
	job.progress.set_cancelled();
	*job.undo_op.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = None;
}

/// Convenience used by [`InMemoryUndoManager`]-backed hosts (tests,
/// `apps/cli`) so call sites don't need to import the undo crate directly.
#[must_use]
pub fn default_undo_manager() -> InMemoryUndoManager {
	InMemoryUndoManager::new()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::power::NoopPowerInhibit;

	#[tokio::test]
	async fn abort_clears_undo_builder_and_trips_token() {
		let job = CommonJob::new_for_test();
		job.record_pair("/a", "/b");
		abort(&job);
		assert!(job.token.is_cancelled());
		assert!(job.undo_op.lock().unwrap().is_none());
	}

	#[tokio::test]
	async fn finalize_drops_empty_undo_op_without_recording() {
		let job = CommonJob::new(
			OpKind::Copy,
			0,
			0,
			ParentHandle::None,
			None,
			Some(sd_core_undo::OpKind::Copy),
		);
		let power = NoopPowerInhibit::new();
		let undo = default_undo_manager();

		finalize(&job, &power, &undo, true).await;
		assert!(undo.history().await.is_empty());
	}

	#[tokio::test]
	async fn finalize_records_nonempty_undo_op_on_success() {
		let job = CommonJob::new(
			OpKind::Copy,
			0,
			0,
			ParentHandle::None,
			None,
			Some(sd_core_undo::OpKind::Copy),
		);
		job.record_pair("/a/x", "/b/x");
		let power = NoopPowerInhibit::new();
		let undo = default_undo_manager();

		finalize(&job, &power, &undo, true).await;
		assert_eq!(undo.history().await.len(), 1);
	}
}
