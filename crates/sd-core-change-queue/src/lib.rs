//! The change queue (spec.md §4.7): a process-wide, monotonically ordered
//! log of path-level change events consumed by the UI.
//!
//! Per design note §9 ("Global singletons... become explicit process-wide
//! services injected at startup"), this is a plain injectable struct, not a
//! compile-time global; `sd-core`'s aggregator holds the single instance and
//! hands `Arc<ChangeQueue>` to every job and monitor.

use std::{
	path::PathBuf,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, Mutex,
	},
};

use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEntry {
	Added(PathBuf),
	Changed(PathBuf),
	Removed(PathBuf),
	Moved { from: PathBuf, to: PathBuf },
	Unmounted(PathBuf),
}

/// Observer registered by the UI; invoked with entries in enqueue order each
/// time [`ChangeQueue::consume`] runs.
pub type ChangeObserver = Arc<dyn Fn(&[ChangeEntry]) + Send + Sync>;

struct Inner {
	entries: Mutex<Vec<ChangeEntry>>,
	observer: Mutex<Option<ChangeObserver>>,
	idle_scheduled: AtomicBool,
	notify: Notify,
}

/// Thread-safe producer/consumer queue. Cheap to clone (shares one `Arc`).
#[derive(Clone)]
pub struct ChangeQueue(Arc<Inner>);

impl Default for ChangeQueue {
	fn default() -> Self {
		Self::new()
	}
}

impl ChangeQueue {
	#[must_use]
	pub fn new() -> Self {
		Self(Arc::new(Inner {
			entries: Mutex::new(Vec::new()),
			observer: Mutex::new(None),
			idle_scheduled: AtomicBool::new(false),
			notify: Notify::new(),
		}))
	}

	/// The UI registers its "apply these to my in-memory file lists" hook.
	pub fn set_observer(&self, observer: ChangeObserver) {
		*self.0.observer.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(observer);
	}

	/// Thread-safe append; callable from any job's worker task.
	pub fn enqueue(&self, entry: ChangeEntry) {
		trace!(?entry, "enqueue change entry");
		self.0
			.entries
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.push(entry);
		self.0.notify.notify_waiters();
	}

	/// Drains the queue and dispatches to the registered observer. Called by
	/// the UI loop, and exactly once by a job after its execute phase
	/// completes (even after abort), per spec.md §4.7.
	pub fn consume(&self) -> Vec<ChangeEntry> {
		let drained: Vec<ChangeEntry> = std::mem::take(
			&mut *self
				.0
				.entries
				.lock()
				.unwrap_or_else(std::sync::PoisonError::into_inner),
		);

		if !drained.is_empty() {
			if let Some(observer) = &*self
				.0
				.observer
				.lock()
				.unwrap_or_else(std::sync::PoisonError::into_inner)
			{
				observer(&drained);
			}
		}

		drained
	}

	/// Schedules at most one outstanding "run `consume` soon" request,
	/// returning `true` if this call was the one that won the race (i.e.
	/// the caller should actually schedule the idle callback). Mirrors
	/// spec.md §4.8's "single-shot boolean guard" for directory monitors.
	#[must_use]
	pub fn try_claim_idle_schedule(&self) -> bool {
		self.0
			.idle_scheduled
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
	}

	/// Clears the idle-schedule guard once the scheduled `consume` has run.
	pub fn clear_idle_schedule(&self) {
		self.0.idle_scheduled.store(false, Ordering::SeqCst);
	}

	/// Resolves the next time `enqueue` is called; useful for tests that
	/// want to await a specific entry rather than poll.
	pub async fn notified(&self) {
		self.0.notify.notified().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::Path;
	use std::sync::Mutex as StdMutex;

	#[test]
	fn consume_drains_in_enqueue_order() {
		let queue = ChangeQueue::new();
		queue.enqueue(ChangeEntry::Added(PathBuf::from("/a")));
		queue.enqueue(ChangeEntry::Added(PathBuf::from("/b")));

		let drained = queue.consume();
		assert_eq!(
			drained,
			vec![
				ChangeEntry::Added(PathBuf::from("/a")),
				ChangeEntry::Added(PathBuf::from("/b")),
			]
		);
		assert!(queue.consume().is_empty());
	}

	#[test]
	fn observer_runs_once_per_consume_with_all_pending_entries() {
		let queue = ChangeQueue::new();
		let seen: Arc<StdMutex<Vec<ChangeEntry>>> = Arc::new(StdMutex::new(Vec::new()));
		let seen_clone = Arc::clone(&seen);
		queue.set_observer(Arc::new(move |entries: &[ChangeEntry]| {
			seen_clone.lock().unwrap().extend_from_slice(entries);
		}));

		queue.enqueue(ChangeEntry::Removed(PathBuf::from("/x")));
		queue.consume();

		assert_eq!(seen.lock().unwrap().len(), 1);
	}

	#[test]
	fn idle_schedule_guard_only_lets_one_caller_through() {
		let queue = ChangeQueue::new();
		assert!(queue.try_claim_idle_schedule());
		assert!(!queue.try_claim_idle_schedule());
		queue.clear_idle_schedule();
		assert!(queue.try_claim_idle_schedule());
	}

	#[test]
	fn moved_entry_matches_by_value() {
		let a = ChangeEntry::Moved { from: PathBuf::from("/a"), to: Path::new("/b").to_path_buf() };
		let b = ChangeEntry::Moved { from: PathBuf::from("/a"), to: PathBuf::from("/b") };
		assert_eq!(a, b);
	}
}
