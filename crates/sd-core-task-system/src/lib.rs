//! Cancellation primitives and the single-worker task executor each job
//! drives its per-file/per-archive work through.
//!
//! The teacher workspace's `sd-task-system` multiplexes many jobs over a
//! shared thread pool. Per spec.md §5 ("one worker thread per job... no
//! shared thread pool"), this crate instead gives every job a private
//! sequential runner: tasks execute one at a time on the job's own future,
//! checking the [`CancellationToken`] at the head of every iteration.

use std::{
	future::Future,
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

pub type TaskId = Uuid;

/// What woke up a task's [`Interrupter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionKind {
	Pause,
	Cancel,
}

/// Outcome of a single [`Task::run`] invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
	Done,
	Paused,
	Canceled,
}

#[derive(Debug, Default)]
struct TokenInner {
	cancelled: AtomicBool,
	paused: AtomicBool,
	notify: Notify,
}

/// A job's cancellation token (spec.md §3 "Job (abstract)").
///
/// Cloning shares the same underlying flag; `cancel` is idempotent and safe
/// from any thread, per spec.md §5.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<TokenInner>);

impl CancellationToken {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.cancelled.store(true, Ordering::SeqCst);
		self.0.notify.notify_waiters();
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.0.cancelled.load(Ordering::SeqCst)
	}

	pub fn set_paused(&self, paused: bool) {
		self.0.paused.store(paused, Ordering::SeqCst);
		if !paused {
			self.0.notify.notify_waiters();
		}
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		self.0.paused.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn interrupter(&self) -> Interrupter {
		Interrupter(Arc::clone(&self.0))
	}
}

/// Handed to a running [`Task`] so it can cooperatively suspend. Mirrors the
/// teacher's `sd_task_system::Interrupter`, but exposes a named `interrupted`
/// future rather than implementing `Future` directly, since this crate has
/// no reactor of its own to drive a custom poll loop against.
#[derive(Debug, Clone)]
pub struct Interrupter(Arc<TokenInner>);

impl Interrupter {
	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.0.cancelled.load(Ordering::SeqCst)
	}

	/// Resolves once the token is cancelled or (un)paused, reporting which.
	/// A task checks this at every suspension point, per spec.md §5.
	pub async fn interrupted(&self) -> InterruptionKind {
		loop {
			if self.0.cancelled.load(Ordering::SeqCst) {
				return InterruptionKind::Cancel;
			}
			if self.0.paused.load(Ordering::SeqCst) {
				return InterruptionKind::Pause;
			}
			self.0.notify.notified().await;
		}
	}
}

/// A unit of cancellable, cooperatively-suspendable work.
#[async_trait]
pub trait Task<E>: Send + Sync {
	fn id(&self) -> TaskId;

	/// Human-readable name for progress/log lines (teacher idiom: each task
	/// names itself rather than the job guessing from its type).
	fn name(&self) -> &'static str;

	async fn run(&mut self, interrupter: &Interrupter) -> Result<ExecStatus, E>;
}

/// Final status of one task as observed by the job loop.
pub enum TaskStatus<E> {
	Done,
	Canceled,
	Error(E),
}

/// Runs `tasks` to completion sequentially on the current future, stopping
/// as soon as the token trips. This is the "single worker thread per job"
/// executor spec.md §5 mandates — there is no fan-out to a shared pool.
pub async fn run_to_completion<E>(
	mut tasks: Vec<Box<dyn Task<E>>>,
	token: &CancellationToken,
) -> Vec<(TaskId, TaskStatus<E>)> {
	let mut results = Vec::with_capacity(tasks.len());
	let interrupter = token.interrupter();

	for task in &mut tasks {
		if token.is_cancelled() {
			results.push((task.id(), TaskStatus::Canceled));
			continue;
		}

		match task.run(&interrupter).await {
			Ok(ExecStatus::Done) => results.push((task.id(), TaskStatus::Done)),
			Ok(ExecStatus::Paused | ExecStatus::Canceled) => {
				results.push((task.id(), TaskStatus::Canceled));
			}
			Err(e) => results.push((task.id(), TaskStatus::Error(e))),
		}
	}

	results
}

/// Boxed future alias used where a task's body needs to be stored before
/// being awaited (conflict-protocol call sites in `sd-file-actions`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[cfg(test)]
mod tests {
	use super::*;

	struct ReadyTask {
		id: TaskId,
	}

	#[async_trait]
	impl Task<std::convert::Infallible> for ReadyTask {
		fn id(&self) -> TaskId {
			self.id
		}

		fn name(&self) -> &'static str {
			"ready"
		}

		async fn run(
			&mut self,
			_interrupter: &Interrupter,
		) -> Result<ExecStatus, std::convert::Infallible> {
			Ok(ExecStatus::Done)
		}
	}

	#[tokio::test]
	async fn runs_all_tasks_when_not_cancelled() {
		let token = CancellationToken::new();
		let tasks: Vec<Box<dyn Task<std::convert::Infallible>>> = vec![
			Box::new(ReadyTask { id: Uuid::new_v4() }),
			Box::new(ReadyTask { id: Uuid::new_v4() }),
		];

		let results = run_to_completion(tasks, &token).await;
		assert_eq!(results.len(), 2);
		assert!(matches!(results[0].1, TaskStatus::Done));
	}

	#[tokio::test]
	async fn cancelling_before_run_skips_remaining_tasks() {
		let token = CancellationToken::new();
		token.cancel();

		let tasks: Vec<Box<dyn Task<std::convert::Infallible>>> =
			vec![Box::new(ReadyTask { id: Uuid::new_v4() })];

		let results = run_to_completion(tasks, &token).await;
		assert!(matches!(results[0].1, TaskStatus::Canceled));
	}

	#[tokio::test]
	async fn interrupter_reports_cancel() {
		let token = CancellationToken::new();
		let interrupter = token.interrupter();
		token.cancel();
		assert_eq!(interrupter.interrupted().await, InterruptionKind::Cancel);
	}
}
