//! The `UndoManager` capability (spec.md §6), shaped after the teacher's
//! `job-system/src/reversible.rs` but with the database dropped per
//! SPEC_FULL.md §2.1 — this crate records *what* happened, not how to
//! replay it against a job system, leaving replay to the host.

use std::{path::PathBuf, sync::Mutex};

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
	Copy,
	Move,
	Duplicate,
	CreateLink,
	RestoreFromTrash,
	Trash,
	CreateEmptyFile,
	CreateFileFromTemplate,
	CreateFolder,
	Extract,
	Compress,
	RecPermissions,
}

/// A single undoable operation, built incrementally by a job as it
/// processes sources and recorded by [`UndoManager::record`] at
/// `finalize` (spec.md §4.1), iff the job completed without being a replay
/// of a previous undo.
#[derive(Debug, Clone, Default)]
pub struct Op {
	pub kind: Option<OpKind>,
	pub pairs: Vec<(PathBuf, PathBuf)>,
	/// Pre-image permission bits recorded before `set_permissions_recursive`
	/// mutates a path, so an undo of `RecPermissions` can restore them.
	pub mode_pre_images: Vec<(PathBuf, u32)>,
}

impl Op {
	#[must_use]
	pub fn new(kind: OpKind) -> Self {
		Self { kind: Some(kind), ..Self::default() }
	}

	pub fn add_origin_target_pair(&mut self, origin: impl Into<PathBuf>, target: impl Into<PathBuf>) {
		self.pairs.push((origin.into(), target.into()));
	}

	pub fn add_mode_pre_image(&mut self, path: impl Into<PathBuf>, mode: u32) {
		self.mode_pre_images.push((path.into(), mode));
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.pairs.is_empty() && self.mode_pre_images.is_empty()
	}
}

#[async_trait]
pub trait UndoManager: Send + Sync {
	/// `true` while a job spawned specifically to undo a previous operation
	/// is running — `finalize` must not record a new undo entry for it
	/// (spec.md §4.1 "iff the job completed successfully and was not
	/// already under replay").
	async fn is_operating(&self) -> bool;

	async fn record(&self, op: Op);

	async fn history(&self) -> Vec<Op>;
}

#[derive(Default)]
pub struct InMemoryUndoManager {
	operating: Mutex<bool>,
	history: Mutex<Vec<Op>>,
}

impl InMemoryUndoManager {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_operating(&self, operating: bool) {
		*self.operating.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = operating;
	}
}

#[async_trait]
impl UndoManager for InMemoryUndoManager {
	async fn is_operating(&self) -> bool {
		*self.operating.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	async fn record(&self, op: Op) {
		self.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(op);
	}

	async fn history(&self) -> Vec<Op> {
		self.history.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn records_are_dropped_when_op_is_empty_at_finalize() {
		let manager = InMemoryUndoManager::new();
		let op = Op::new(OpKind::Copy);
		assert!(op.is_empty());
		// Caller decides whether to record; an empty op is the "fully
		// failed, no output" case from spec.md §7, dropped rather than
		// recorded.
		if !op.is_empty() {
			manager.record(op).await;
		}
		assert!(manager.history().await.is_empty());
	}

	#[tokio::test]
	async fn partial_success_still_records_what_happened() {
		let manager = InMemoryUndoManager::new();
		let mut op = Op::new(OpKind::Copy);
		op.add_origin_target_pair("/a/x", "/b/x");
		manager.record(op).await;

		let history = manager.history().await;
		assert_eq!(history.len(), 1);
		assert_eq!(history[0].pairs[0].1, PathBuf::from("/b/x"));
	}

	#[tokio::test]
	async fn is_operating_gates_replay_recursion() {
		let manager = InMemoryUndoManager::new();
		manager.set_operating(true);
		assert!(manager.is_operating().await);
	}
}
