//! [`ParentHandle`]: the Rust-native replacement for the original's weak
//! reference from a dialog back to its parent window (design note §9).
//!
//! A job never assumes its parent is still alive; every dialog-realize call
//! site guards the handle with [`ParentHandle::is_alive`] instead of
//! dereferencing a raw pointer the GUI toolkit might have already freed.

use std::sync::{Arc, Weak};

/// Identity of whatever asked for a job, carried only so dialogs can be
/// parented (or not) to it. The core never calls into `Local`'s payload; it
/// only checks liveness.
#[derive(Clone, Default)]
pub enum ParentHandle {
	#[default]
	None,
	/// A window/view living in the same process. `Weak` because the job
	/// must never keep a transient window alive just by running.
	Local(Weak<()>),
	/// An opaque foreign-process handle (e.g. a dbus object path) used to
	/// parent dialogs across process boundaries, per spec.md §3 "external
	/// interactivity handle".
	External(String),
}

impl ParentHandle {
	#[must_use]
	pub fn local(token: &Arc<()>) -> Self {
		Self::Local(Arc::downgrade(token))
	}

	#[must_use]
	pub fn external(handle: impl Into<String>) -> Self {
		Self::External(handle.into())
	}

	/// `true` unless this is a `Local` handle whose window has already been
	/// dropped. `None`/`External` are always considered alive: there is no
	/// local object to outlive.
	#[must_use]
	pub fn is_alive(&self) -> bool {
		match self {
			Self::None | Self::External(_) => true,
			Self::Local(weak) => weak.strong_count() > 0,
		}
	}
}

impl std::fmt::Debug for ParentHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "ParentHandle::None"),
			Self::Local(weak) => write!(f, "ParentHandle::Local(alive={})", weak.strong_count() > 0),
			Self::External(handle) => write!(f, "ParentHandle::External({handle})"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn local_handle_reports_dead_after_window_drops() {
		let window = Arc::new(());
		let handle = ParentHandle::local(&window);
		assert!(handle.is_alive());
		drop(window);
		assert!(!handle.is_alive());
	}

	#[test]
	fn none_and_external_are_always_alive() {
		assert!(ParentHandle::None.is_alive());
		assert!(ParentHandle::external("dbus:/org/x").is_alive());
	}
}
