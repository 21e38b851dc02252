//! `PowerInhibit` capability (spec.md §6), acquired in `inhibit_power` and
//! released in `finalize` (spec.md §4.1).

use async_trait::async_trait;
use tracing::debug;

bitflags::bitflags! {
	#[derive(Debug, Clone, Copy, PartialEq, Eq)]
	pub struct InhibitFlags: u32 {
		const LOGOUT  = 0b01;
		const SUSPEND = 0b10;
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InhibitCookie(pub u64);

#[async_trait]
pub trait PowerInhibit: Send + Sync {
	async fn inhibit(&self, reason: &str, flags: InhibitFlags) -> Option<InhibitCookie>;

	async fn uninhibit(&self, cookie: InhibitCookie);
}

/// Used when the host isn't a session app (spec.md §4.1 "may be a no-op"):
/// tests and `apps/cli`.
#[derive(Default)]
pub struct NoopPowerInhibit {
	next: std::sync::atomic::AtomicU64,
}

impl NoopPowerInhibit {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl PowerInhibit for NoopPowerInhibit {
	async fn inhibit(&self, reason: &str, flags: InhibitFlags) -> Option<InhibitCookie> {
		let cookie = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
		debug!(reason, ?flags, cookie, "power inhibit (noop)");
		Some(InhibitCookie(cookie))
	}

	async fn uninhibit(&self, cookie: InhibitCookie) {
		debug!(cookie = cookie.0, "power uninhibit (noop)");
	}
}
