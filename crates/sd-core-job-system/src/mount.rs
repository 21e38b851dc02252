//! `MountMonitor`-adjacent capability (spec.md §6 lists the monitor side,
//! `signal mount_removed(mount)` / `mount.root -> Path`; `unmount_mount_full`
//! (spec.md §6 entry points) needs an actuation side too, so this adds the
//! narrow counterpart: asking the platform to actually eject/unmount a
//! volume, kept as small as `PowerInhibit`/`RecentFiles`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

/// A mountable volume as the engine sees it: just its root path. Richer
/// identity (UUID, drive, icon) belongs to the host's volume-monitor layer,
/// out of scope per spec.md §1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
	pub root: PathBuf,
}

/// Opaque handle a `mount_operation` authentication dialog might need;
/// unused by every local implementation but kept so `unmount_mount_full`'s
/// signature matches spec.md §6.
#[derive(Debug, Clone, Copy, Default)]
pub struct MountOperation;

#[async_trait]
pub trait MountEject: Send + Sync {
	/// Unmounts `root`, additionally ejecting the physical media if
	/// `eject` is set.
	async fn unmount(&self, root: &PathBuf, operation: Option<&MountOperation>, eject: bool) -> Result<(), String>;
}

/// Used by tests and `apps/cli`, where there is no real volume-monitor
/// backend to eject against.
#[derive(Default)]
pub struct NoopMountEject;

impl NoopMountEject {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl MountEject for NoopMountEject {
	async fn unmount(&self, root: &PathBuf, _operation: Option<&MountOperation>, eject: bool) -> Result<(), String> {
		debug!(root = %root.display(), eject, "mount unmount (noop)");
		Ok(())
	}
}
