//! The job framework (spec.md §4.1): the lifecycle every job in
//! `sd-file-actions` runs through, plus the scan and destination-verification
//! passes most of them share.
//!
//! Grounded on `core/crates/job-system/src/lib.rs` for the lifecycle shape
//! (`new`/`dispatch`/`shutdown` become `new_job`/`start`/`finalize`/`abort`
//! here, stripped of the database-backed resumable-job store per
//! SPEC_FULL.md §2.1 — there is no VDFS in this port, so there is nothing to
//! resume a job against across a restart).

mod clipboard;
mod common;
mod fs_policy_cache;
mod mount;
mod parent;
mod power;
mod progress;
mod recent;
mod scan;
mod verify;

pub use clipboard::{Clipboard, EncodedImage, NoopClipboard};
pub use common::{abort, default_undo_manager, finalize, inhibit_power, new_job, start, CommonJob};
pub use fs_policy_cache::FsPolicyCache;
pub use mount::{Mount, MountEject, MountOperation, NoopMountEject};
pub use parent::ParentHandle;
pub use power::{InhibitCookie, InhibitFlags, NoopPowerInhibit, PowerInhibit};
pub use progress::{
	get_formatted_time, seconds_count_format_time_units, ProgressHandle, ProgressSnapshot,
	TransferInfo,
};
pub use recent::{NoopRecentFiles, RecentFiles};
pub use scan::{scan_sources, OpKind, ScannedDirInfo, SourceInfo};
pub use verify::{verify_destination, VerifyOutcome};

use uuid::Uuid;

pub type JobId = Uuid;
