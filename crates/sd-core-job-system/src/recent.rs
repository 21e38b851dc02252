//! `RecentFiles` capability (spec.md §6), used by `new_file`/`new_folder` to
//! register the created path with the desktop's recent-files list.

use async_trait::async_trait;
use tracing::debug;

#[async_trait]
pub trait RecentFiles: Send + Sync {
	async fn add(&self, uri: &str);
}

#[derive(Debug, Default)]
pub struct NoopRecentFiles;

impl NoopRecentFiles {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl RecentFiles for NoopRecentFiles {
	async fn add(&self, uri: &str) {
		debug!(uri, "recent files add (noop)");
	}
}
