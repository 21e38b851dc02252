//! Per-job, per-destination-parent cache of filesystem type + mangling
//! policy (spec.md §4.1 "Filesystem-type query... Cached per-job
//! per-destination-parent").

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use sd_core_fs_capability::{policy, DestinationFsPolicy, FileSystem, FsTypeInfo};
use sd_core_job_errors::FsError;

pub struct FsPolicyCache {
	entries: Mutex<HashMap<PathBuf, (FsTypeInfo, &'static str)>>,
}

impl Default for FsPolicyCache {
	fn default() -> Self {
		Self::new()
	}
}

impl FsPolicyCache {
	#[must_use]
	pub fn new() -> Self {
		Self { entries: Mutex::new(HashMap::new()) }
	}

	/// Queries (and caches) the filesystem type for `parent`, the directory a
	/// destination path lives directly under.
	pub async fn query(
		&self,
		fs: &dyn FileSystem,
		parent: &std::path::Path,
	) -> Result<FsTypeInfo, FsError> {
		if let Some((info, _)) =
			self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(parent)
		{
			return Ok(info.clone());
		}

		let info = fs.query_filesystem_info(&parent.to_path_buf()).await?;
		self.entries
			.lock()
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.insert(parent.to_path_buf(), (info.clone(), ""));
		Ok(info)
	}

	/// Selects (and implicitly caches the lookup behind) the
	/// [`DestinationFsPolicy`] for `parent`, per its cached [`FsTypeInfo`].
	pub async fn policy_for(
		&self,
		fs: &dyn FileSystem,
		parent: &std::path::Path,
	) -> Result<Box<dyn DestinationFsPolicy>, FsError> {
		let info = self.query(fs, parent).await?;
		Ok(policy::select_policy(&info.fs_type))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn repeated_queries_for_same_parent_hit_the_cache() {
		let dir = tempfile::tempdir().unwrap();
		let fs = sd_core_fs_capability::LocalFileSystem::new();
		let cache = FsPolicyCache::new();

		let first = cache.query(&fs, dir.path()).await.unwrap();
		let second = cache.query(&fs, dir.path()).await.unwrap();
		assert_eq!(first.fs_type, second.fs_type);
	}
}
