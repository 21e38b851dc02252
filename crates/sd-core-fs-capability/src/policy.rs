//! `DestinationFsPolicy` (design note §9): abstracts the filename mangling,
//! max-name-length and max-file-size rules that spec.md §4.1 encodes as
//! string comparisons against `vfat`/`ntfs`/`fuse`/`cifs`/`exfat` tags.

const FORBIDDEN: &[char] = &['"', '/', '\\', '<', '>', ':', '|', '?', '*'];

pub trait DestinationFsPolicy: Send + Sync {
	fn forbidden_chars(&self) -> &'static [char];

	fn max_name_length(&self) -> usize;

	/// `4 GiB - 1`, the FAT32 single-file ceiling; `None` for filesystems
	/// without a practical limit.
	fn max_file_size(&self) -> Option<u64>;

	fn needs_mangling(&self) -> bool;

	/// Replaces forbidden/control characters with `_` and strips trailing
	/// whitespace. Returns `(mangled_name, changed)`; `changed` tells the
	/// caller whether a retry is worthwhile (spec.md §4.1, "returns a
	/// boolean indicating whether it changed the string").
	fn mangle(&self, name: &str) -> (String, bool) {
		if !self.needs_mangling() {
			return (name.to_owned(), false);
		}

		let forbidden = self.forbidden_chars();
		let mut out: String = name
			.chars()
			.map(|c| {
				if forbidden.contains(&c) || c.is_control() {
					'_'
				} else {
					c
				}
			})
			.collect();

		let trimmed_len = out.trim_end().len();
		if trimmed_len != out.len() {
			out.truncate(trimmed_len);
		}

		let changed = out != name;
		(out, changed)
	}
}

/// Default policy for POSIX-native filesystems (ext4, xfs, btrfs, apfs, ...):
/// no mangling, no practical name-length or size ceiling worth enforcing.
#[derive(Debug, Default)]
pub struct PosixPolicy;

impl DestinationFsPolicy for PosixPolicy {
	fn forbidden_chars(&self) -> &'static [char] {
		&[]
	}

	fn max_name_length(&self) -> usize {
		255
	}

	fn max_file_size(&self) -> Option<u64> {
		None
	}

	fn needs_mangling(&self) -> bool {
		false
	}
}

/// Policy for FAT/NTFS/FUSE/CIFS/exFAT-family destinations, per spec.md §4.1
/// "Filename mangling for destination FS".
#[derive(Debug, Default)]
pub struct FatLikePolicy;

impl DestinationFsPolicy for FatLikePolicy {
	fn forbidden_chars(&self) -> &'static [char] {
		FORBIDDEN
	}

	fn max_name_length(&self) -> usize {
		255
	}

	fn max_file_size(&self) -> Option<u64> {
		Some(4 * 1024 * 1024 * 1024 - 1)
	}

	fn needs_mangling(&self) -> bool {
		true
	}
}

/// Selects the policy for a destination's filesystem tag (as returned by
/// `FileSystem::query_filesystem_info`), cached per destination parent by
/// the job (spec.md §4.1 "Cached per-job per-destination-parent").
#[must_use]
pub fn select_policy(fs_type: &str) -> Box<dyn DestinationFsPolicy> {
	match fs_type {
		"vfat" | "fat" | "fat32" | "exfat" | "msdos" | "ntfs" | "fuseblk" | "fuse" | "cifs"
		| "smb3" => Box::new(FatLikePolicy),
		_ => Box::new(PosixPolicy),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn posix_policy_never_mangles() {
		let policy = PosixPolicy;
		let (name, changed) = policy.mangle("weird:name?.txt");
		assert_eq!(name, "weird:name?.txt");
		assert!(!changed);
	}

	#[test]
	fn fat_policy_replaces_forbidden_chars_and_trims_trailing_whitespace() {
		let policy = FatLikePolicy;
		let (name, changed) = policy.mangle("a/b:c  ");
		assert_eq!(name, "a_b_c");
		assert!(changed);
	}

	#[test]
	fn fat_policy_leaves_clean_names_untouched() {
		let policy = FatLikePolicy;
		let (name, changed) = policy.mangle("clean_name.txt");
		assert_eq!(name, "clean_name.txt");
		assert!(!changed);
	}

	#[test]
	fn select_policy_maps_known_fat_like_tags() {
		assert!(select_policy("ntfs").needs_mangling());
		assert!(select_policy("ext4").max_file_size().is_none());
	}
}
