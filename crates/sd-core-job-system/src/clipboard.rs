//! `Clipboard`/texture-source capability backing `paste_image_from_clipboard`
//! and `save_image_from_texture` (spec.md §6). Neither operation has a
//! dedicated [`SourceInfo`](crate::SourceInfo)/job shape in spec.md §3 — both
//! are single-file creates whose only engine-specific piece is *where the
//! bytes come from* — so this is kept as narrow as [`RecentFiles`].

use async_trait::async_trait;
use tracing::debug;

/// Already-encoded image bytes plus the filename extension they should be
/// written under (e.g. `"png"`), so the core never has to know a pixel
/// format.
#[derive(Debug, Clone)]
pub struct EncodedImage {
	pub bytes: Vec<u8>,
	pub extension: String,
}

#[async_trait]
pub trait Clipboard: Send + Sync {
	/// Returns the clipboard's current image contents, if any (spec.md §6
	/// `paste_image_from_clipboard`).
	async fn read_image(&self) -> Option<EncodedImage>;
}

/// Used by tests and hosts with no real clipboard backend; always reports an
/// empty clipboard.
#[derive(Debug, Default)]
pub struct NoopClipboard;

impl NoopClipboard {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

#[async_trait]
impl Clipboard for NoopClipboard {
	async fn read_image(&self) -> Option<EncodedImage> {
		debug!("clipboard read_image (noop)");
		None
	}
}
