//! The seam between the core and the archive/search engine.
//!
//! The core never parses archives or builds full-text indexes itself. It
//! drives an [`ArchiveBackend`] to identify and open files, and talks to each
//! opened archive through an [`ArchiveReader`]. The crate ships one backend,
//! [`crate::bundle::BundleBackend`]; a native archive library plugs in by
//! implementing the same two traits.
//!
//! Readers are queried from several threads at once (content requests on the
//! caller's thread, searches on the blocking pool), so both traits require
//! `Send + Sync`.

use crate::types::{ArchiveId, EntryContent, IndexHit, SnippetMode, TitleHit};
use crate::Result;
use std::path::Path;

/// Opens archive files.
pub trait ArchiveBackend: Send + Sync {
    /// Compute the content-derived identifier of the archive at `path`.
    ///
    /// Fails with [`crate::Error::Open`] when the file is missing, unreadable
    /// or not an archive.
    fn probe_identifier(&self, path: &Path) -> Result<ArchiveId>;

    /// Open the archive at `path` for querying.
    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveReader>>;
}

/// Read access to one opened archive.
pub trait ArchiveReader: Send + Sync {
    /// Identifier of this archive.
    fn id(&self) -> ArchiveId;

    /// Value of a named metadata field (`Title`, `Language`, `Tags`, ...).
    fn metadata_field(&self, name: &str) -> Option<String>;

    /// Favicon bytes, when the archive carries one.
    fn favicon(&self) -> Option<Vec<u8>>;

    /// Bytes and mime type of the entry at `path`.
    ///
    /// Redirect entries are not followed here; callers check
    /// [`ArchiveReader::redirect_target`] first. Fails with
    /// [`crate::Error::NotFound`] for absent paths.
    fn read_entry(&self, path: &str) -> Result<EntryContent>;

    /// Single-hop redirect target, or `None` when `path` is not a redirect.
    fn redirect_target(&self, path: &str) -> Option<String>;

    /// Designated main page path.
    fn main_page(&self) -> Option<String>;

    /// Path of a randomly chosen article.
    fn random_entry(&self) -> Option<String>;

    /// Whether [`ArchiveReader::full_text_search`] is backed by an index.
    fn has_full_text_index(&self) -> bool;

    /// Ranked full-text candidates, best first, at most `limit`.
    fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>>;

    /// Titles starting with `prefix` (case-insensitive), in index order, at
    /// most `count`.
    fn title_prefix_search(&self, prefix: &str, count: usize) -> Result<Vec<TitleHit>>;

    /// Every title in the archive, in index order.
    fn titles(&self) -> Vec<TitleHit>;

    /// Number of titles [`ArchiveReader::titles`] would return.
    fn title_count(&self) -> usize;

    /// Preview text for `path`, shaped by `mode` and bounded by `max_chars`.
    fn extract_snippet(
        &self,
        path: &str,
        query: &str,
        mode: SnippetMode,
        max_chars: usize,
    ) -> Option<String>;

    /// Number of article entries.
    fn article_count(&self) -> u64;

    /// Number of media entries.
    fn media_count(&self) -> u64;

    /// Number of entries of any kind.
    fn entry_count(&self) -> u64;
}
