//! Descriptive archive metadata, read once per handle.

use crate::backend::{ArchiveBackend, ArchiveReader};
use crate::registry::ReaderRegistry;
use crate::types::ArchiveId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a library view shows about one archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Archive identifier
    pub id: ArchiveId,
    /// Display title; the file name when the archive declares none
    pub title: String,
    /// Short description
    pub description: Option<String>,
    /// ISO 639-3 language code(s)
    pub language: Option<String>,
    /// Tags without the `_key:value` flag tags
    pub tags: Vec<String>,
    /// Flags encoded in `_key:value` tags
    pub flags: TagFlags,
    /// Creation date
    pub created: Option<NaiveDate>,
    /// Author of the content
    pub creator: Option<String>,
    /// Who packaged the archive
    pub publisher: Option<String>,
    /// Origin identifier shared by all versions of the same content
    pub name: Option<String>,
    /// Variant of the content, such as `maxi` or `nopic`
    pub flavour: Option<String>,
    /// Number of articles
    pub article_count: u64,
    /// Number of images, videos and sounds
    pub media_count: u64,
    /// Number of entries of any kind
    pub entry_count: u64,
    /// Size of the archive file in bytes, when it is a local file
    pub file_size: Option<u64>,
    /// Whether the archive has a full-text index
    pub has_full_text_index: bool,
    /// Favicon bytes
    #[serde(skip)]
    pub favicon: Option<Vec<u8>>,
}

/// Flags carried in `_key:value` tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFlags {
    /// `_category:` value
    pub category: Option<String>,
    /// `_pictures:no` clears this
    pub pictures: bool,
    /// `_videos:no` clears this
    pub videos: bool,
    /// `_details:no` clears this
    pub details: bool,
    /// `_ftindex:` value, when present
    pub full_text_index: Option<bool>,
}

impl Default for TagFlags {
    fn default() -> Self {
        Self {
            category: None,
            pictures: true,
            videos: true,
            details: true,
            full_text_index: None,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Split a `Tags` field into plain tags and flags.
///
/// Tags are separated by `;`. Flag tags look like `_pictures:no`; unknown
/// flag keys are dropped.
pub fn parse_tags(raw: &str) -> (Vec<String>, TagFlags) {
    let mut tags = Vec::new();
    let mut flags = TagFlags::default();

    for tag in raw.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        let Some(flag) = tag.strip_prefix('_') else {
            tags.push(tag.to_string());
            continue;
        };
        let Some((key, value)) = flag.split_once(':') else {
            continue;
        };
        match key {
            "category" => flags.category = Some(value.trim().to_string()),
            "pictures" => flags.pictures = parse_flag(value).unwrap_or(true),
            "videos" => flags.videos = parse_flag(value).unwrap_or(true),
            "details" => flags.details = parse_flag(value).unwrap_or(true),
            "ftindex" => flags.full_text_index = parse_flag(value),
            _ => debug!("Ignoring unknown tag flag '{tag}'"),
        }
    }
    (tags, flags)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ArchiveMetadata {
    /// Query every field from `reader`.
    pub fn read(id: ArchiveId, path: &Path, reader: &dyn ArchiveReader) -> Self {
        let field = |name: &str| non_empty(reader.metadata_field(name));

        let title = field("Title").unwrap_or_else(|| {
            path.file_stem()
                .map_or_else(|| id.to_string(), |s| s.to_string_lossy().into_owned())
        });
        let (tags, flags) = field("Tags").as_deref().map(parse_tags).unwrap_or_default();
        let created = field("Date").and_then(|date| {
            NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| debug!("Unparseable Date '{date}' in {id}: {e}"))
                .ok()
        });

        Self {
            id,
            title,
            description: field("Description"),
            language: field("Language"),
            tags,
            flags,
            created,
            creator: field("Creator"),
            publisher: field("Publisher"),
            name: field("Name"),
            flavour: field("Flavour"),
            article_count: reader.article_count(),
            media_count: reader.media_count(),
            entry_count: reader.entry_count(),
            file_size: std::fs::metadata(path).ok().map(|m| m.len()),
            has_full_text_index: reader.has_full_text_index(),
            favicon: reader.favicon(),
        }
    }
}

/// Memoized metadata lookups for open archives.
#[derive(Debug, Clone)]
pub struct MetadataCache {
    registry: Arc<ReaderRegistry>,
}

impl MetadataCache {
    /// Cache over the archives in `registry`.
    pub const fn new(registry: Arc<ReaderRegistry>) -> Self {
        Self { registry }
    }

    /// Metadata of an open archive, read on first request.
    ///
    /// Returns `None` when `id` is not open.
    pub fn metadata(&self, id: ArchiveId) -> Option<ArchiveMetadata> {
        let lease = self.registry.get(id)?;
        let reader = lease.reader().ok()?;
        let metadata = lease
            .metadata_slot()
            .get_or_init(|| ArchiveMetadata::read(id, lease.path(), reader));
        Some(metadata.clone())
    }

    /// Favicon of an open archive.
    pub fn favicon(&self, id: ArchiveId) -> Option<Vec<u8>> {
        self.metadata(id).and_then(|m| m.favicon)
    }

    /// Read metadata from a file without registering it.
    ///
    /// The reader is opened through the registry's backend and dropped before
    /// returning. Returns `None` when the file cannot be opened.
    pub fn metadata_from_file(&self, path: impl AsRef<Path>) -> Option<ArchiveMetadata> {
        read_from_file(self.registry.backend().as_ref(), path.as_ref())
    }
}

fn read_from_file(backend: &dyn ArchiveBackend, path: &Path) -> Option<ArchiveMetadata> {
    match backend.open(path) {
        Ok(reader) => Some(ArchiveMetadata::read(reader.id(), path, reader.as_ref())),
        Err(e) => {
            warn!("Cannot read metadata from {}: {e}", path.display());
            None
        },
    }
}
