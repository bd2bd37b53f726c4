use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable, content-derived identifier of an archive.
///
/// Two copies of the same archive opened from different locations resolve to
/// the same identifier; the file path never participates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(Uuid);

impl ArchiveId {
    /// Wrap an identifier declared by the archive itself.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derive an identifier from the archive's bytes.
    ///
    /// Uses the first 16 bytes of the SHA-256 digest.
    #[must_use]
    pub fn from_content_hash(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&digest[..16]);
        Self(Uuid::from_bytes(raw))
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ArchiveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Bytes and mime type of a (non-redirect) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContent {
    /// Mime type declared by the archive.
    pub mime: String,
    /// Raw entry bytes.
    pub data: Vec<u8>,
}

/// One candidate produced by an archive's full-text index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Content path of the matching entry.
    pub path: String,
    /// Display title of the matching entry.
    pub title: String,
    /// Engine-provided relevance score.
    pub score: f32,
}

/// One entry of an archive's title index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleHit {
    /// Content path of the entry.
    pub path: String,
    /// Display title of the entry.
    pub title: String,
}

/// How much text to extract around a search hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetMode {
    /// No snippet.
    Disabled,
    /// The first non-empty paragraph of the entry.
    #[default]
    FirstParagraph,
    /// The first sentence of the entry.
    FirstSentence,
    /// A window of text around the first query match.
    Matches,
}

impl SnippetMode {
    /// Whether this mode produces any text.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Archive that owns the entry.
    pub archive: ArchiveId,
    /// Content path inside the archive.
    pub path: String,
    /// Display title.
    pub title: String,
    /// Relevance score; engine-provided or derived from edit distance.
    pub score: f32,
    /// Optional preview text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SearchResult {
    /// Deduplication key.
    #[must_use]
    pub fn key(&self) -> (ArchiveId, &str) {
        (self.archive, self.path.as_str())
    }

    /// Relevance ordering: descending score, then ascending path, then archive.
    #[must_use]
    pub fn relevance_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| self.archive.cmp(&other.archive))
    }
}

/// Sort by relevance and drop repeated `(archive, path)` pairs, keeping the
/// best-scored occurrence.
pub fn rank_results(results: &mut Vec<SearchResult>) {
    use std::collections::HashSet;

    results.sort_by(SearchResult::relevance_cmp);
    let mut seen = HashSet::new();
    results.retain(|r| {
        let (archive, path) = r.key();
        seen.insert((archive, path.to_owned()))
    });
}
