//! Content path resolution.
//!
//! [`ContentResolver`] turns `(archive, path)` pairs into bytes, following
//! redirect chains up to a configured depth. Every call takes a lease from
//! the registry for its duration and never changes registry state.
//!
//! Content is also addressable as a URL of the form
//! `kiwix://<archive-id>/<path>` (see [`ContentUrl`]).

use crate::backend::ArchiveReader;
use crate::config::ContentConfig;
use crate::profiling::PerformanceMetrics;
use crate::registry::ReaderRegistry;
use crate::types::ArchiveId;
use crate::{Error, Result};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

/// Characters escaped in the path of a [`ContentUrl`].
const PATH_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// A resolved entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    /// Mime type of the final entry
    pub mime: String,
    /// Entry bytes, or the requested slice of them
    pub data: Vec<u8>,
    /// Path of the entry the redirects ended at
    pub path: String,
}

/// Size and type of an entry, without its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    /// Mime type of the final entry
    pub mime: String,
    /// Length in bytes
    pub size: u64,
    /// Path of the entry the redirects ended at
    pub path: String,
}

/// Address of an entry: `kiwix://<archive-id>/<path>`.
///
/// Content paths are absolute; a path given without a leading `/` gets one.
///
/// ```rust
/// use zimkit_core::{ArchiveId, ContentUrl};
///
/// let id = ArchiveId::from_content_hash(b"wiki");
/// let url = ContentUrl::new(id, "/A/Café au lait");
/// let text = url.to_string();
/// assert!(text.starts_with("kiwix://"));
/// assert!(text.ends_with("/A/Caf%C3%A9%20au%20lait"));
/// assert_eq!(text.parse::<ContentUrl>().unwrap(), url);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentUrl {
    /// Archive holding the entry
    pub archive: ArchiveId,
    /// Absolute content path
    pub path: String,
}

impl ContentUrl {
    /// URL scheme for archive content.
    pub const SCHEME: &'static str = "kiwix";

    /// Address of `path` inside `archive`.
    pub fn new(archive: ArchiveId, path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self { archive, path }
    }

    /// Parse a `kiwix://` URL.
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;
        if url.scheme() != Self::SCHEME {
            return Err(Error::InvalidUrl(format!(
                "{input}: expected {}:// scheme",
                Self::SCHEME
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{input}: missing archive id")))?;
        let archive = host
            .parse::<ArchiveId>()
            .map_err(|e| Error::InvalidUrl(format!("{input}: bad archive id: {e}")))?;
        let path = percent_decode_str(url.path())
            .decode_utf8()
            .map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))?;
        Ok(Self::new(archive, path.into_owned()))
    }

    /// As a [`Url`].
    pub fn to_url(&self) -> Result<Url> {
        Url::parse(&self.to_string()).map_err(|e| Error::InvalidUrl(e.to_string()))
    }
}

impl fmt::Display for ContentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            Self::SCHEME,
            self.archive,
            utf8_percent_encode(&self.path, PATH_ESCAPES)
        )
    }
}

impl FromStr for ContentUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split `len` bytes into consecutive inclusive ranges of at most `chunk`
/// bytes, for streaming large entries.
///
/// ```rust
/// use zimkit_core::byte_ranges;
///
/// assert_eq!(byte_ranges(5, 2), vec![0..=1, 2..=3, 4..=4]);
/// assert!(byte_ranges(0, 2).is_empty());
/// ```
pub fn byte_ranges(len: u64, chunk: u64) -> Vec<RangeInclusive<u64>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk = chunk.max(1);
    let mut ranges = Vec::with_capacity(usize::try_from(len.div_ceil(chunk)).unwrap_or(0));
    let mut start = 0;
    while start < len {
        let end = start.saturating_add(chunk).min(len);
        ranges.push(start..=end - 1);
        start = end;
    }
    ranges
}

/// Resolves content paths inside open archives.
#[derive(Debug, Clone)]
pub struct ContentResolver {
    registry: Arc<ReaderRegistry>,
    max_redirect_depth: usize,
    chunk_size: u64,
    metrics: Option<PerformanceMetrics>,
}

impl ContentResolver {
    /// Resolver over `registry`.
    pub const fn new(registry: Arc<ReaderRegistry>, config: &ContentConfig) -> Self {
        Self {
            registry,
            max_redirect_depth: config.max_redirect_depth,
            chunk_size: config.chunk_size,
            metrics: None,
        }
    }

    /// Count resolved entries and bytes in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn with_reader<T>(
        &self,
        id: ArchiveId,
        f: impl FnOnce(&dyn ArchiveReader) -> Result<T>,
    ) -> Result<T> {
        let lease = self.registry.lease(id)?;
        f(lease.reader()?)
    }

    /// Follow redirects from `path` to a content entry.
    fn follow(&self, reader: &dyn ArchiveReader, path: &str) -> Result<String> {
        let mut current = path.to_string();
        for _ in 0..self.max_redirect_depth {
            match reader.redirect_target(&current) {
                Some(target) => {
                    trace!("Redirect {current} -> {target}");
                    current = target;
                },
                None => return Ok(current),
            }
        }
        if reader.redirect_target(&current).is_none() {
            return Ok(current);
        }
        debug!("Giving up on redirects from {path} after {} hops", self.max_redirect_depth);
        Err(Error::RedirectLimit {
            path: path.to_string(),
            depth: self.max_redirect_depth,
        })
    }

    /// Bytes and mime type of `path`, following redirects.
    ///
    /// # Errors
    ///
    /// [`Error::ArchiveUnavailable`] when `id` is not open,
    /// [`Error::NotFound`] when the path (or a redirect target) is absent,
    /// [`Error::RedirectLimit`] when the chain is too long.
    pub fn resolve(&self, id: ArchiveId, path: &str) -> Result<Content> {
        self.with_reader(id, |reader| {
            let path = self.follow(reader, path)?;
            let entry = reader.read_entry(&path)?;
            if let Some(metrics) = &self.metrics {
                metrics.record_content(entry.data.len());
            }
            Ok(Content {
                mime: entry.mime,
                data: entry.data,
                path,
            })
        })
    }

    /// Final path of a redirect chain starting at `path`, or `None` when
    /// `path` is not a redirect.
    pub fn resolve_redirect(&self, id: ArchiveId, path: &str) -> Result<Option<String>> {
        self.with_reader(id, |reader| {
            if reader.redirect_target(path).is_none() {
                return Ok(None);
            }
            self.follow(reader, path).map(Some)
        })
    }

    /// Path of the archive's main page, with redirects followed.
    pub fn main_page(&self, id: ArchiveId) -> Result<Option<String>> {
        self.with_reader(id, |reader| {
            reader
                .main_page()
                .map(|path| self.follow(reader, &path))
                .transpose()
        })
    }

    /// Path of a random article.
    pub fn random_page(&self, id: ArchiveId) -> Result<Option<String>> {
        self.with_reader(id, |reader| Ok(reader.random_entry()))
    }

    /// Mime type and size of `path` after redirects.
    pub fn content_info(&self, id: ArchiveId, path: &str) -> Result<ContentInfo> {
        self.with_reader(id, |reader| {
            let path = self.follow(reader, path)?;
            let entry = reader.read_entry(&path)?;
            Ok(ContentInfo {
                mime: entry.mime,
                size: entry.data.len() as u64,
                path,
            })
        })
    }

    /// A byte range of `path` after redirects.
    ///
    /// The end is clamped to the entry length. A range starting past the end
    /// of the entry is an error.
    pub fn resolve_range(
        &self,
        id: ArchiveId,
        path: &str,
        range: RangeInclusive<u64>,
    ) -> Result<Content> {
        let mut content = self.resolve(id, path)?;
        let len = content.data.len() as u64;
        let (start, end) = (*range.start(), *range.end());
        if start > end || start >= len {
            return Err(Error::Other(format!(
                "range {start}-{end} is outside '{}' ({len} bytes)",
                content.path
            )));
        }
        let to_index = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        let end = end.min(len - 1);
        content.data = content.data[to_index(start)..=to_index(end)].to_vec();
        Ok(content)
    }

    /// Byte ranges for streaming `path` in configured-size chunks.
    ///
    /// Each range can be fetched with [`ContentResolver::resolve_range`]. An
    /// empty entry has no ranges.
    pub fn chunks(&self, id: ArchiveId, path: &str) -> Result<Vec<RangeInclusive<u64>>> {
        let info = self.content_info(id, path)?;
        Ok(byte_ranges(info.size, self.chunk_size))
    }

    /// Resolve a [`ContentUrl`].
    pub fn resolve_url(&self, url: &ContentUrl) -> Result<Content> {
        self.resolve(url.archive, &url.path)
    }
}
