//! In-memory backend for tests.
//!
//! [`MockArchive`] is a scriptable [`ArchiveReader`]: entries and metadata
//! are added with builder calls, full-text hits are scripted per query, and
//! engine failures can be injected. A [`Gate`] blocks engine calls until the
//! test releases it, which makes cancellation and supersession observable at
//! a known point.
//!
//! Available to this crate's tests and, with the `mock` feature, to
//! downstream crates.
//!
//! ```
//! # #[cfg(feature = "mock")] {
//! use zimkit_core::testing::{MockArchive, MockBackend};
//! use zimkit_core::ReaderRegistry;
//! use std::sync::Arc;
//!
//! let backend = MockBackend::new().with_archive(
//!     "/lib/fruit.zim",
//!     MockArchive::new("fruit").with_article("/A/Apple", "Apple", "<p>apple</p>"),
//! );
//! let registry = ReaderRegistry::new(Arc::new(backend));
//! let id = registry.open("/lib/fruit.zim").unwrap();
//! assert!(registry.contains(id));
//! # }
//! ```

use crate::backend::{ArchiveBackend, ArchiveReader};
use crate::snippet;
use crate::types::{ArchiveId, EntryContent, IndexHit, SnippetMode, TitleHit};
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A latch that blocks callers of [`Gate::wait`] until [`Gate::open`].
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl Gate {
    /// A closed gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Release all current and future waiters.
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).open = true;
        cvar.notify_all();
    }

    /// Block until the gate is open.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        state.waiting += 1;
        cvar.notify_all();
        while !state.open {
            state = cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting -= 1;
    }

    /// Number of callers currently blocked.
    pub fn waiting(&self) -> usize {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).waiting
    }

    /// Async-friendly wait until at least `count` callers are blocked.
    ///
    /// Returns `false` on timeout.
    pub async fn blocked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.waiting() < count {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        true
    }
}

/// Call counters shared by all clones of a [`MockArchive`].
#[derive(Debug, Default)]
pub struct MockStats {
    metadata_reads: AtomicUsize,
    full_text_calls: AtomicUsize,
    snippet_calls: AtomicUsize,
}

impl MockStats {
    /// Metadata fields read so far.
    pub fn metadata_reads(&self) -> usize {
        self.metadata_reads.load(Ordering::SeqCst)
    }

    /// Full-text searches run so far.
    pub fn full_text_calls(&self) -> usize {
        self.full_text_calls.load(Ordering::SeqCst)
    }

    /// Snippets extracted so far.
    pub fn snippet_calls(&self) -> usize {
        self.snippet_calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
enum MockEntry {
    Content {
        mime: String,
        data: Vec<u8>,
        title: String,
    },
    Redirect {
        target: String,
        title: String,
    },
}

/// A scriptable in-memory archive.
#[derive(Debug, Clone)]
pub struct MockArchive {
    id: ArchiveId,
    metadata: BTreeMap<String, String>,
    favicon: Option<Vec<u8>>,
    entries: BTreeMap<String, MockEntry>,
    main_page: Option<String>,
    aliases: Vec<TitleHit>,
    hits: HashMap<String, Vec<IndexHit>>,
    full_text: bool,
    failure: Option<String>,
    search_gate: Option<Gate>,
    snippet_gate: Option<(String, Gate)>,
    stats: Arc<MockStats>,
}

impl MockArchive {
    /// Empty archive whose identifier is derived from `name`.
    pub fn new(name: &str) -> Self {
        Self {
            id: ArchiveId::from_content_hash(name.as_bytes()),
            metadata: BTreeMap::new(),
            favicon: None,
            entries: BTreeMap::new(),
            main_page: None,
            aliases: Vec::new(),
            hits: HashMap::new(),
            full_text: true,
            failure: None,
            search_gate: None,
            snippet_gate: None,
            stats: Arc::default(),
        }
    }

    /// Identifier of this archive.
    pub const fn id(&self) -> ArchiveId {
        self.id
    }

    /// Counters shared with every clone.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// Set a metadata field.
    #[must_use]
    pub fn with_metadata(mut self, name: &str, value: &str) -> Self {
        self.metadata.insert(name.to_string(), value.to_string());
        self
    }

    /// Attach a favicon.
    #[must_use]
    pub fn with_favicon(mut self, bytes: &[u8]) -> Self {
        self.favicon = Some(bytes.to_vec());
        self
    }

    /// Add an HTML article.
    #[must_use]
    pub fn with_article(mut self, path: &str, title: &str, html: &str) -> Self {
        self.entries.insert(path.to_string(), MockEntry::Content {
            mime: "text/html".to_string(),
            data: html.as_bytes().to_vec(),
            title: title.to_string(),
        });
        self
    }

    /// Add a non-article entry; it is not listed by title.
    #[must_use]
    pub fn with_entry(mut self, path: &str, mime: &str, data: &[u8]) -> Self {
        self.entries.insert(path.to_string(), MockEntry::Content {
            mime: mime.to_string(),
            data: data.to_vec(),
            title: String::new(),
        });
        self
    }

    /// Add a redirect.
    #[must_use]
    pub fn with_redirect(mut self, path: &str, title: &str, target: &str) -> Self {
        self.entries.insert(path.to_string(), MockEntry::Redirect {
            target: target.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// List an existing path under one more title.
    #[must_use]
    pub fn with_title_alias(mut self, path: &str, title: &str) -> Self {
        self.aliases.push(TitleHit {
            path: path.to_string(),
            title: title.to_string(),
        });
        self
    }

    /// Set the main page.
    #[must_use]
    pub fn with_main_page(mut self, path: &str) -> Self {
        self.main_page = Some(path.to_string());
        self
    }

    /// Script the full-text hits returned for exactly `query`.
    #[must_use]
    pub fn with_hits(mut self, query: &str, hits: &[(&str, &str, f32)]) -> Self {
        let hits = hits
            .iter()
            .map(|(path, title, score)| IndexHit {
                path: (*path).to_string(),
                title: (*title).to_string(),
                score: *score,
            })
            .collect();
        self.hits.insert(query.to_string(), hits);
        self
    }

    /// Report no full-text index.
    #[must_use]
    pub const fn without_full_text_index(mut self) -> Self {
        self.full_text = false;
        self
    }

    /// Make every full-text search fail with `message`.
    #[must_use]
    pub fn failing_search(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Block full-text searches on `gate`.
    #[must_use]
    pub fn with_search_gate(mut self, gate: &Gate) -> Self {
        self.search_gate = Some(gate.clone());
        self
    }

    /// Block snippet extraction for `path` on `gate`.
    #[must_use]
    pub fn with_snippet_gate(mut self, path: &str, gate: &Gate) -> Self {
        self.snippet_gate = Some((path.to_string(), gate.clone()));
        self
    }

    fn title_rows(&self) -> Vec<TitleHit> {
        let mut rows: Vec<TitleHit> = self
            .entries
            .iter()
            .filter_map(|(path, entry)| match entry {
                MockEntry::Content { mime, title, .. } if mime == "text/html" => Some(TitleHit {
                    path: path.clone(),
                    title: title.clone(),
                }),
                MockEntry::Redirect { title, .. } => Some(TitleHit {
                    path: path.clone(),
                    title: title.clone(),
                }),
                MockEntry::Content { .. } => None,
            })
            .chain(self.aliases.iter().cloned())
            .collect();
        rows.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.path.cmp(&b.path))
        });
        rows
    }

    fn count_mime(&self, predicate: impl Fn(&str) -> bool) -> u64 {
        self.entries
            .values()
            .filter(|e| matches!(e, MockEntry::Content { mime, .. } if predicate(mime)))
            .count() as u64
    }
}

impl ArchiveReader for MockArchive {
    fn id(&self) -> ArchiveId {
        self.id
    }

    fn metadata_field(&self, name: &str) -> Option<String> {
        self.stats.metadata_reads.fetch_add(1, Ordering::SeqCst);
        self.metadata.get(name).cloned()
    }

    fn favicon(&self) -> Option<Vec<u8>> {
        self.favicon.clone()
    }

    fn read_entry(&self, path: &str) -> Result<EntryContent> {
        match self.entries.get(path) {
            Some(MockEntry::Content { mime, data, .. }) => Ok(EntryContent {
                mime: mime.clone(),
                data: data.clone(),
            }),
            _ => Err(Error::not_found(self.id, path)),
        }
    }

    fn redirect_target(&self, path: &str) -> Option<String> {
        match self.entries.get(path) {
            Some(MockEntry::Redirect { target, .. }) => Some(target.clone()),
            _ => None,
        }
    }

    fn main_page(&self) -> Option<String> {
        self.main_page.clone()
    }

    fn random_entry(&self) -> Option<String> {
        self.entries
            .iter()
            .find(|(_, e)| matches!(e, MockEntry::Content { mime, .. } if mime == "text/html"))
            .map(|(path, _)| path.clone())
    }

    fn has_full_text_index(&self) -> bool {
        self.full_text
    }

    fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>> {
        self.stats.full_text_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.search_gate {
            gate.wait();
        }
        if let Some(message) = &self.failure {
            return Err(Error::Index(message.clone()));
        }
        let mut hits = self.hits.get(query).cloned().unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }

    fn title_prefix_search(&self, prefix: &str, count: usize) -> Result<Vec<TitleHit>> {
        let prefix = prefix.to_lowercase();
        Ok(self
            .title_rows()
            .into_iter()
            .filter(|row| row.title.to_lowercase().starts_with(&prefix))
            .take(count)
            .collect())
    }

    fn titles(&self) -> Vec<TitleHit> {
        self.title_rows()
    }

    fn title_count(&self) -> usize {
        self.title_rows().len()
    }

    fn extract_snippet(
        &self,
        path: &str,
        query: &str,
        mode: SnippetMode,
        max_chars: usize,
    ) -> Option<String> {
        self.stats.snippet_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((gated, gate)) = &self.snippet_gate {
            if gated == path {
                gate.wait();
            }
        }
        let Some(MockEntry::Content { mime, data, .. }) = self.entries.get(path) else {
            return None;
        };
        let body = String::from_utf8_lossy(data);
        snippet::extract(&body, mime == "text/html", query, mode, max_chars)
    }

    fn article_count(&self) -> u64 {
        self.count_mime(|m| m == "text/html")
    }

    fn media_count(&self) -> u64 {
        self.count_mime(|m| ["image/", "video/", "audio/"].iter().any(|p| m.starts_with(p)))
    }

    fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }
}

/// Backend serving [`MockArchive`]s from a path table.
#[derive(Debug, Default)]
pub struct MockBackend {
    archives: Mutex<HashMap<PathBuf, MockArchive>>,
    opens: AtomicUsize,
}

impl MockBackend {
    /// Backend with no files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `archive` at `path`.
    #[must_use]
    pub fn with_archive(self, path: impl Into<PathBuf>, archive: MockArchive) -> Self {
        self.insert(path, archive);
        self
    }

    /// Serve `archive` at `path`, replacing whatever was there.
    pub fn insert(&self, path: impl Into<PathBuf>, archive: MockArchive) {
        self.table().insert(path.into(), archive);
    }

    /// Make `path` disappear.
    pub fn remove(&self, path: impl AsRef<Path>) {
        self.table().remove(path.as_ref());
    }

    /// Readers created so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, MockArchive>> {
        self.archives.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, path: &Path) -> Result<MockArchive> {
        self.table()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::open(path, "no such archive"))
    }
}

impl ArchiveBackend for MockBackend {
    fn probe_identifier(&self, path: &Path) -> Result<ArchiveId> {
        self.lookup(path).map(|archive| archive.id())
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveReader>> {
        let archive = self.lookup(path)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(archive))
    }
}
