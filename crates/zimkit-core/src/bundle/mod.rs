//! Reference archive backend: JSON bundles with an in-memory tantivy index.
//!
//! A bundle is a single JSON file (see [`BundleManifest`]) holding metadata,
//! entries and redirects. It implements the same [`ArchiveBackend`] and
//! [`ArchiveReader`] contract a native ZIM library would, which makes it the
//! backend used by the test suite and by tools that assemble small archives.
//!
//! The full-text index is built on first use and kept for the life of the
//! reader.

mod index;
mod manifest;

pub use manifest::{BundleEntry, BundleManifest, ContentEncoding, EntryBody};

use crate::backend::{ArchiveBackend, ArchiveReader};
use crate::profiling::PerformanceMetrics;
use crate::snippet;
use crate::types::{ArchiveId, EntryContent, IndexHit, SnippetMode, TitleHit};
use crate::{Error, Result};
use index::{FullTextIndex, IndexDocument};
use manifest::{BundleHeader, decode_content, decode_favicon};
use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Opens bundle files.
#[derive(Debug, Clone, Default)]
pub struct BundleBackend {
    metrics: Option<PerformanceMetrics>,
}

impl BundleBackend {
    /// Create a backend.
    #[must_use]
    pub const fn new() -> Self {
        Self { metrics: None }
    }

    /// Record index builds into `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

fn read_bundle(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::open(path, e))
}

fn identify(declared: Option<uuid::Uuid>, bytes: &[u8]) -> ArchiveId {
    declared.map_or_else(|| ArchiveId::from_content_hash(bytes), ArchiveId::from_uuid)
}

impl ArchiveBackend for BundleBackend {
    fn probe_identifier(&self, path: &Path) -> Result<ArchiveId> {
        let bytes = read_bundle(path)?;
        let header: BundleHeader =
            serde_json::from_slice(&bytes).map_err(|e| Error::open(path, e))?;
        Ok(identify(header.uuid, &bytes))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn ArchiveReader>> {
        let bytes = read_bundle(path)?;
        let manifest = BundleManifest::from_slice(&bytes).map_err(|e| Error::open(path, e))?;
        let id = identify(manifest.uuid, &bytes);
        let reader =
            BundleReader::from_manifest(id, manifest, self.metrics.clone()).map_err(|e| match e {
                Error::Open { .. } => e,
                other => Error::open(path, other),
            })?;
        debug!("Opened bundle {} as {}", path.display(), id);
        Ok(Box::new(reader))
    }
}

enum StoredEntry {
    Redirect(String),
    Content {
        mime: String,
        data: Vec<u8>,
        title: String,
    },
}

struct TitleRow {
    folded: String,
    title: String,
    path: String,
}

impl TitleRow {
    fn hit(&self) -> TitleHit {
        TitleHit {
            path: self.path.clone(),
            title: self.title.clone(),
        }
    }
}

/// An opened bundle.
pub struct BundleReader {
    id: ArchiveId,
    metadata: BTreeMap<String, String>,
    favicon: Option<Vec<u8>>,
    main_page: Option<String>,
    entries: HashMap<String, StoredEntry>,
    titles: Vec<TitleRow>,
    articles: Vec<String>,
    media_count: u64,
    indexed: bool,
    full_text: OnceLock<std::result::Result<FullTextIndex, String>>,
    metrics: Option<PerformanceMetrics>,
}

fn fold(text: &str) -> String {
    text.to_lowercase()
}

fn fallback_title(path: &str) -> String {
    path.rsplit('/').find(|s| !s.is_empty()).unwrap_or(path).to_string()
}

fn is_article(mime: &str) -> bool {
    mime.starts_with("text/html")
}

fn is_media(mime: &str) -> bool {
    ["image/", "video/", "audio/"]
        .iter()
        .any(|prefix| mime.starts_with(prefix))
}

impl BundleReader {
    fn from_manifest(
        id: ArchiveId,
        manifest: BundleManifest,
        metrics: Option<PerformanceMetrics>,
    ) -> Result<Self> {
        let favicon = manifest.favicon.as_deref().map(decode_favicon).transpose()?;

        let mut entries = HashMap::with_capacity(manifest.entries.len());
        let mut titles = Vec::with_capacity(manifest.entries.len());
        let mut articles = Vec::new();
        let mut media_count = 0u64;

        for entry in manifest.entries {
            if entry.path.is_empty() {
                return Err(Error::Serialization("entry with empty path".into()));
            }
            let title = if entry.title.is_empty() {
                fallback_title(&entry.path)
            } else {
                entry.title
            };

            // Only articles and redirects are listed by title
            let (stored, listed) = match entry.body {
                EntryBody::Redirect { redirect } => (StoredEntry::Redirect(redirect), true),
                EntryBody::Content {
                    mime,
                    content,
                    encoding,
                } => {
                    let data = decode_content(content, encoding)?;
                    let article = is_article(&mime);
                    if article {
                        articles.push(entry.path.clone());
                    } else if is_media(&mime) {
                        media_count += 1;
                    }
                    let stored = StoredEntry::Content {
                        mime,
                        data,
                        title: title.clone(),
                    };
                    (stored, article)
                },
            };

            if entries.insert(entry.path.clone(), stored).is_some() {
                return Err(Error::Serialization(format!(
                    "duplicate entry path '{}'",
                    entry.path
                )));
            }
            if listed {
                titles.push(TitleRow {
                    folded: fold(&title),
                    title,
                    path: entry.path,
                });
            }
        }

        titles.sort_by(|a, b| a.folded.cmp(&b.folded).then_with(|| a.path.cmp(&b.path)));
        articles.sort();

        Ok(Self {
            id,
            metadata: manifest.metadata,
            favicon,
            main_page: manifest.main_page,
            entries,
            titles,
            articles,
            media_count,
            indexed: manifest.full_text_index,
            full_text: OnceLock::new(),
            metrics,
        })
    }

    fn full_text_index(&self) -> Result<&FullTextIndex> {
        let built = self.full_text.get_or_init(|| {
            let documents = self.articles.iter().filter_map(|path| {
                let Some(StoredEntry::Content { data, title, .. }) = self.entries.get(path) else {
                    return None;
                };
                Some(IndexDocument {
                    path,
                    title,
                    text: snippet::html_to_text(&String::from_utf8_lossy(data)),
                })
            });
            FullTextIndex::build(documents, self.metrics.as_ref()).map_err(|e| {
                warn!("Full-text index for {} failed to build: {e}", self.id);
                e.to_string()
            })
        });
        built.as_ref().map_err(|reason| Error::Index(reason.clone()))
    }
}

impl ArchiveReader for BundleReader {
    fn id(&self) -> ArchiveId {
        self.id
    }

    fn metadata_field(&self, name: &str) -> Option<String> {
        self.metadata.get(name).cloned()
    }

    fn favicon(&self) -> Option<Vec<u8>> {
        self.favicon.clone()
    }

    fn read_entry(&self, path: &str) -> Result<EntryContent> {
        match self.entries.get(path) {
            Some(StoredEntry::Content { mime, data, .. }) => Ok(EntryContent {
                mime: mime.clone(),
                data: data.clone(),
            }),
            Some(StoredEntry::Redirect(_)) | None => Err(Error::not_found(self.id, path)),
        }
    }

    fn redirect_target(&self, path: &str) -> Option<String> {
        match self.entries.get(path) {
            Some(StoredEntry::Redirect(target)) => Some(target.clone()),
            _ => None,
        }
    }

    fn main_page(&self) -> Option<String> {
        self.main_page.clone()
    }

    fn random_entry(&self) -> Option<String> {
        self.articles.choose(&mut rand::rng()).cloned()
    }

    fn has_full_text_index(&self) -> bool {
        self.indexed
    }

    fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<IndexHit>> {
        if !self.indexed {
            return Err(Error::Index(format!("archive {} has no full-text index", self.id)));
        }
        self.full_text_index()?.search(query, limit)
    }

    fn title_prefix_search(&self, prefix: &str, count: usize) -> Result<Vec<TitleHit>> {
        let folded = fold(prefix);
        let start = self
            .titles
            .partition_point(|row| row.folded.as_str() < folded.as_str());
        Ok(self.titles[start..]
            .iter()
            .take_while(|row| row.folded.starts_with(&folded))
            .take(count)
            .map(TitleRow::hit)
            .collect())
    }

    fn titles(&self) -> Vec<TitleHit> {
        self.titles.iter().map(TitleRow::hit).collect()
    }

    fn title_count(&self) -> usize {
        self.titles.len()
    }

    fn extract_snippet(
        &self,
        path: &str,
        query: &str,
        mode: SnippetMode,
        max_chars: usize,
    ) -> Option<String> {
        let Some(StoredEntry::Content { mime, data, .. }) = self.entries.get(path) else {
            return None;
        };
        if !mime.starts_with("text/") {
            return None;
        }
        let body = String::from_utf8_lossy(data);
        snippet::extract(&body, is_article(mime), query, mode, max_chars)
    }

    fn article_count(&self) -> u64 {
        self.articles.len() as u64
    }

    fn media_count(&self) -> u64 {
        self.media_count
    }

    fn entry_count(&self) -> u64 {
        self.entries.len() as u64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn fruit() -> BundleManifest {
        BundleManifest::new()
            .with_metadata("Title", "Fruit")
            .with_favicon(b"\x89PNG")
            .with_article("/A/Apple", "Apple", "<p>The apple is a pome.</p>")
            .with_article("/A/Apricot", "Apricot", "<p>Apricots are stone fruit.</p>")
            .with_article("/A/banana", "banana", "<p>Bananas are berries.</p>")
            .with_redirect("/A/Apples", "Apples", "/A/Apple")
            .with_media("/I/apple.png", "apple.png", "image/png", &[1, 2, 3])
            .with_text("/-/style.css", "", "text/css", "body {}")
            .with_main_page("/A/Apple")
    }

    fn open(manifest: &BundleManifest) -> (TempDir, Box<dyn ArchiveReader>) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("fruit.json");
        manifest.write_to(&path).unwrap();
        let reader = BundleBackend::new().open(&path).unwrap();
        (temp, reader)
    }

    #[test]
    fn test_identifier_is_content_derived() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("one.json");
        let second = temp.path().join("two.json");
        fruit().write_to(&first).unwrap();
        fruit().write_to(&second).unwrap();

        let backend = BundleBackend::new();
        let a = backend.probe_identifier(&first).unwrap();
        let b = backend.probe_identifier(&second).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.open(&first).unwrap().id(), a);

        let declared = Uuid::from_u128(42);
        fruit().with_uuid(declared).write_to(&first).unwrap();
        assert_eq!(
            backend.probe_identifier(&first).unwrap(),
            ArchiveId::from_uuid(declared)
        );
    }

    #[test]
    fn test_open_failures() {
        let temp = TempDir::new().unwrap();
        let backend = BundleBackend::new();

        let missing = temp.path().join("missing.json");
        assert_eq!(backend.probe_identifier(&missing).unwrap_err().category(), "open");

        let garbage = temp.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert_eq!(backend.open(&garbage).err().unwrap().category(), "open");

        let duplicate = temp.path().join("dup.json");
        BundleManifest::new()
            .with_article("/A", "A", "x")
            .with_article("/A", "A again", "y")
            .write_to(&duplicate)
            .unwrap();
        assert_eq!(backend.open(&duplicate).err().unwrap().category(), "open");
    }

    #[test]
    fn test_entries_and_redirects() {
        let (_temp, reader) = open(&fruit());

        let entry = reader.read_entry("/A/Apple").unwrap();
        assert_eq!(entry.mime, "text/html");
        assert_eq!(entry.data, b"<p>The apple is a pome.</p>");

        assert_eq!(reader.read_entry("/I/apple.png").unwrap().data, vec![1, 2, 3]);
        assert_eq!(reader.redirect_target("/A/Apples").as_deref(), Some("/A/Apple"));
        assert_eq!(reader.redirect_target("/A/Apple"), None);
        assert_eq!(reader.read_entry("/A/Apples").unwrap_err().category(), "not_found");
        assert_eq!(reader.read_entry("/nope").unwrap_err().category(), "not_found");

        assert_eq!(reader.metadata_field("Title").as_deref(), Some("Fruit"));
        assert_eq!(reader.favicon().unwrap(), b"\x89PNG");
        assert_eq!(reader.main_page().as_deref(), Some("/A/Apple"));
    }

    #[test]
    fn test_counts() {
        let (_temp, reader) = open(&fruit());
        assert_eq!(reader.article_count(), 3);
        assert_eq!(reader.media_count(), 1);
        assert_eq!(reader.entry_count(), 6);
        assert_eq!(reader.title_count(), 4);
    }

    #[test]
    fn test_title_prefix_search_is_case_insensitive() {
        let (_temp, reader) = open(&fruit());

        let hits = reader.title_prefix_search("ap", 10).unwrap();
        let titles: Vec<_> = hits.iter().map(|h| h.title.as_str()).collect();
        assert_eq!(titles, vec!["Apple", "Apples", "Apricot"]);

        assert_eq!(reader.title_prefix_search("AP", 2).unwrap().len(), 2);
        assert_eq!(reader.title_prefix_search("B", 10).unwrap()[0].path, "/A/banana");
        assert!(reader.title_prefix_search("z", 10).unwrap().is_empty());
        assert_eq!(reader.title_prefix_search("", 10).unwrap().len(), 4);
    }

    #[test]
    fn test_random_entry_is_an_article() {
        let (_temp, reader) = open(&fruit());
        for _ in 0..20 {
            let path = reader.random_entry().unwrap();
            assert!(path.starts_with("/A/"), "unexpected random entry {path}");
        }

        let (_temp, empty) = open(&BundleManifest::new());
        assert_eq!(empty.random_entry(), None);
    }

    #[test]
    fn test_full_text_search() {
        let (_temp, reader) = open(&fruit());
        assert!(reader.has_full_text_index());

        let hits = reader.full_text_search("berries", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/A/banana");
        assert_eq!(hits[0].title, "banana");

        let (_temp, unindexed) = open(&fruit().with_full_text_index(false));
        assert!(!unindexed.has_full_text_index());
        assert_eq!(
            unindexed.full_text_search("berries", 10).unwrap_err().category(),
            "index"
        );
    }

    #[test]
    fn test_snippets() {
        let (_temp, reader) = open(&fruit());
        assert_eq!(
            reader
                .extract_snippet("/A/Apricot", "", SnippetMode::FirstParagraph, 100)
                .as_deref(),
            Some("Apricots are stone fruit.")
        );
        assert_eq!(
            reader
                .extract_snippet("/-/style.css", "", SnippetMode::FirstParagraph, 100)
                .as_deref(),
            Some("body {}")
        );
        assert!(reader
            .extract_snippet("/I/apple.png", "", SnippetMode::FirstParagraph, 100)
            .is_none());
        assert!(reader
            .extract_snippet("/A/Apples", "", SnippetMode::FirstParagraph, 100)
            .is_none());
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(fallback_title("/-/style.css"), "style.css");
        assert_eq!(fallback_title("/A/dir/"), "dir");
        assert_eq!(fallback_title("plain"), "plain");
    }
}
