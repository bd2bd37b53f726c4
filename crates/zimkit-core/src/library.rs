//! One place that wires the components together.
//!
//! A [`Library`] owns a [`ReaderRegistry`] and the services built on it. It
//! replaces a process-wide shared manager: hosts create one and pass it to
//! whatever needs it.

use crate::backend::ArchiveBackend;
use crate::bundle::BundleBackend;
use crate::config::Config;
use crate::content::ContentResolver;
use crate::metadata::{ArchiveMetadata, MetadataCache};
use crate::profiling::PerformanceMetrics;
use crate::registry::ReaderRegistry;
use crate::search::SearchOrchestrator;
use crate::suggest::SuggestionMatcher;
use crate::types::ArchiveId;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

/// Registry, metadata, content, suggestions and search over one set of
/// open archives.
#[derive(Debug)]
pub struct Library {
    config: Config,
    registry: Arc<ReaderRegistry>,
    metadata: MetadataCache,
    content: ContentResolver,
    suggestions: SuggestionMatcher,
    search: SearchOrchestrator,
    metrics: PerformanceMetrics,
}

impl Library {
    /// Library that opens archives through `backend`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] when `config` fails validation.
    pub fn new(backend: Arc<dyn ArchiveBackend>, config: Config) -> Result<Self> {
        Self::with_metrics(backend, config, PerformanceMetrics::default())
    }

    /// Library over JSON bundles, sharing its metrics with the backend.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] when `config` fails validation.
    pub fn bundles(config: Config) -> Result<Self> {
        let metrics = PerformanceMetrics::default();
        let backend = BundleBackend::new().with_metrics(metrics.clone());
        Self::with_metrics(Arc::new(backend), config, metrics)
    }

    /// Library recording search and content metrics into `metrics`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Config`] when `config` fails validation.
    pub fn with_metrics(
        backend: Arc<dyn ArchiveBackend>,
        config: Config,
        metrics: PerformanceMetrics,
    ) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(ReaderRegistry::new(backend));
        Ok(Self {
            metadata: MetadataCache::new(Arc::clone(&registry)),
            content: ContentResolver::new(Arc::clone(&registry), &config.content)
                .with_metrics(metrics.clone()),
            suggestions: SuggestionMatcher::new(Arc::clone(&registry), &config.suggest),
            search: SearchOrchestrator::new(Arc::clone(&registry), &config)
                .with_metrics(metrics.clone()),
            registry,
            config,
            metrics,
        })
    }

    /// Run searches on `runtime` instead of the caller's runtime.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.search.set_runtime(runtime);
        self
    }

    /// Open the archive at `path`; see [`ReaderRegistry::open`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::Open`] when the file cannot be opened.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<ArchiveId> {
        let id = self.registry.open(path)?;
        info!("Library holds {} archive(s)", self.registry.len());
        Ok(id)
    }

    /// Close an archive; unknown identifiers are ignored.
    pub fn close(&self, id: ArchiveId) {
        self.registry.close(id);
    }

    /// Metadata of every open archive, ordered by identifier.
    pub fn catalog(&self) -> Vec<ArchiveMetadata> {
        self.registry
            .list_identifiers()
            .into_iter()
            .filter_map(|id| self.metadata.metadata(id))
            .collect()
    }

    /// Configuration in effect.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The archive registry.
    pub const fn registry(&self) -> &Arc<ReaderRegistry> {
        &self.registry
    }

    /// Metadata lookups.
    pub const fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    /// Content resolution.
    pub const fn content(&self) -> &ContentResolver {
        &self.content
    }

    /// Edit-distance title suggestions.
    pub const fn suggestions(&self) -> &SuggestionMatcher {
        &self.suggestions
    }

    /// Full-text and title search.
    pub const fn search(&self) -> &SearchOrchestrator {
        &self.search
    }

    /// Counters shared by the library's services.
    pub const fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        self.metrics.log_summary();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::search::SearchState;
    use crate::testing::{MockArchive, MockBackend};

    fn library() -> Library {
        let backend = MockBackend::new()
            .with_archive(
                "/lib/fruit.zim",
                MockArchive::new("fruit")
                    .with_metadata("Title", "Fruit")
                    .with_article("/A/Apple", "Apple", "<p>Apples grow on trees.</p>")
                    .with_hits("apple", &[("/A/Apple", "Apple", 2.0)]),
            )
            .with_archive(
                "/lib/veg.zim",
                MockArchive::new("veg").with_metadata("Title", "Vegetables"),
            );
        Library::new(Arc::new(backend), Config::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = Config::default();
        config.search.full_text_limit = 0;
        let err = Library::new(Arc::new(MockBackend::new()), config).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_services_share_one_registry() {
        let library = library();
        let fruit = library.open("/lib/fruit.zim").unwrap();
        let veg = library.open("/lib/veg.zim").unwrap();
        assert_eq!(library.registry().len(), 2);

        let titles: Vec<_> = library.catalog().into_iter().map(|m| m.title).collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"Fruit".to_string()));

        let page = library.content().resolve(fruit, "/A/Apple").unwrap();
        assert_eq!(page.mime, "text/html");
        assert_eq!(library.metrics().snapshot().content_reads, 1);

        let suggestions = library.suggestions().suggest_titles(fruit, "appel", 1).unwrap();
        assert_eq!(suggestions[0].path, "/A/Apple");

        library.close(veg);
        assert_eq!(library.catalog().len(), 1);
        assert!(library.metadata().metadata(veg).is_none());
    }

    #[tokio::test]
    async fn test_search_records_metrics() {
        let library = library();
        let fruit = library.open("/lib/fruit.zim").unwrap();

        let task = library.search().start("apple", [fruit], true);
        let hit = library.search().next().await.unwrap().unwrap();
        assert_eq!(hit.snippet.as_deref(), Some("Apples grow on trees."));
        assert!(library.search().next().await.unwrap().is_none());
        task.finished().await;

        assert_eq!(library.metrics().snapshot().search_count, 1);
        assert_eq!(library.metrics().snapshot().results_produced, 1);
    }

    #[tokio::test]
    async fn test_failed_search_is_not_counted() {
        let backend = MockBackend::new().with_archive(
            "/lib/broken.zim",
            MockArchive::new("broken").failing_search("index corrupt"),
        );
        let library = Library::new(Arc::new(backend), Config::default()).unwrap();
        let id = library.open("/lib/broken.zim").unwrap();

        let task = library.search().start("apple", [id], false);
        assert!(library.search().next().await.is_err());
        assert_eq!(task.finished().await, SearchState::Failed);
        assert_eq!(library.metrics().snapshot().search_count, 0);
    }
}
