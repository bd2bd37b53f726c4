use super::strategy::{SearchRequest, SearchStrategy, prefix_score};
use super::task::{SearchState, SearchTask, Worker};
use crate::config::{Config, SearchConfig};
use crate::profiling::PerformanceMetrics;
use crate::registry::ReaderRegistry;
use crate::suggest::SuggestionMatcher;
use crate::types::{ArchiveId, SearchResult, SnippetMode, rank_results};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Runs at most one search at a time.
///
/// Starting a search cancels and supersedes the previous one: its leftover
/// results are never returned by [`SearchOrchestrator::next`] again. Work
/// runs on a tokio runtime, either the one given to
/// [`SearchOrchestrator::with_runtime`] or the one `start` is called from.
pub struct SearchOrchestrator {
    registry: Arc<ReaderRegistry>,
    matcher: SuggestionMatcher,
    config: SearchConfig,
    active: Mutex<Option<Arc<SearchTask>>>,
    sequence: AtomicU64,
    runtime: Option<Handle>,
    metrics: Option<PerformanceMetrics>,
}

impl SearchOrchestrator {
    /// Orchestrator over the archives in `registry`.
    pub fn new(registry: Arc<ReaderRegistry>, config: &Config) -> Self {
        Self {
            matcher: SuggestionMatcher::new(Arc::clone(&registry), &config.suggest),
            registry,
            config: config.search.clone(),
            active: Mutex::new(None),
            sequence: AtomicU64::new(0),
            runtime: None,
            metrics: None,
        }
    }

    /// Spawn search workers on `runtime`.
    #[must_use]
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.set_runtime(runtime);
        self
    }

    pub(crate) fn set_runtime(&mut self, runtime: Handle) {
        self.runtime = Some(runtime);
    }

    /// Record search timings and result counts in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: PerformanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn active(&self) -> MutexGuard<'_, Option<Arc<SearchTask>>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a full-text search over `archives`.
    ///
    /// Snippets use the configured [`SnippetMode`] when `extract_snippet` is
    /// set. Returns immediately; results are pulled with
    /// [`SearchOrchestrator::next`].
    pub fn start(
        &self,
        query: &str,
        archives: impl IntoIterator<Item = ArchiveId>,
        extract_snippet: bool,
    ) -> Arc<SearchTask> {
        let snippet = if extract_snippet {
            self.config.snippet_mode
        } else {
            SnippetMode::Disabled
        };
        let request = SearchRequest::new(query, archives)
            .with_snippet(snippet)
            .with_limit(self.config.full_text_limit);
        self.start_with(request)
    }

    /// Start a search described by `request`.
    ///
    /// Stale archives are pruned first. Identifiers that are not open are
    /// dropped from the request. Without a runtime the task fails at once.
    pub fn start_with(&self, mut request: SearchRequest) -> Arc<SearchTask> {
        self.registry.prune_stale();

        let mut active = self.active();
        if let Some(previous) = active.take() {
            previous.supersede();
            info!("Search #{} superseded", previous.sequence());
        }

        let leases = self.registry.leases(&request.archives);
        let dropped = request.archives.len() - leases.len();
        if dropped > 0 {
            debug!("Ignoring {dropped} archive(s) that are not open");
        }
        request.archives = leases.iter().map(|lease| lease.id()).collect();

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let task = Arc::new(SearchTask::new(sequence, request));
        *active = Some(Arc::clone(&task));
        drop(active);

        info!(
            strategy = ?task.request().strategy,
            archives = leases.len(),
            "Search #{sequence} started for '{}'",
            task.request().query
        );

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            task.fail(Error::Search("no async runtime available to run the search".into()));
            return task;
        };
        let worker = Worker {
            task: Arc::clone(&task),
            leases,
            matcher: self.matcher.clone(),
            max_concurrent: self.config.max_concurrent_searches,
            snippet_max_chars: self.config.snippet_max_chars,
            metrics: self.metrics.clone(),
        };
        runtime.spawn(worker.run());
        task
    }

    /// Next result of the active search.
    ///
    /// `Ok(None)` when no search is active or the active one is exhausted.
    /// An engine failure is returned once as [`Error::Search`].
    pub async fn next(&self) -> Result<Option<SearchResult>> {
        let task = self.active().clone();
        match task {
            Some(task) => task.next().await,
            None => Ok(None),
        }
    }

    /// Cancel the active search. Results it already produced stay available.
    pub fn stop(&self) {
        if let Some(task) = self.active().as_ref() {
            if task.cancel() {
                info!("Search #{} stopped", task.sequence());
            }
        }
    }

    /// The most recently started search.
    pub fn active_task(&self) -> Option<Arc<SearchTask>> {
        self.active().clone()
    }

    /// State of the most recently started search.
    pub fn state(&self) -> Option<SearchState> {
        self.active().as_ref().map(|task| task.state())
    }

    /// Up to `count` titles matching `query`, from one archive or from all.
    ///
    /// Title-prefix hits come first; when an archive has fewer than `count`
    /// of them, edit-distance suggestions fill the gap. Searching all
    /// archives prunes stale ones first. Unknown archives and an empty
    /// registry give an empty list.
    pub fn title_search(
        &self,
        query: &str,
        archive: Option<ArchiveId>,
        count: usize,
    ) -> Vec<SearchResult> {
        if query.trim().is_empty() || count == 0 {
            return Vec::new();
        }
        let leases = match archive {
            Some(id) => self.registry.get(id).into_iter().collect(),
            None => {
                self.registry.prune_stale();
                self.registry.snapshot()
            },
        };

        let mut results = Vec::new();
        for lease in leases {
            let id = lease.id();
            let Ok(reader) = lease.reader() else {
                continue;
            };

            let prefix = SearchStrategy::TitlePrefix
                .candidates(id, reader, query, count, &self.matcher)
                .unwrap_or_else(|e| {
                    warn!("Title search in {id} failed: {e}");
                    Vec::new()
                });

            if prefix.len() < count {
                let seen: HashSet<String> = prefix.iter().map(|r| r.path.clone()).collect();
                let fuzzy = SearchStrategy::FuzzyTitle
                    .candidates(id, reader, query, count, &self.matcher)
                    .unwrap_or_else(|e| {
                        warn!("Title suggestions in {id} failed: {e}");
                        Vec::new()
                    });
                results.extend(fuzzy.into_iter().filter(|r| !seen.contains(&r.path)));
            }
            results.extend(prefix);
        }

        rank_results(&mut results);
        results.truncate(count);
        results
    }
}

impl Drop for SearchOrchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.active().take() {
            task.supersede();
        }
    }
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("config", &self.config)
            .field("active", &self.state())
            .finish_non_exhaustive()
    }
}
