use super::strategy::SearchRequest;
use crate::handle::ArchiveLease;
use crate::profiling::{OperationTimer, PerformanceMetrics};
use crate::suggest::SuggestionMatcher;
use crate::types::{ArchiveId, SearchResult, rank_results};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lifecycle of a [`SearchTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    /// Created, worker not started yet
    Idle,
    /// Worker is producing results
    Running,
    /// Every result has been produced
    Completed,
    /// Stopped or superseded before completing
    Cancelled,
    /// The engine failed; the error is surfaced once by `next`
    Failed,
}

impl SearchState {
    /// Whether no more results can be appended.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

#[derive(Debug)]
struct TaskInner {
    state: SearchState,
    results: Vec<SearchResult>,
    cursor: usize,
    failure: Option<Error>,
}

/// One search execution.
///
/// Results are appended by a background worker in non-increasing score
/// order and consumed with [`SearchTask::next`]. Once the task is terminal
/// the result list never changes.
#[derive(Debug)]
pub struct SearchTask {
    sequence: u64,
    request: SearchRequest,
    inner: Mutex<TaskInner>,
    changed: Notify,
    cancel: CancellationToken,
    superseded: AtomicBool,
}

impl SearchTask {
    pub(crate) fn new(sequence: u64, request: SearchRequest) -> Self {
        Self {
            sequence,
            request,
            inner: Mutex::new(TaskInner {
                state: SearchState::Idle,
                results: Vec::new(),
                cursor: 0,
                failure: None,
            }),
            changed: Notify::new(),
            cancel: CancellationToken::new(),
            superseded: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Position of this task among all tasks started by its orchestrator.
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// What this task runs. `archives` holds only the archives that were
    /// open when the task started.
    pub const fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SearchState {
        self.lock().state
    }

    /// Whether a newer search replaced this one.
    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Acquire)
    }

    /// Whether the worker should stop at its next checkpoint.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Copy of the results produced so far.
    pub fn results(&self) -> Vec<SearchResult> {
        self.lock().results.clone()
    }

    /// Next unconsumed result.
    ///
    /// Waits while the task is running and nothing new is available.
    /// Returns `Ok(None)` once the task is completed or cancelled and every
    /// result has been consumed, and always for a superseded task. A failed
    /// task yields its error once, then `Ok(None)`.
    pub async fn next(&self) -> Result<Option<SearchResult>> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            // Register before checking so a wake-up in between is not lost
            changed.as_mut().enable();

            if let Some(outcome) = self.try_next() {
                return outcome;
            }
            changed.await;
        }
    }

    /// `None` when the caller has to wait.
    fn try_next(&self) -> Option<Result<Option<SearchResult>>> {
        if self.is_superseded() {
            return Some(Ok(None));
        }
        let mut inner = self.lock();
        if let Some(result) = inner.results.get(inner.cursor).cloned() {
            inner.cursor += 1;
            return Some(Ok(Some(result)));
        }
        if let Some(error) = inner.failure.take() {
            return Some(Err(error));
        }
        inner.state.is_terminal().then_some(Ok(None))
    }

    /// Wait until the task reaches a terminal state.
    pub async fn finished(&self) -> SearchState {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let state = self.state();
            if state.is_terminal() {
                return state;
            }
            changed.await;
        }
    }

    fn transition(&self, from: &[SearchState], to: SearchState) -> bool {
        let mut inner = self.lock();
        if !from.contains(&inner.state) {
            return false;
        }
        inner.state = to;
        drop(inner);
        self.changed.notify_waiters();
        true
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.transition(&[SearchState::Idle], SearchState::Running)
    }

    /// Stop producing results. Returns `false` if the task was already
    /// terminal.
    pub(crate) fn cancel(&self) -> bool {
        self.cancel.cancel();
        let cancelled =
            self.transition(&[SearchState::Idle, SearchState::Running], SearchState::Cancelled);
        if cancelled {
            debug!("Search #{} cancelled", self.sequence);
        }
        cancelled
    }

    pub(crate) fn supersede(&self) {
        self.superseded.store(true, Ordering::Release);
        self.cancel();
        // Wake consumers even if the task had already finished
        self.changed.notify_waiters();
    }

    pub(crate) fn fail(&self, error: Error) {
        self.cancel.cancel();
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return;
        }
        warn!(category = error.category(), "Search #{} failed: {error}", self.sequence);
        inner.state = SearchState::Failed;
        inner.failure = Some(error);
        drop(inner);
        self.changed.notify_waiters();
    }

    fn complete(&self) -> bool {
        self.transition(&[SearchState::Running], SearchState::Completed)
    }

    /// Append a result; refused once the task is no longer running.
    fn push(&self, result: SearchResult) -> bool {
        let mut inner = self.lock();
        if inner.state != SearchState::Running {
            return false;
        }
        inner.results.push(result);
        drop(inner);
        self.changed.notify_waiters();
        true
    }
}

/// Background execution of one [`SearchTask`].
pub(crate) struct Worker {
    pub task: Arc<SearchTask>,
    pub leases: Vec<ArchiveLease>,
    pub matcher: SuggestionMatcher,
    pub max_concurrent: usize,
    pub snippet_max_chars: usize,
    pub metrics: Option<PerformanceMetrics>,
}

impl Worker {
    pub async fn run(self) {
        let Self {
            task,
            leases,
            matcher,
            max_concurrent,
            snippet_max_chars,
            metrics,
        } = self;

        if !task.mark_running() {
            debug!("Search #{} cancelled before it started", task.sequence);
            return;
        }
        let timer = OperationTimer::with_metrics(
            &format!("search #{} '{}'", task.sequence, task.request.query),
            metrics.as_ref(),
        );

        let by_id: HashMap<ArchiveId, ArchiveLease> =
            leases.iter().map(|l| (l.id(), Arc::clone(l))).collect();

        let merged = match collect_candidates(&task, leases, &matcher, max_concurrent).await {
            Ok(merged) => merged,
            Err(error) => {
                timer.finish();
                task.fail(error);
                return;
            },
        };
        if task.is_cancelled() {
            timer.finish();
            return;
        }

        let delivering = Arc::clone(&task);
        let delivered = tokio::task::spawn_blocking(move || {
            deliver(&delivering, merged, &by_id, snippet_max_chars)
        })
        .await;

        match delivered {
            Ok(count) => {
                if task.complete() {
                    timer.finish_search(count);
                    info!("Search #{} completed with {count} results", task.sequence);
                } else {
                    timer.finish();
                }
            },
            Err(e) => {
                timer.finish();
                task.fail(Error::Search(format!("snippet worker panicked: {e}")));
            },
        }
    }
}

/// Run the per-archive searches with bounded concurrency and merge them.
async fn collect_candidates(
    task: &Arc<SearchTask>,
    leases: Vec<ArchiveLease>,
    matcher: &SuggestionMatcher,
    max_concurrent: usize,
) -> Result<Vec<SearchResult>> {
    let searches = leases.into_iter().map(|lease| {
        let task = Arc::clone(task);
        let matcher = matcher.clone();
        async move {
            // Checkpoint: before each per-archive search
            if task.is_cancelled() {
                return Ok(Vec::new());
            }
            let id = lease.id();
            let joined = tokio::task::spawn_blocking(move || -> Result<Vec<SearchResult>> {
                if task.is_cancelled() {
                    return Ok(Vec::new());
                }
                let reader = lease.reader()?;
                let request = task.request();
                request
                    .strategy
                    .candidates(id, reader, &request.query, request.limit, &matcher)
            })
            .await;

            match joined {
                Ok(Ok(candidates)) => Ok(candidates),
                Ok(Err(e @ (Error::ArchiveUnavailable(_) | Error::Search(_)))) => Err(e),
                Ok(Err(other)) => Err(Error::Search(format!("archive {id}: {other}"))),
                Err(e) => Err(Error::Search(format!("search of {id} panicked: {e}"))),
            }
        }
    });

    let mut outcomes = stream::iter(searches).buffer_unordered(max_concurrent.max(1));
    let mut merged = Vec::new();
    while let Some(outcome) = outcomes.next().await {
        match outcome {
            Ok(candidates) => merged.extend(candidates),
            Err(Error::ArchiveUnavailable(id)) => {
                debug!("Archive {id} closed during search #{}, skipping", task.sequence);
            },
            Err(error) => return Err(error),
        }
    }

    rank_results(&mut merged);
    Ok(merged)
}

/// Attach snippets in rank order and publish each result.
fn deliver(
    task: &SearchTask,
    merged: Vec<SearchResult>,
    leases: &HashMap<ArchiveId, ArchiveLease>,
    max_chars: usize,
) -> usize {
    let mode = task.request.snippet;
    let mut delivered = 0;
    for mut result in merged {
        // Checkpoint: before each snippet extraction
        if task.is_cancelled() {
            break;
        }
        if mode.is_enabled() {
            result.snippet = leases
                .get(&result.archive)
                .and_then(|lease| lease.reader().ok())
                .and_then(|reader| {
                    reader.extract_snippet(&result.path, &task.request.query, mode, max_chars)
                });
        }
        if !task.push(result) {
            break;
        }
        delivered += 1;
    }
    delivered
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::SnippetMode;

    fn result(path: &str, score: f32) -> SearchResult {
        SearchResult {
            archive: ArchiveId::from_content_hash(b"t"),
            path: path.to_string(),
            title: path.to_string(),
            score,
            snippet: None,
        }
    }

    fn task() -> SearchTask {
        SearchTask::new(1, SearchRequest::new("q", []).with_snippet(SnippetMode::Disabled))
    }

    #[tokio::test]
    async fn test_results_stream_until_completed() {
        let task = task();
        assert_eq!(task.state(), SearchState::Idle);
        assert!(task.mark_running());
        assert!(!task.mark_running());

        assert!(task.push(result("/a", 2.0)));
        assert_eq!(task.next().await.unwrap().unwrap().path, "/a");

        assert!(task.push(result("/b", 1.0)));
        assert!(task.complete());
        assert!(!task.push(result("/c", 0.5)));

        assert_eq!(task.next().await.unwrap().unwrap().path, "/b");
        assert!(task.next().await.unwrap().is_none());
        assert!(task.next().await.unwrap().is_none());
        assert_eq!(task.results().len(), 2);
    }

    #[tokio::test]
    async fn test_next_waits_for_producer() {
        let task = Arc::new(task());
        task.mark_running();

        let producer = {
            let task = Arc::clone(&task);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                task.push(result("/late", 1.0));
                task.complete();
            })
        };

        assert_eq!(task.next().await.unwrap().unwrap().path, "/late");
        assert!(task.next().await.unwrap().is_none());
        producer.await.unwrap();
        assert_eq!(task.finished().await, SearchState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_keeps_produced_results() {
        let task = task();
        task.mark_running();
        task.push(result("/kept", 1.0));

        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());
        assert!(!task.push(result("/dropped", 0.5)));
        assert!(!task.complete());

        assert_eq!(task.state(), SearchState::Cancelled);
        assert_eq!(task.next().await.unwrap().unwrap().path, "/kept");
        assert!(task.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_superseded_task_yields_nothing() {
        let task = task();
        task.mark_running();
        task.push(result("/stale", 1.0));

        task.supersede();
        assert!(task.is_superseded());
        assert_eq!(task.state(), SearchState::Cancelled);
        assert!(task.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_surfaces_once() {
        let task = task();
        task.mark_running();
        task.fail(Error::Search("engine down".into()));
        task.fail(Error::Search("ignored".into()));

        assert_eq!(task.state(), SearchState::Failed);
        let err = task.next().await.unwrap_err();
        assert!(err.to_string().contains("engine down"));
        assert!(task.next().await.unwrap().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SearchState::Idle.is_terminal());
        assert!(!SearchState::Running.is_terminal());
        assert!(SearchState::Completed.is_terminal());
        assert!(SearchState::Cancelled.is_terminal());
        assert!(SearchState::Failed.is_terminal());
    }
}
