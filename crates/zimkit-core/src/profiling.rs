#![allow(clippy::cast_precision_loss)] // Performance metrics inherently lose precision when converting to f64

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{Level, debug, info, span};

/// Shared counters for searches, index builds and content reads.
///
/// Cloning is cheap; all clones update the same counters.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    search_count: AtomicU64,
    total_search_micros: AtomicU64,
    results_produced: AtomicU64,
    index_build_count: AtomicU64,
    total_index_micros: AtomicU64,
    documents_indexed: AtomicU64,
    content_reads: AtomicU64,
    bytes_served: AtomicU64,
}

/// Point-in-time copy of [`PerformanceMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Completed searches
    pub search_count: u64,
    /// Mean search duration in microseconds
    pub avg_search_micros: f64,
    /// Results returned across all searches
    pub results_produced: u64,
    /// Full-text indexes built
    pub index_build_count: u64,
    /// Mean index build duration in milliseconds
    pub avg_index_millis: f64,
    /// Documents added across all index builds
    pub documents_indexed: u64,
    /// Entries resolved to bytes
    pub content_reads: u64,
    /// Bytes returned by content resolution
    pub bytes_served: u64,
}

#[allow(clippy::cast_possible_truncation)] // Saturating at u64::MAX is acceptable for timing metrics
fn micros(duration: Duration) -> u64 {
    duration.as_micros().min(u128::from(u64::MAX)) as u64
}

fn average(total: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

impl PerformanceMetrics {
    /// Record a completed search
    pub fn record_search(&self, duration: Duration, results: usize) {
        let c = &self.inner;
        c.search_count.fetch_add(1, Ordering::Relaxed);
        c.total_search_micros
            .fetch_add(micros(duration), Ordering::Relaxed);
        c.results_produced
            .fetch_add(results as u64, Ordering::Relaxed);
    }

    /// Record a full-text index build
    pub fn record_index_build(&self, duration: Duration, documents: usize) {
        let c = &self.inner;
        c.index_build_count.fetch_add(1, Ordering::Relaxed);
        c.total_index_micros
            .fetch_add(micros(duration), Ordering::Relaxed);
        c.documents_indexed
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    /// Record a resolved entry
    pub fn record_content(&self, bytes: usize) {
        let c = &self.inner;
        c.content_reads.fetch_add(1, Ordering::Relaxed);
        c.bytes_served.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Current values of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.inner;
        let search_count = c.search_count.load(Ordering::Relaxed);
        let index_build_count = c.index_build_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            search_count,
            avg_search_micros: average(c.total_search_micros.load(Ordering::Relaxed), search_count),
            results_produced: c.results_produced.load(Ordering::Relaxed),
            index_build_count,
            avg_index_millis: average(
                c.total_index_micros.load(Ordering::Relaxed),
                index_build_count,
            ) / 1000.0,
            documents_indexed: c.documents_indexed.load(Ordering::Relaxed),
            content_reads: c.content_reads.load(Ordering::Relaxed),
            bytes_served: c.bytes_served.load(Ordering::Relaxed),
        }
    }

    /// Emit a summary through `tracing`.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        if s.search_count > 0 {
            info!(
                searches = s.search_count,
                results = s.results_produced,
                "Search average {:.2}ms",
                s.avg_search_micros / 1000.0
            );
        }
        if s.index_build_count > 0 {
            info!(
                builds = s.index_build_count,
                documents = s.documents_indexed,
                "Index build average {:.2}ms",
                s.avg_index_millis
            );
        }
        if s.content_reads > 0 {
            info!(
                reads = s.content_reads,
                "Served {}",
                format_bytes(s.bytes_served)
            );
        }
    }
}

/// Timer for measuring operation duration with automatic metrics recording
pub struct OperationTimer {
    start: Instant,
    operation: String,
    metrics: Option<PerformanceMetrics>,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        debug!("Starting operation: {}", operation);
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
            metrics: None,
        }
    }

    /// Start a timer that reports into `metrics` when it is finished.
    pub fn with_metrics(operation: &str, metrics: Option<&PerformanceMetrics>) -> Self {
        let mut timer = Self::new(operation);
        timer.metrics = metrics.cloned();
        timer
    }

    /// Finish timing without recording metrics
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Completed {}: {}ms", self.operation, duration.as_millis());
        duration
    }

    /// Finish timing a search with the number of results it produced
    pub fn finish_search(self, results: usize) -> Duration {
        let duration = self.start.elapsed();
        debug!(
            "Completed {}: {}ms ({} results)",
            self.operation,
            duration.as_millis(),
            results
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_search(duration, results);
        }
        duration
    }

    /// Finish timing an index build with the number of documents added
    pub fn finish_index(self, documents: usize) -> Duration {
        let duration = self.start.elapsed();
        info!(
            "Completed {}: {}ms ({} documents)",
            self.operation,
            duration.as_millis(),
            documents
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_index_build(duration, documents);
        }
        duration
    }
}

/// Component-level timing breakdown for detailed analysis
#[derive(Debug, Default)]
pub struct ComponentTimings {
    timings: HashMap<String, Duration>,
}

impl ComponentTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time<T, F>(&mut self, component: &str, operation: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _span = span!(Level::DEBUG, "component_timing", component = component);
        let start = Instant::now();
        let result = operation();
        let duration = start.elapsed();

        *self.timings.entry(component.to_string()).or_default() += duration;
        result
    }

    pub fn get_timing(&self, component: &str) -> Option<Duration> {
        self.timings.get(component).copied()
    }

    pub fn total_time(&self) -> Duration {
        self.timings.values().sum()
    }

    /// Log each component's share of the total at debug level.
    pub fn log_breakdown(&self) {
        let total = self.total_time();
        let mut sorted: Vec<_> = self.timings.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1));

        for (component, duration) in sorted {
            let percentage = if total.as_micros() > 0 {
                (duration.as_micros() as f64 / total.as_micros() as f64) * 100.0
            } else {
                0.0
            };
            debug!(
                "  {:<20}: {:>8}us ({:>5.1}%)",
                component,
                duration.as_micros(),
                percentage
            );
        }
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
