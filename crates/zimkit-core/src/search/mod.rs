//! Cross-archive search.
//!
//! A [`SearchOrchestrator`] owns at most one active [`SearchTask`]. Each task
//! searches its archives concurrently, merges the candidates into a single
//! list ordered by score (ties by path), drops duplicate
//! `(archive, path)` pairs and then publishes results one at a time,
//! extracting snippets on the way. Consumers pull with `next()` while the
//! task is still running.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zimkit_core::bundle::BundleBackend;
//! use zimkit_core::{Config, ReaderRegistry, SearchOrchestrator};
//!
//! # async fn demo() -> zimkit_core::Result<()> {
//! let registry = Arc::new(ReaderRegistry::new(Arc::new(BundleBackend::new())));
//! let id = registry.open("wikipedia.zim.json")?;
//!
//! let search = SearchOrchestrator::new(Arc::clone(&registry), &Config::default());
//! search.start("rust language", [id], true);
//! while let Some(hit) = search.next().await? {
//!     println!("{:.2} {} {}", hit.score, hit.title, hit.snippet.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod strategy;
mod task;

pub use orchestrator::SearchOrchestrator;
pub use strategy::{SearchRequest, SearchStrategy, prefix_score};
pub use task::{SearchState, SearchTask};
