//! # zimkit-core
//!
//! Core library for reading offline content archives (ZIM-style packages of
//! articles, media, metadata and a full-text index).
//!
//! The crate manages the lifecycle of open archives and builds the services
//! an offline reader needs on top of them. Parsing archive files and running
//! the full-text engine are the job of an [`ArchiveBackend`]; this crate
//! orchestrates calls into it.
//!
//! ## Architecture
//!
//! - **Registry**: [`ReaderRegistry`] holds one [`ArchiveHandle`] per
//!   content-derived [`ArchiveId`]; opening the same archive twice is a no-op
//! - **Metadata**: [`MetadataCache`] reads descriptive fields once per handle
//! - **Content**: [`ContentResolver`] resolves paths to bytes, following
//!   redirect chains with a depth bound
//! - **Suggestions**: [`SuggestionMatcher`] ranks titles by edit distance
//! - **Search**: [`SearchOrchestrator`] runs one cancellable search at a time
//!   across many archives and streams merged, ranked results
//! - **Bundles**: [`bundle::BundleBackend`] is a reference backend over JSON
//!   files with an in-memory tantivy index
//!
//! ## Quick Start
//!
//! ```rust
//! use zimkit_core::bundle::BundleManifest;
//! use zimkit_core::{Config, Library};
//!
//! let dir = tempfile::tempdir()?;
//! let path = dir.path().join("fruit.json");
//! BundleManifest::new()
//!     .with_metadata("Title", "Fruit")
//!     .with_main_page("/A/Home")
//!     .with_redirect("/A/Home", "Home", "/A/Apple")
//!     .with_article("/A/Apple", "Apple", "<p>Apples grow on trees.</p>")
//!     .write_to(&path)?;
//!
//! let library = Library::bundles(Config::default())?;
//! let id = library.open(&path)?;
//!
//! let home = library.content().main_page(id)?;
//! assert_eq!(home.as_deref(), Some("/A/Apple"));
//!
//! let titles = library.search().title_search("app", Some(id), 5);
//! assert_eq!(titles[0].title, "Apple");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`] with structured error
//! information:
//!
//! ```rust
//! use zimkit_core::{ArchiveId, Error};
//!
//! fn describe(err: &Error) -> String {
//!     match err {
//!         Error::NotFound { path, .. } => format!("no entry at {path}"),
//!         e if e.is_recoverable() => format!("retry later: {e}"),
//!         e => format!("{} error: {e}", e.category()),
//!     }
//! }
//!
//! let gone = Error::ArchiveUnavailable(ArchiveId::from_content_hash(b"x"));
//! assert!(describe(&gone).starts_with("retry later"));
//! ```

/// Traits implemented by archive engines
pub mod backend;
/// Reference backend over JSON bundles
pub mod bundle;
/// Configuration loading and validation
pub mod config;
/// Content resolution and content URLs
pub mod content;
/// Error types and result aliases
pub mod error;
/// Shared handles to open archives
pub mod handle;
/// Facade wiring all services together
pub mod library;
/// Archive metadata and its cache
pub mod metadata;
/// Performance profiling utilities
pub mod profiling;
/// The registry of open archives
pub mod registry;
/// Cross-archive search
pub mod search;
/// Snippet extraction
pub mod snippet;
/// Edit-distance title suggestions
pub mod suggest;
/// In-memory backend for tests
#[cfg(any(test, feature = "mock"))]
pub mod testing;
/// Core data types and structures
pub mod types;

// Re-export commonly used types
pub use backend::{ArchiveBackend, ArchiveReader};
pub use config::{Config, ContentConfig, SearchConfig, SuggestConfig};
pub use content::{Content, ContentInfo, ContentResolver, ContentUrl, byte_ranges};
pub use error::{Error, Result};
pub use handle::{ArchiveHandle, ArchiveLease};
pub use library::Library;
pub use metadata::{ArchiveMetadata, MetadataCache, TagFlags};
pub use profiling::{MetricsSnapshot, PerformanceMetrics};
pub use registry::ReaderRegistry;
pub use search::{SearchOrchestrator, SearchRequest, SearchState, SearchStrategy, SearchTask};
pub use suggest::{Suggestion, SuggestionMatcher};
pub use types::*;
