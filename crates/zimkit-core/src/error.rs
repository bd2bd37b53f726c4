//! Error types and handling for zimkit-core operations.
//!
//! A single error enum covers the whole core: opening archives, resolving
//! content, and running searches. Errors are categorized for logging and carry
//! a recoverability hint so callers can decide whether to reopen an archive or
//! re-issue a search. Nothing in this crate retries automatically.
//!
//! ## Error Categories
//!
//! - **Open errors**: the file is missing, unreadable, or not a valid archive
//! - **Availability errors**: the archive identifier is not (or no longer) open
//! - **Lookup errors**: a content path is absent, or a redirect chain is too long
//! - **Search errors**: the external engine failed while a search was running
//! - **Configuration errors**: invalid settings or config files
//!
//! ```rust
//! use zimkit_core::{ArchiveId, Error};
//!
//! let err = Error::ArchiveUnavailable(ArchiveId::from_content_hash(b"gone"));
//! assert_eq!(err.category(), "unavailable");
//! assert!(err.is_recoverable());
//! ```

use crate::types::ArchiveId;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for zimkit-core operations.
///
/// All fallible public functions return `Result<T, Error>`. Conversions from
/// `std::io::Error` and the serde format errors are provided so `?` works
/// across file and config handling.
#[derive(Error, Debug)]
pub enum Error {
    /// The file could not be opened as an archive.
    ///
    /// Covers missing files, unreadable files, and files that do not parse as
    /// a supported archive. The archive is never registered in this case.
    #[error("Failed to open archive at {}: {reason}", path.display())]
    Open {
        /// File location that was being opened.
        path: PathBuf,
        /// Why the open failed.
        reason: String,
    },

    /// The archive identifier is not currently open.
    ///
    /// Raised for identifiers that were never opened, were closed, or were
    /// pruned because the backing file disappeared. The caller must reopen.
    #[error("Archive {0} is not open")]
    ArchiveUnavailable(ArchiveId),

    /// A content path does not exist inside an open archive.
    ///
    /// This is a normal negative result, not a fatal condition.
    #[error("Entry '{path}' not found in archive {archive}")]
    NotFound {
        /// Archive that was queried.
        archive: ArchiveId,
        /// Content path that was requested.
        path: String,
    },

    /// A redirect chain exceeded the configured depth.
    ///
    /// Usually a redirect cycle inside a damaged archive.
    #[error("Redirect chain starting at '{path}' exceeds {depth} hops")]
    RedirectLimit {
        /// Path the resolution started from.
        path: String,
        /// Maximum number of hops that were followed.
        depth: usize,
    },

    /// The external search engine failed while a search was running.
    ///
    /// Terminates the running search task as failed; surfaced once through the
    /// orchestrator's `next()`.
    #[error("Search error: {0}")]
    Search(String),

    /// Full-text index construction or querying failed inside a backend.
    #[error("Index error: {0}")]
    Index(String),

    /// A content URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is invalid or inaccessible.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Build an [`Error::Open`] for `path`.
    pub fn open(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Build an [`Error::NotFound`] for `path` inside `archive`.
    pub fn not_found(archive: ArchiveId, path: impl Into<String>) -> Self {
        Self::NotFound {
            archive,
            path: path.into(),
        }
    }

    /// Check if the error might go away if the caller acts and tries again.
    ///
    /// Returns `true` for transient I/O conditions and for
    /// [`Error::ArchiveUnavailable`], which the caller resolves by reopening
    /// the archive. Everything else is permanent for the given input.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ArchiveUnavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Get the error category as a static string identifier.
    ///
    /// Useful as a structured logging field:
    ///
    /// ```rust
    /// use zimkit_core::Error;
    ///
    /// let err = Error::Search("engine crashed".into());
    /// tracing::warn!(category = err.category(), "{err}");
    /// ```
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::ArchiveUnavailable(_) => "unavailable",
            Self::NotFound { .. } => "not_found",
            Self::RedirectLimit { .. } => "redirect",
            Self::Search(_) => "search",
            Self::Index(_) => "index",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
