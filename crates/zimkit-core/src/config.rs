//! Configuration for the reader registry, content resolver and search pipeline.
//!
//! Configuration is stored in TOML. Every field has a default, so a partial
//! file (or no file at all) is valid.
//!
//! ## Lookup Order
//!
//! 1. `$ZIMKIT_CONFIG`, when set to a non-empty path
//! 2. The platform config directory (see [`Config::default_path`])
//! 3. Built-in defaults when neither file exists
//!
//! ## Example Configuration File
//!
//! ```toml
//! [search]
//! max_concurrent_searches = 4
//! full_text_limit = 100
//! snippet_mode = "matches"
//! snippet_max_chars = 200
//!
//! [suggest]
//! max_candidates = 5000
//! prefix_len = 1
//! full_text_fallback_below = 1
//!
//! [content]
//! max_redirect_depth = 16
//! chunk_size = 2097152
//! ```

use crate::types::SnippetMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "ZIMKIT_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search pipeline settings
    pub search: SearchConfig,
    /// Fuzzy title suggestion settings
    pub suggest: SuggestConfig,
    /// Content resolution settings
    pub content: ContentConfig,
}

/// Settings for the search orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// How many per-archive engine searches may run at once.
    pub max_concurrent_searches: usize,

    /// Maximum candidates requested from each archive's full-text index.
    pub full_text_limit: usize,

    /// Snippet mode used when a search is started with snippet extraction on.
    pub snippet_mode: SnippetMode,

    /// Upper bound on snippet length, in characters.
    pub snippet_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_searches: std::thread::available_parallelism()
                .map_or(4, |n| n.get().clamp(2, 8)),
            full_text_limit: 100,
            snippet_mode: SnippetMode::FirstParagraph,
            snippet_max_chars: 200,
        }
    }
}

/// Settings for the edit-distance title matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Archives with more titles than this are narrowed through the title
    /// prefix index before distances are computed.
    pub max_candidates: usize,

    /// Number of leading query characters used for that prefix narrowing.
    pub prefix_len: usize,

    /// A full-text search that returns fewer hits than this from an archive
    /// is topped up with title suggestions. `0` turns the top-up off.
    pub full_text_fallback_below: usize,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            max_candidates: 5_000,
            prefix_len: 1,
            full_text_fallback_below: 1,
        }
    }
}

/// Settings for content resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Maximum number of redirect hops followed before giving up.
    pub max_redirect_depth: usize,

    /// Chunk size used by [`crate::ContentResolver::chunks`] for large entries.
    pub chunk_size: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_redirect_depth: 16,
            chunk_size: 2 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from `$ZIMKIT_CONFIG` or the default location.
    ///
    /// Returns defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// its values fail [`Config::validate`].
    pub fn load() -> Result<Self> {
        let path = Self::resolve_path()?;
        if path.exists() {
            Self::from_file(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;
        Ok(())
    }

    /// Reject values that would make the pipeline do nothing.
    pub fn validate(&self) -> Result<()> {
        if self.search.max_concurrent_searches == 0 {
            return Err(Error::Config(
                "search.max_concurrent_searches must be at least 1".into(),
            ));
        }
        if self.search.full_text_limit == 0 {
            return Err(Error::Config("search.full_text_limit must be at least 1".into()));
        }
        if self.content.max_redirect_depth == 0 {
            return Err(Error::Config(
                "content.max_redirect_depth must be at least 1".into(),
            ));
        }
        if self.content.chunk_size == 0 {
            return Err(Error::Config("content.chunk_size must be at least 1".into()));
        }
        Ok(())
    }

    /// Platform config file location.
    ///
    /// - Linux: `~/.config/zimkit/config.toml`
    /// - macOS: `~/Library/Application Support/org.kiwix.zimkit/config.toml`
    /// - Windows: `%APPDATA%\kiwix\zimkit\config\config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("org", "kiwix", "zimkit")
            .ok_or_else(|| Error::Config("Failed to determine project directories".into()))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    fn resolve_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
        Self::default_path()
    }
}
