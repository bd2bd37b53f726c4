//! On-disk layout of a bundle archive.

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// A bundle archive: metadata plus a flat list of entries, stored as JSON.
///
/// ```rust
/// use zimkit_core::bundle::BundleManifest;
///
/// let manifest = BundleManifest::new()
///     .with_metadata("Title", "Fruit")
///     .with_article("/A/Apple", "Apple", "<p>An apple a day.</p>")
///     .with_redirect("/A/Apples", "Apples", "/A/Apple")
///     .with_main_page("/A/Apple");
///
/// assert_eq!(manifest.entries.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Identifier declared by the archive; derived from the bytes when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,

    /// Descriptive metadata keyed by ZIM metadata name (`Title`, `Tags`, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Base64-encoded favicon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,

    /// Path of the main page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_page: Option<String>,

    /// Whether the archive ships a full-text index.
    #[serde(default = "default_full_text_index")]
    pub full_text_index: bool,

    /// All entries, in any order.
    #[serde(default)]
    pub entries: Vec<BundleEntry>,
}

/// One addressable entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Content path, unique within the bundle.
    pub path: String,

    /// Display title; the last path segment is used when empty.
    #[serde(default)]
    pub title: String,

    /// Content or redirect target.
    #[serde(flatten)]
    pub body: EntryBody,
}

/// What an entry holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryBody {
    /// Alias for another entry.
    Redirect {
        /// Target path.
        redirect: String,
    },
    /// Stored bytes.
    Content {
        /// Mime type of the content.
        mime: String,
        /// Text, or base64 when `encoding` says so.
        content: String,
        /// How `content` is encoded.
        #[serde(default)]
        encoding: ContentEncoding,
    },
}

/// Encoding of [`EntryBody::Content::content`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    /// UTF-8 text stored as-is.
    #[default]
    Text,
    /// Binary data stored as standard base64.
    Base64,
}

/// Only the fields needed to identify a bundle.
#[derive(Deserialize)]
pub(crate) struct BundleHeader {
    #[serde(default)]
    pub uuid: Option<Uuid>,
}

const fn default_full_text_index() -> bool {
    true
}

impl BundleManifest {
    /// Empty manifest with a full-text index enabled.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            uuid: None,
            metadata: BTreeMap::new(),
            favicon: None,
            main_page: None,
            full_text_index: true,
            entries: Vec::new(),
        }
    }

    /// Declare an explicit identifier.
    #[must_use]
    pub const fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
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
        self.favicon = Some(STANDARD.encode(bytes));
        self
    }

    /// Set the main page path.
    #[must_use]
    pub fn with_main_page(mut self, path: &str) -> Self {
        self.main_page = Some(path.to_string());
        self
    }

    /// Toggle the full-text index.
    #[must_use]
    pub const fn with_full_text_index(mut self, enabled: bool) -> Self {
        self.full_text_index = enabled;
        self
    }

    /// Add an HTML article.
    #[must_use]
    pub fn with_article(self, path: &str, title: &str, html: &str) -> Self {
        self.with_text(path, title, "text/html", html)
    }

    /// Add a text entry of any mime type, such as a stylesheet.
    #[must_use]
    pub fn with_text(self, path: &str, title: &str, mime: &str, text: &str) -> Self {
        self.with_entry(path, title, EntryBody::Content {
            mime: mime.to_string(),
            content: text.to_string(),
            encoding: ContentEncoding::Text,
        })
    }

    /// Add a binary entry such as an image.
    #[must_use]
    pub fn with_media(self, path: &str, title: &str, mime: &str, bytes: &[u8]) -> Self {
        self.with_entry(path, title, EntryBody::Content {
            mime: mime.to_string(),
            content: STANDARD.encode(bytes),
            encoding: ContentEncoding::Base64,
        })
    }

    /// Add a redirect entry.
    #[must_use]
    pub fn with_redirect(self, path: &str, title: &str, target: &str) -> Self {
        self.with_entry(path, title, EntryBody::Redirect {
            redirect: target.to_string(),
        })
    }

    fn with_entry(mut self, path: &str, title: &str, body: EntryBody) -> Self {
        self.entries.push(BundleEntry {
            path: path.to_string(),
            title: title.to_string(),
            body,
        });
        self
    }

    /// Parse a manifest from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Write the manifest as JSON.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Decode stored content into bytes.
pub(crate) fn decode_content(content: String, encoding: ContentEncoding) -> Result<Vec<u8>> {
    match encoding {
        ContentEncoding::Text => Ok(content.into_bytes()),
        ContentEncoding::Base64 => STANDARD
            .decode(content)
            .map_err(|e| Error::Serialization(format!("invalid base64 content: {e}"))),
    }
}

pub(crate) fn decode_favicon(encoded: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(encoded)
        .map_err(|e| Error::Serialization(format!("invalid base64 favicon: {e}")))
}
