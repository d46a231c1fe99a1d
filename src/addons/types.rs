//! Add-on type definitions.
//!
//! Core data structures and the error type shared by every part of the
//! add-on manager.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Maximum length of an add-on ID.
pub const MAX_ADDON_ID_LEN: usize = 255;

/// A downloadable add-on as described by the catalog.
///
/// The serialized form doubles as the on-disk manifest
/// (`{name, description, id, image, item}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceItem {
    /// Display name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Unique identifier, also the name of the install directory.
    pub id: String,
    /// Optional preview image URL.
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// URL of the zip archive holding the add-on content.
    #[serde(rename = "item")]
    pub archive_url: String,
}

impl ResourceItem {
    /// Creates a new item with an empty description and no preview image.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, archive_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            id: id.into(),
            image_url: None,
            archive_url: archive_url.into(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the preview image URL.
    #[must_use]
    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Checks that the ID can name exactly one directory under the add-on root.
    pub fn validate(&self) -> Result<(), AddonError> {
        validate_id(&self.id)
    }
}

/// Checks that `id` is usable as a single path component.
pub fn validate_id(id: &str) -> Result<(), AddonError> {
    let invalid = id.is_empty()
        || id.len() > MAX_ADDON_ID_LEN
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0']);

    if invalid {
        return Err(AddonError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Add-on error types.
#[derive(Debug, Error)]
pub enum AddonError {
    /// The ID cannot be used as a directory name.
    #[error("Invalid add-on id: {0:?}")]
    InvalidId(String),

    /// The add-on root directory is missing or not a directory.
    #[error("Add-on directory unavailable: {}", .0.display())]
    RootUnavailable(PathBuf),

    /// A transfer for this add-on is in flight.
    #[error("Add-on '{0}' has a transfer in progress")]
    Busy(String),

    /// No install directory exists for this add-on.
    #[error("Add-on '{0}' is not installed")]
    NotInstalled(String),

    /// The archive URL could not be parsed.
    #[error("Invalid archive URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Network error during the download.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("Download of {url} failed with HTTP {status}")]
    HttpStatus { status: u16, url: String },

    /// The archive could not be read.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// An archive entry would be written outside the install directory.
    #[error("Archive entry escapes the install directory: {0}")]
    UnsafeEntry(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Manifest (de)serialization error.
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// The operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A background worker panicked or was aborted.
    #[error("Background worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for AddonError {
    fn from(e: tokio::task::JoinError) -> Self {
        AddonError::Worker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_item_builder() {
        let item = ResourceItem::new("hires-moon", "Hi-res Moon", "https://example.com/moon.zip")
            .with_description("16k lunar texture")
            .with_image("https://example.com/moon.png");

        assert_eq!(item.id, "hires-moon");
        assert_eq!(item.description, "16k lunar texture");
        assert_eq!(item.image_url.as_deref(), Some("https://example.com/moon.png"));
    }

    #[test]
    fn test_manifest_field_names() {
        let item = ResourceItem::new("x", "X", "https://example.com/x.zip").with_image("https://example.com/x.png");
        let value = serde_json::to_value(&item).unwrap();

        assert_eq!(value["id"], "x");
        assert_eq!(value["item"], "https://example.com/x.zip");
        assert_eq!(value["image"], "https://example.com/x.png");
        assert!(value.get("archive_url").is_none());
    }

    #[test]
    fn test_image_is_optional() {
        let json = r#"{"name":"Comets","description":"","id":"comets","item":"https://e.com/c.zip"}"#;
        let item: ResourceItem = serde_json::from_str(json).unwrap();
        assert!(item.image_url.is_none());

        let out = serde_json::to_string(&item).unwrap();
        assert!(!out.contains("image"));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("jupiter-moons").is_ok());
        assert!(validate_id("2k_textures.v2").is_ok());

        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(
                matches!(validate_id(bad), Err(AddonError::InvalidId(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(validate_id(&"a".repeat(MAX_ADDON_ID_LEN + 1)).is_err());
    }
}
