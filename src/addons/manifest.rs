//! Manifest storage.
//!
//! Each installed add-on carries a `description.json` next to its content.
//! The manifest is the only persisted record of an installation.

use super::types::{AddonError, ResourceItem};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the manifest inside an add-on directory.
pub const MANIFEST_FILE: &str = "description.json";

/// Maximum manifest size accepted when reading (64 KB).
const MAX_MANIFEST_SIZE: u64 = 64 * 1024;

/// Reads and writes manifests under an add-on root.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    /// Directory holding one subdirectory per installed add-on.
    root: PathBuf,
}

impl ManifestStore {
    /// Creates a store over the given add-on root.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the add-on root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if the add-on root exists and is a directory.
    #[must_use]
    pub fn root_available(&self) -> bool {
        self.root.is_dir()
    }

    /// Returns the install directory for an add-on.
    #[must_use]
    pub fn item_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Returns the manifest path for an add-on.
    #[must_use]
    pub fn manifest_path(&self, id: &str) -> PathBuf {
        self.item_dir(id).join(MANIFEST_FILE)
    }

    /// Serializes `item` into its install directory.
    pub fn write(&self, item: &ResourceItem) -> Result<(), AddonError> {
        let path = self.manifest_path(&item.id);
        let json = serde_json::to_vec_pretty(item)?;
        fs::write(&path, json)?;
        debug!("[ADDON-MANIFEST] Wrote {}", path.display());
        Ok(())
    }

    /// Reads the manifest from an install directory.
    pub fn read_dir_manifest(dir: &Path) -> Result<ResourceItem, AddonError> {
        let path = dir.join(MANIFEST_FILE);

        let size = fs::metadata(&path)?.len();
        if size > MAX_MANIFEST_SIZE {
            return Err(AddonError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("manifest too large ({} bytes)", size),
            )));
        }

        let content = fs::read(&path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Reads the manifest of an add-on by ID.
    pub fn read(&self, id: &str) -> Result<ResourceItem, AddonError> {
        Self::read_dir_manifest(&self.item_dir(id))
    }

    /// Removes a manifest left by an earlier install, if any.
    pub fn remove(&self, id: &str) -> io::Result<()> {
        match fs::remove_file(self.manifest_path(id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
