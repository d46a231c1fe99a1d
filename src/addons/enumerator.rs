//! Installed-item enumeration.
//!
//! The add-on root is scanned on every query; there is no index to drift
//! out of sync with the disk.

use super::manifest::ManifestStore;
use super::types::{AddonError, ResourceItem, validate_id};
use std::fs;
use std::io;
use tracing::{debug, info};

/// Answers questions about what is installed under an add-on root.
#[derive(Debug, Clone)]
pub struct InstalledAddons {
    store: ManifestStore,
}

impl InstalledAddons {
    /// Creates an enumerator over the store's root.
    #[must_use]
    pub fn new(store: ManifestStore) -> Self {
        Self { store }
    }

    /// Lists installed add-ons, sorted by ID.
    ///
    /// A subdirectory counts only if its manifest parses and names the
    /// directory. Anything else is skipped; this never fails.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceItem> {
        let entries = match fs::read_dir(self.store.root()) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "[ADDON-SCAN] Cannot read {}: {}",
                    self.store.root().display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut items: Vec<ResourceItem> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| {
                let dir_name = entry.file_name().into_string().ok()?;
                match ManifestStore::read_dir_manifest(&entry.path()) {
                    Ok(item) if item.id == dir_name => Some(item),
                    Ok(item) => {
                        debug!(
                            "[ADDON-SCAN] Skipping '{}': manifest id is '{}'",
                            dir_name, item.id
                        );
                        None
                    }
                    Err(e) => {
                        debug!("[ADDON-SCAN] Skipping '{}': {}", dir_name, e);
                        None
                    }
                }
            })
            .collect();

        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    /// Returns the installed manifest for `id`, if it is listed.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ResourceItem> {
        if validate_id(id).is_err() {
            return None;
        }
        self.store.read(id).ok().filter(|item| item.id == id)
    }

    /// Returns true if a directory for `id` exists.
    ///
    /// Weaker than [`list`](Self::list): a partially unpacked add-on
    /// without a manifest still counts.
    #[must_use]
    pub fn is_installed(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.store.item_dir(id).is_dir()
    }

    /// Recursively deletes the install directory for `id`.
    pub fn remove(&self, id: &str) -> Result<(), AddonError> {
        validate_id(id)?;
        let dir = self.store.item_dir(id);

        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("[ADDON-SCAN] Removed {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(AddonError::NotInstalled(id.to_string()))
            }
            Err(e) => Err(AddonError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ManifestStore, InstalledAddons) {
        let root = TempDir::new().unwrap();
        let store = ManifestStore::new(root.path().to_path_buf());
        let addons = InstalledAddons::new(store.clone());
        (root, store, addons)
    }

    fn install_fake(store: &ManifestStore, id: &str) -> ResourceItem {
        let item = ResourceItem::new(id, id.to_uppercase(), format!("https://e.com/{}.zip", id));
        fs::create_dir_all(store.item_dir(id)).unwrap();
        store.write(&item).unwrap();
        item
    }

    #[test]
    fn test_list_sorted_valid_only() {
        let (_root, store, addons) = setup();
        let b = install_fake(&store, "b-stars");
        let a = install_fake(&store, "a-comets");

        // Directory without a manifest
        fs::create_dir(store.item_dir("partial")).unwrap();
        // Manifest naming another directory
        fs::create_dir(store.item_dir("renamed")).unwrap();
        fs::write(
            store.manifest_path("renamed"),
            serde_json::to_vec(&ResourceItem::new("original", "O", "https://e.com/o.zip")).unwrap(),
        )
        .unwrap();
        // Unparsable manifest
        fs::create_dir(store.item_dir("corrupt")).unwrap();
        fs::write(store.manifest_path("corrupt"), "[]").unwrap();
        // Loose file at the root
        fs::write(store.root().join("readme.txt"), "hi").unwrap();

        assert_eq!(addons.list(), vec![a, b]);
        assert!(store.item_dir("corrupt").exists(), "invalid entries are not deleted");
    }

    #[test]
    fn test_list_missing_root() {
        let store = ManifestStore::new(std::path::PathBuf::from("/nonexistent/orbit/addons"));
        assert!(InstalledAddons::new(store).list().is_empty());
    }

    #[test]
    fn test_is_installed_asymmetry() {
        let (_root, store, addons) = setup();
        fs::create_dir(store.item_dir("partial")).unwrap();

        assert!(addons.is_installed("partial"));
        assert!(addons.get("partial").is_none());
        assert!(addons.list().is_empty());
    }

    #[test]
    fn test_is_installed_rejects_bad_ids() {
        let (_root, _store, addons) = setup();
        assert!(!addons.is_installed(".."));
        assert!(!addons.is_installed(""));
    }

    #[test]
    fn test_remove_twice() {
        let (_root, store, addons) = setup();
        install_fake(&store, "nebulae");

        addons.remove("nebulae").unwrap();
        assert!(!addons.is_installed("nebulae"));
        assert!(addons.list().is_empty());

        assert!(matches!(
            addons.remove("nebulae"),
            Err(AddonError::NotInstalled(id)) if id == "nebulae"
        ));
    }
}
