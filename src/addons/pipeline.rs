//! Download pipeline.
//!
//! Runs one installation end to end: fetch the archive, stage it, unpack it
//! into the add-on directory and record the manifest, reporting each step on
//! the event channel.

use super::archive;
use super::events::{AddonEvent, EventChannel};
use super::manifest::ManifestStore;
use super::registry::{TransferRegistry, TransferTicket};
use super::types::{AddonError, ResourceItem};
use super::InstallOutcome;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension of files still being downloaded.
const DOWNLOAD_EXTENSION: &str = "download";

/// Extension given to staged archives before extraction.
const ARCHIVE_EXTENSION: &str = "zip";

/// Executes installs on behalf of the add-on manager.
#[derive(Debug, Clone)]
pub(crate) struct DownloadPipeline {
    client: reqwest::Client,
    store: ManifestStore,
    registry: Arc<TransferRegistry>,
    events: EventChannel,
    download_dir: PathBuf,
}

impl DownloadPipeline {
    pub(crate) fn new(
        client: reqwest::Client,
        store: ManifestStore,
        registry: Arc<TransferRegistry>,
        events: EventChannel,
        download_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            store,
            registry,
            events,
            download_dir,
        }
    }

    /// Runs the pipeline for `item` until a terminal outcome.
    ///
    /// The registry slot is released before the terminal event is published.
    /// Cancellation publishes nothing.
    pub(crate) async fn run(self, item: ResourceItem, ticket: TransferTicket) -> InstallOutcome {
        info!("[ADDON-PIPELINE] Installing '{}' from {}", item.id, item.archive_url);

        let result = self.execute(&item, &ticket).await;
        self.registry.release(&ticket);

        match result {
            Ok(()) => {
                info!("[ADDON-PIPELINE] Installed '{}'", item.id);
                self.events.publish(AddonEvent::Succeeded { id: item.id });
                InstallOutcome::Installed
            }
            Err(AddonError::Cancelled) => {
                info!("[ADDON-PIPELINE] Install of '{}' cancelled", item.id);
                InstallOutcome::Cancelled
            }
            Err(e) => {
                warn!("[ADDON-PIPELINE] Install of '{}' failed: {}", item.id, e);
                let error = Arc::new(e);
                self.events.publish(AddonEvent::Failed {
                    id: item.id,
                    error: Arc::clone(&error),
                });
                InstallOutcome::Failed(error)
            }
        }
    }

    async fn execute(&self, item: &ResourceItem, ticket: &TransferTicket) -> Result<(), AddonError> {
        let download = self.fetch(item, ticket).await?;

        if ticket.is_cancelled() {
            remove_quietly(&download).await;
            return Err(AddonError::Cancelled);
        }

        let staged = match self.stage(&download).await {
            Ok(path) => path,
            Err(e) => {
                remove_quietly(&download).await;
                return Err(e);
            }
        };

        let result = self.install(item, ticket, &staged).await;
        remove_quietly(&staged).await;
        result
    }

    /// Downloads the archive into a temporary file.
    ///
    /// Nothing is left on disk unless the download completes.
    async fn fetch(&self, item: &ResourceItem, ticket: &TransferTicket) -> Result<PathBuf, AddonError> {
        let url = reqwest::Url::parse(&item.archive_url).map_err(|e| AddonError::InvalidUrl {
            url: item.archive_url.clone(),
            reason: e.to_string(),
        })?;

        fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(format!("{}.{}", Uuid::new_v4(), DOWNLOAD_EXTENSION));

        match self.stream_to_file(url, &path, ticket).await {
            Ok(bytes) => {
                debug!("[ADDON-PIPELINE] Fetched {} bytes for '{}'", bytes, item.id);
                Ok(path)
            }
            Err(e) => {
                remove_quietly(&path).await;
                Err(e)
            }
        }
    }

    async fn stream_to_file(
        &self,
        url: reqwest::Url,
        path: &Path,
        ticket: &TransferTicket,
    ) -> Result<u64, AddonError> {
        let token = ticket.token();

        let response = tokio::select! {
            () = token.cancelled() => return Err(AddonError::Cancelled),
            response = self.client.get(url.clone()).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AddonError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut file = fs::File::create(path).await?;
        let stream = response.bytes_stream();
        tokio::pin!(stream);

        let mut downloaded: u64 = 0;
        loop {
            let next = tokio::select! {
                () = token.cancelled() => return Err(AddonError::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk?;

            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = total {
                self.report_progress(ticket, (downloaded as f64 / total as f64).min(1.0));
            }
        }
        file.flush().await?;

        if total.is_none() {
            self.report_progress(ticket, 1.0);
        }
        Ok(downloaded)
    }

    fn report_progress(&self, ticket: &TransferTicket, fraction: f64) {
        self.registry.record_progress(ticket, fraction);
        self.events.publish(AddonEvent::Progress {
            id: ticket.id().to_string(),
            fraction,
        });
    }

    /// Moves a finished download to a fresh path with the archive extension.
    async fn stage(&self, download: &Path) -> Result<PathBuf, AddonError> {
        let staged = self
            .download_dir
            .join(format!("{}.{}", Uuid::new_v4(), ARCHIVE_EXTENSION));
        fs::rename(download, &staged).await?;
        Ok(staged)
    }

    /// Unpacks the staged archive and records the manifest.
    async fn install(
        &self,
        item: &ResourceItem,
        ticket: &TransferTicket,
        archive_path: &Path,
    ) -> Result<(), AddonError> {
        if ticket.is_cancelled() {
            return Err(AddonError::Cancelled);
        }

        self.unpack_into(item, ticket, archive_path).await?;

        self.events.publish(AddonEvent::Unpacked {
            id: item.id.clone(),
        });

        let store = self.store.clone();
        let manifest_item = item.clone();
        match tokio::task::spawn_blocking(move || store.write(&manifest_item)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "[ADDON-PIPELINE] Could not write manifest for '{}': {}",
                item.id, e
            ),
            Err(e) => warn!(
                "[ADDON-PIPELINE] Manifest writer for '{}' failed: {}",
                item.id, e
            ),
        }

        Ok(())
    }

    /// Unpacks the staged archive into the add-on directory.
    ///
    /// A cancellation seen during or right after extraction removes what was
    /// written.
    async fn unpack_into(
        &self,
        item: &ResourceItem,
        ticket: &TransferTicket,
        archive_path: &Path,
    ) -> Result<usize, AddonError> {
        let dest = self.store.item_dir(&item.id);
        let unpacked = {
            let store = self.store.clone();
            let id = item.id.clone();
            let archive_path = archive_path.to_path_buf();
            let dest = dest.clone();
            let token = ticket.token().clone();

            tokio::task::spawn_blocking(move || {
                // A manifest from an earlier install must not vouch for a
                // partial reinstall.
                store.remove(&id)?;
                archive::unpack(&archive_path, &dest, &token)
            })
            .await?
        };

        match unpacked {
            Ok(_) if ticket.is_cancelled() => {}
            Ok(count) => {
                debug!("[ADDON-PIPELINE] Unpacked {} file(s) for '{}'", count, item.id);
                return Ok(count);
            }
            Err(AddonError::Cancelled) => {}
            Err(e) => return Err(e),
        }

        self.discard_cancelled(&item.id, &dest).await;
        Err(AddonError::Cancelled)
    }

    /// Removes content unpacked by a cancelled install.
    ///
    /// Skipped when a newer transfer for the same ID already owns the slot.
    async fn discard_cancelled(&self, id: &str, dest: &Path) {
        if self.registry.is_active(id) {
            debug!("[ADDON-PIPELINE] '{}' restarted, leaving {} in place", id, dest.display());
            return;
        }
        if let Err(e) = fs::remove_dir_all(dest).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("[ADDON-PIPELINE] Could not remove {}: {}", dest.display(), e);
            }
        }
    }

    /// Deletes leftover downloads and staged archives.
    pub(crate) fn sweep_staging(&self) -> io::Result<usize> {
        sweep_dir(&self.download_dir)
    }
}

/// Removes files with pipeline extensions from `dir`.
fn sweep_dir(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ours = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == DOWNLOAD_EXTENSION || e == ARCHIVE_EXTENSION);

        if ours && path.is_file() && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    debug!("[ADDON-PIPELINE] Swept {} stale file(s) from {}", removed, dir.display());
    Ok(removed)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("[ADDON-PIPELINE] Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn make_pipeline(root: &Path, downloads: &Path, registry: &Arc<TransferRegistry>) -> DownloadPipeline {
        DownloadPipeline::new(
            reqwest::Client::new(),
            ManifestStore::new(root.to_path_buf()),
            Arc::clone(registry),
            EventChannel::new(),
            downloads.to_path_buf(),
        )
    }

    fn write_archive(path: &Path) {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for name in ["a.txt", "b.txt", "c.txt"] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(name.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_sweep_dir_only_removes_pipeline_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.download"), "x").unwrap();
        std::fs::write(dir.path().join("b.zip"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(sweep_dir(dir.path()).unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_sweep_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(sweep_dir(&dir.path().join("absent")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_files() {
        let root = TempDir::new().unwrap();
        let downloads = TempDir::new().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        let events = EventChannel::new();
        let mut sub = events.subscribe();

        let pipeline = DownloadPipeline::new(
            reqwest::Client::new(),
            ManifestStore::new(root.path().to_path_buf()),
            Arc::clone(&registry),
            events,
            downloads.path().to_path_buf(),
        );

        let item = ResourceItem::new("bad", "Bad", "not a url");
        let ticket = registry.try_begin("bad").unwrap();
        let outcome = pipeline.run(item, ticket).await;

        assert!(matches!(outcome, InstallOutcome::Failed(_)));
        assert!(!registry.is_active("bad"));
        match sub.try_recv() {
            Some(AddonEvent::Failed { error, .. }) => {
                assert!(matches!(*error, AddonError::InvalidUrl { .. }));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_unpack_removes_directory() {
        let root = TempDir::new().unwrap();
        let downloads = TempDir::new().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        let pipeline = make_pipeline(root.path(), downloads.path(), &registry);

        let archive_path = downloads.path().join("staged.zip");
        write_archive(&archive_path);
        let dest = root.path().join("nebulae");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("old.txt"), "earlier install").unwrap();

        let item = ResourceItem::new("nebulae", "Nebulae", "https://e.com/nebulae.zip");
        let ticket = registry.try_begin("nebulae").unwrap();
        registry.cancel("nebulae");

        let result = pipeline.unpack_into(&item, &ticket, &archive_path).await;
        assert!(matches!(result, Err(AddonError::Cancelled)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_cancelled_unpack_leaves_restarted_install() {
        let root = TempDir::new().unwrap();
        let downloads = TempDir::new().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        let pipeline = make_pipeline(root.path(), downloads.path(), &registry);

        let archive_path = downloads.path().join("staged.zip");
        write_archive(&archive_path);

        let item = ResourceItem::new("nebulae", "Nebulae", "https://e.com/nebulae.zip");
        let stale = registry.try_begin("nebulae").unwrap();
        registry.cancel("nebulae");
        let _fresh = registry.try_begin("nebulae").unwrap();

        let result = pipeline.unpack_into(&item, &stale, &archive_path).await;
        assert!(matches!(result, Err(AddonError::Cancelled)));
        assert!(root.path().join("nebulae").is_dir());
        assert!(registry.is_active("nebulae"));
    }

    #[tokio::test]
    async fn test_unpack_into_writes_files() {
        let root = TempDir::new().unwrap();
        let downloads = TempDir::new().unwrap();
        let registry = Arc::new(TransferRegistry::new());
        let pipeline = make_pipeline(root.path(), downloads.path(), &registry);

        let archive_path = downloads.path().join("staged.zip");
        write_archive(&archive_path);

        let item = ResourceItem::new("nebulae", "Nebulae", "https://e.com/nebulae.zip");
        let ticket = registry.try_begin("nebulae").unwrap();

        assert_eq!(pipeline.unpack_into(&item, &ticket, &archive_path).await.unwrap(), 3);
        assert!(root.path().join("nebulae").join("c.txt").is_file());
    }
}
