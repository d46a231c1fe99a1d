//! Add-on resource manager.
//!
//! Downloads, installs, tracks and removes optional content packages.
//!
//! # Architecture
//!
//! - **types**: `ResourceItem` and `AddonError`
//! - **manifest**: `description.json` read/write under the add-on root
//! - **registry**: in-flight transfers, at most one per add-on ID
//! - **pipeline**: fetch, stage, unpack and record an add-on
//! - **archive**: zip extraction
//! - **events**: multi-subscriber lifecycle notifications
//! - **enumerator**: directory scan of installed add-ons
//! - **catalog**: HTTP lookup of add-on metadata
//!
//! # Usage
//!
//! ```no_run
//! # async fn demo() -> Result<(), orbit_addons::addons::AddonError> {
//! use orbit_addons::addons::{AddonManager, AddonSettings, InstallRequest, ResourceItem};
//!
//! let manager = AddonManager::new(AddonSettings::new("/data/addons".into()));
//! let item = ResourceItem::new("comets", "Comets", "https://example.com/comets.zip");
//!
//! if let InstallRequest::Started(task) = manager.install(item)? {
//!     let outcome = task.wait().await?;
//!     println!("{:?}", outcome);
//! }
//! # Ok(())
//! # }
//! ```

mod archive;
mod catalog;
mod enumerator;
mod events;
mod manifest;
mod pipeline;
mod registry;
mod types;

pub use catalog::{CatalogError, CatalogProvider, DEFAULT_CATALOG_URL, HttpCatalog};
pub use enumerator::InstalledAddons;
pub use events::{AddonEvent, EventChannel, Subscription};
pub use manifest::{MANIFEST_FILE, ManifestStore};
pub use registry::{TransferRegistry, TransferTicket};
pub use types::{AddonError, MAX_ADDON_ID_LEN, ResourceItem, validate_id};

use pipeline::DownloadPipeline;
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// User agent sent with archive downloads.
const USER_AGENT: &str = concat!("orbit-addons/", env!("CARGO_PKG_VERSION"));

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time allowed between two reads of a response.
///
/// Bounds stalls, not total download time, so large add-ons still finish.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Returns the default directory for in-flight downloads.
#[must_use]
pub fn default_download_dir() -> PathBuf {
    env::temp_dir().join("orbit-addons")
}

/// Locations used by the add-on manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonSettings {
    /// Directory holding one subdirectory per installed add-on.
    pub addon_root: PathBuf,
    /// Directory for downloads before they are unpacked.
    pub download_dir: PathBuf,
    /// Connection timeout for archive downloads.
    pub connect_timeout: Duration,
    /// Idle timeout between reads of an archive download.
    pub read_timeout: Duration,
}

impl AddonSettings {
    /// Creates settings with the default download directory.
    #[must_use]
    pub fn new(addon_root: PathBuf) -> Self {
        Self {
            addon_root,
            download_dir: default_download_dir(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the download directory.
    #[must_use]
    pub fn with_download_dir(mut self, download_dir: PathBuf) -> Self {
        self.download_dir = download_dir;
        self
    }

    /// Sets the connect and read timeouts of the download client.
    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }
}

/// How an install ended.
#[derive(Debug, Clone)]
pub enum InstallOutcome {
    /// Unpacked and recorded.
    Installed,
    /// Download or unpack failed.
    Failed(Arc<AddonError>),
    /// Cancelled before completion.
    Cancelled,
}

impl InstallOutcome {
    /// Returns true for [`InstallOutcome::Installed`].
    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

/// Result of asking for an install.
#[derive(Debug)]
pub enum InstallRequest {
    /// A new transfer was started.
    Started(InstallTask),
    /// A transfer for the same ID is already running; nothing was done.
    AlreadyInProgress,
}

/// Handle to a running install.
#[derive(Debug)]
pub struct InstallTask {
    id: String,
    ticket: TransferTicket,
    registry: Arc<TransferRegistry>,
    events: Subscription,
    handle: JoinHandle<InstallOutcome>,
}

impl InstallTask {
    /// Add-on ID being installed.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Events for this add-on, starting from the first one the install emits.
    ///
    /// Only this add-on's events are queued; they are buffered until read.
    pub fn events(&mut self) -> &mut Subscription {
        &mut self.events
    }

    /// Cancels this install.
    ///
    /// Does nothing once it has finished, and never touches a later install
    /// of the same add-on.
    pub fn cancel(&self) -> bool {
        self.registry.cancel_ticket(&self.ticket)
    }

    /// Waits for the install to finish.
    pub async fn wait(self) -> Result<InstallOutcome, AddonError> {
        Ok(self.handle.await?)
    }
}

/// Entry point for add-on operations.
///
/// Cheap to clone; clones share transfer state and subscribers.
#[derive(Debug, Clone)]
pub struct AddonManager {
    store: ManifestStore,
    installed: InstalledAddons,
    registry: Arc<TransferRegistry>,
    events: EventChannel,
    pipeline: DownloadPipeline,
}

impl AddonManager {
    /// Creates a manager with an HTTP client using the settings' timeouts.
    #[must_use]
    pub fn new(settings: AddonSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(settings, client)
    }

    /// Creates a manager that downloads through `client`.
    #[must_use]
    pub fn with_client(settings: AddonSettings, client: reqwest::Client) -> Self {
        let store = ManifestStore::new(settings.addon_root);
        let registry = Arc::new(TransferRegistry::new());
        let events = EventChannel::new();
        let pipeline = DownloadPipeline::new(
            client,
            store.clone(),
            Arc::clone(&registry),
            events.clone(),
            settings.download_dir,
        );

        Self {
            installed: InstalledAddons::new(store.clone()),
            store,
            registry,
            events,
            pipeline,
        }
    }

    /// Returns the add-on root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.store.root()
    }

    /// Creates the add-on root if it is missing.
    pub fn ensure_root(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.store.root())
    }

    /// Returns the event channel.
    #[must_use]
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Subscribes to events for every add-on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Returns the transfer registry.
    #[must_use]
    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    /// Starts installing `item` in the background.
    ///
    /// Fails immediately for an unusable ID or a missing add-on root; every
    /// later failure arrives as an [`AddonEvent::Failed`]. Must be called
    /// from within a tokio runtime.
    pub fn install(&self, item: ResourceItem) -> Result<InstallRequest, AddonError> {
        item.validate()?;
        if !self.store.root_available() {
            return Err(AddonError::RootUnavailable(self.store.root().to_path_buf()));
        }

        let Some(ticket) = self.registry.try_begin(&item.id) else {
            info!("[ADDON-MANAGER] '{}' is already downloading", item.id);
            return Ok(InstallRequest::AlreadyInProgress);
        };

        let id = item.id.clone();
        let events = self.events.subscribe_to(id.clone());
        let handle = tokio::spawn(self.pipeline.clone().run(item, ticket.clone()));

        Ok(InstallRequest::Started(InstallTask {
            id,
            ticket,
            registry: Arc::clone(&self.registry),
            events,
            handle,
        }))
    }

    /// Cancels the transfer for `id`, if one is running.
    pub fn cancel(&self, id: &str) {
        self.registry.cancel(id);
    }

    /// Returns true if a transfer for `id` is running.
    #[must_use]
    pub fn is_downloading(&self, id: &str) -> bool {
        self.registry.is_active(id)
    }

    /// Returns the last reported download progress for `id`.
    #[must_use]
    pub fn progress(&self, id: &str) -> Option<f64> {
        self.registry.progress(id)
    }

    /// Lists installed add-ons with a valid manifest, sorted by ID.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceItem> {
        self.installed.list()
    }

    /// Returns the installed manifest for `id`.
    #[must_use]
    pub fn installed_item(&self, id: &str) -> Option<ResourceItem> {
        self.installed.get(id)
    }

    /// Returns true if an install directory for `id` exists.
    #[must_use]
    pub fn is_installed(&self, id: &str) -> bool {
        self.installed.is_installed(id)
    }

    /// Deletes the add-on `id`.
    ///
    /// Holds the transfer slot for `id` while deleting, so it neither races
    /// nor is raced by an install of the same add-on.
    pub async fn uninstall(&self, id: &str) -> Result<(), AddonError> {
        validate_id(id)?;
        let Some(ticket) = self.registry.try_begin(id) else {
            warn!("[ADDON-MANAGER] Refusing to uninstall '{}' during a transfer", id);
            return Err(AddonError::Busy(id.to_string()));
        };

        let installed = self.installed.clone();
        let target = id.to_string();
        let result = tokio::task::spawn_blocking(move || installed.remove(&target)).await;
        self.registry.release(&ticket);

        result?
    }

    /// Deletes leftover files from interrupted downloads.
    ///
    /// Does nothing while any transfer is running.
    pub fn sweep_staging_area(&self) -> io::Result<usize> {
        if !self.registry.is_empty() {
            info!("[ADDON-MANAGER] Transfers running, skipping staging sweep");
            return Ok(0);
        }
        self.pipeline.sweep_staging()
    }
}
