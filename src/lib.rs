//! orbit-addons
//!
//! Add-on resource manager: downloads, installs, tracks and removes optional
//! content packages for an application.
//!
//! # Architecture
//!
//! - **Addons Module**: install pipeline, transfer registry, events and enumeration
//! - **Config Module**: `.orbitrc` loading
//! - **Logging Module**: file logging with retention cleanup
//!
//! # Usage
//!
//! ```no_run
//! use orbit_addons::{AddonManager, Config};
//!
//! let config = Config::load().expect("Failed to load config");
//! let manager = AddonManager::new(config.addon_settings());
//! for item in manager.list() {
//!     println!("{} - {}", item.id, item.name);
//! }
//! ```

// Clippy configuration - allow common patterns
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]

pub mod addons;
pub mod config;
pub mod logging;

// Re-export main types
pub use addons::{
    AddonError, AddonEvent, AddonManager, AddonSettings, InstallOutcome, InstallRequest,
    ResourceItem,
};
pub use config::Config;
pub use logging::LogConfig;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
