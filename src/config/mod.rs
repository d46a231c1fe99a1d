//! Configuration module for orbit-addons.
//!
//! Handles loading and parsing the .orbitrc configuration file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::addons::{
    AddonSettings, DEFAULT_CATALOG_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT,
    default_download_dir,
};
use crate::logging::LogConfig;

/// Default locale for catalog lookups.
pub const DEFAULT_LOCALE: &str = "en";

/// Default .orbitrc file content with all settings documented.
const DEFAULT_ORBITRC: &str = r#"# orbit-addons configuration file
# ================================
# Lines starting with '#' are comments.

# Add-ons
# -------
# Directory holding one subdirectory per installed add-on.
# addon_root = ~/.orbit/addons

# Directory used for downloads before they are unpacked.
# Defaults to a folder in the system temp directory.
# download_dir = /tmp/orbit-addons

# Seconds allowed to connect, and to wait between reads, before a download
# fails. There is no limit on total download time.
# connect_timeout = 30
# read_timeout = 60

# Catalog
# -------
# catalog_url = https://catalog.orbit-sim.org/api
# locale = en

# Logging Configuration
# ---------------------
# Logs are stored in ~/.orbit/logs/ with automatic cleanup.
#
# log_enabled = true       # Enable/disable file logging (true/false)
# log_level = info         # Log level: trace, debug, info, warn, error, off
# log_retention = 24       # Hours to keep log files (default: 24)
"#;

/// Returns the orbit data directory (~/.orbit).
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".orbit")
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory holding installed add-ons.
    pub addon_root: PathBuf,
    /// Directory for in-flight downloads.
    pub download_dir: PathBuf,
    /// Catalog endpoint.
    pub catalog_url: String,
    /// Locale sent with catalog lookups.
    pub locale: String,
    /// Download connection timeout.
    pub connect_timeout: Duration,
    /// Download idle timeout between reads.
    pub read_timeout: Duration,
    /// Path to config file.
    pub config_path: PathBuf,
    /// Logging configuration.
    pub log_config: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addon_root: data_dir().join("addons"),
            download_dir: default_download_dir(),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            config_path: Self::default_config_path(),
            log_config: LogConfig::default(),
        }
    }
}

impl Config {
    /// Returns the default config file path (~/.orbitrc).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".orbitrc")
    }

    /// Loads configuration from the default path, creating it if it doesn't exist.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load() -> io::Result<Self> {
        let path = Self::default_config_path();
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            Self::create_default_config(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut config = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        config.parse(&content);
        Ok(config)
    }

    /// Creates the default config file.
    fn create_default_config(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_ORBITRC.as_bytes())?;
        Ok(())
    }

    /// Parses the config file content.
    fn parse(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                // Remove inline comments
                let value = value.split('#').next().unwrap_or(value).trim();

                self.apply_setting(key, value);
            }
        }
    }

    /// Applies a single setting. Unknown keys and empty values are ignored.
    fn apply_setting(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }

        match key {
            "addon_root" | "addon_dir" => self.addon_root = expand_home(value),
            "download_dir" => self.download_dir = expand_home(value),
            "catalog_url" => self.catalog_url = value.trim_end_matches('/').to_string(),
            "locale" | "lang" => self.locale = value.to_string(),
            "connect_timeout" => {
                self.connect_timeout = parse_seconds(value).unwrap_or(DEFAULT_CONNECT_TIMEOUT);
            }
            "read_timeout" => {
                self.read_timeout = parse_seconds(value).unwrap_or(DEFAULT_READ_TIMEOUT);
            }
            "log_level" => self.log_config.level = LogConfig::parse_level(value),
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled =
                    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on");
            }
            "log_dir" => self.log_config.directory = expand_home(value),
            _ => {}
        }
    }

    /// Returns the add-on manager settings.
    #[must_use]
    pub fn addon_settings(&self) -> AddonSettings {
        AddonSettings::new(self.addon_root.clone())
            .with_download_dir(self.download_dir.clone())
            .with_timeouts(self.connect_timeout, self.read_timeout)
    }

    /// Reloads the configuration from disk.
    ///
    /// # Errors
    /// Returns error if config cannot be read.
    pub fn reload(&mut self) -> io::Result<()> {
        let path = self.config_path.clone();
        *self = Self::load_from(&path)?;
        Ok(())
    }
}

/// Parses a positive number of seconds.
fn parse_seconds(value: &str) -> Option<Duration> {
    value
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Expands a leading `~` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(value),
    }
}
