//! Catalog client.
//!
//! Resolves an add-on ID to its [`ResourceItem`] through the catalog's HTTP
//! metadata endpoint.

use super::types::ResourceItem;
use serde::Deserialize;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Default catalog endpoint.
pub const DEFAULT_CATALOG_URL: &str = "https://catalog.orbit-sim.org/api";

/// Status code the catalog uses for success.
const STATUS_OK: i32 = 0;

/// Catalog error types.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The request could not be completed.
    #[error("Catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The catalog reported an error.
    #[error("Catalog error {status}: {}", .reason.as_deref().unwrap_or("no reason given"))]
    Server { status: i32, reason: Option<String> },

    /// The response did not have the expected shape.
    #[error("Could not decode catalog response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The catalog URL is malformed.
    #[error("Invalid catalog URL: {0}")]
    InvalidUrl(String),
}

/// Source of add-on metadata.
pub trait CatalogProvider: Send + Sync {
    /// Looks up a single add-on by ID for the given locale.
    fn fetch_item(
        &self,
        id: &str,
        locale: &str,
    ) -> impl Future<Output = Result<ResourceItem, CatalogError>> + Send;
}

/// Response envelope used by every catalog endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    status: i32,
    #[serde(default)]
    info: EnvelopeInfo,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopeInfo {
    /// JSON-encoded payload on success.
    #[serde(default)]
    detail: Option<String>,
    /// Error description on failure.
    #[serde(default)]
    reason: Option<String>,
}

/// Decodes an envelope body into its payload.
fn decode_envelope<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, CatalogError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    if envelope.status != STATUS_OK {
        return Err(CatalogError::Server {
            status: envelope.status,
            reason: envelope.info.reason,
        });
    }

    let detail = envelope.info.detail.unwrap_or_default();
    Ok(serde_json::from_str(&detail)?)
}

/// HTTP catalog client.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalog {
    /// Creates a client for the catalog at `base_url`.
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Returns the catalog base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn item_url(&self, id: &str, locale: &str) -> Result<reqwest::Url, CatalogError> {
        reqwest::Url::parse_with_params(
            &format!("{}/resource/item", self.base_url),
            &[("lang", locale), ("item", id)],
        )
        .map_err(|e| CatalogError::InvalidUrl(e.to_string()))
    }
}

impl CatalogProvider for HttpCatalog {
    async fn fetch_item(&self, id: &str, locale: &str) -> Result<ResourceItem, CatalogError> {
        let url = self.item_url(id, locale)?;
        debug!("[ADDON-CATALOG] GET {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;

        decode_envelope(&body).inspect_err(|e| {
            warn!("[ADDON-CATALOG] Lookup of '{}' failed: {}", id, e);
        })
    }
}
