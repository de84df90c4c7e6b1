// # HTTP Tracking Provider
//
// This crate provides the HTTP client for the tracking-info service.
//
// ## Protocol
//
// ```text
// GET {base_url}/trackingInfo/?trackingNumber=<number>
//
// 200  JSON array of info blocks
// 404  the service knows nothing about the number (yet)
// ```
//
// ## Error Mapping
//
// | Outcome                      | FetchError        |
// |------------------------------|-------------------|
// | 404                          | `NotFound`        |
// | other non-2xx                | `Transient`       |
// | transport failure / timeout  | `Transient`       |
// | undecodable body             | `InvalidResponse` |
//
// Every fetch is a single request. Retrying is the poll scheduler's job.

use async_trait::async_trait;
use parcels_core::config::ProviderConfig;
use parcels_core::traits::{TrackingProvider, TrackingProviderFactory};
use parcels_core::{Error, FetchError, ProviderRegistry, Result, TrackingInfo};
use reqwest::StatusCode;
use std::time::Duration;

/// Default HTTP timeout for provider requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest body excerpt carried in error messages
const MAX_BODY_EXCERPT: usize = 256;

/// Client for the tracking-info service
#[derive(Debug, Clone)]
pub struct HttpTrackingProvider {
    /// Service base URL, without trailing slash
    base_url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpTrackingProvider {
    /// Create a provider with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a provider with an explicit request timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("Provider base URL cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { base_url, client })
    }

    /// Endpoint queried for every fetch
    fn endpoint(&self) -> String {
        format!("{}/trackingInfo/", self.base_url)
    }
}

#[async_trait]
impl TrackingProvider for HttpTrackingProvider {
    async fn fetch(&self, tracking_number: &str) -> std::result::Result<Vec<TrackingInfo>, FetchError> {
        tracing::debug!(tracking_number, "Requesting tracking info");

        let response = self
            .client
            .get(self.endpoint())
            .query(&[("trackingNumber", tracking_number)])
            .send()
            .await
            .map_err(|e| FetchError::transient(format!("Request failed: {}", e)))?;

        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::not_found(tracking_number));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transient(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(FetchError::transient(format!(
                "Tracking service error: {} - {}",
                status,
                excerpt(&body)
            )));
        }

        serde_json::from_slice::<Vec<TrackingInfo>>(&body).map_err(|e| {
            tracing::warn!(tracking_number, body = %excerpt(&body), "Failed to decode tracking info");
            FetchError::invalid_response(format!("{}: {}", e, excerpt(&body)))
        })
    }

    fn provider_name(&self) -> &'static str {
        "http"
    }
}

fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(MAX_BODY_EXCERPT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    }
}

/// Factory for creating HTTP tracking providers
pub struct HttpTrackingProviderFactory;

impl TrackingProviderFactory for HttpTrackingProviderFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn TrackingProvider>> {
        match config {
            ProviderConfig::Http {
                base_url,
                timeout_secs,
            } => {
                config.validate()?;
                let provider =
                    HttpTrackingProvider::with_timeout(base_url.clone(), Duration::from_secs(*timeout_secs))?;
                Ok(Box::new(provider))
            }
            _ => Err(Error::config("Invalid config for HTTP tracking provider")),
        }
    }
}

/// Register the HTTP provider with a registry
///
/// # Example
///
/// ```rust
/// use parcels_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::with_builtin_stores();
/// parcels_provider_http::register(&registry);
/// assert!(registry.has_provider("http"));
/// ```
pub fn register(registry: &ProviderRegistry) {
    registry.register_provider("http", Box::new(HttpTrackingProviderFactory));
}
