// # Tracking Provider Trait
//
// Defines the interface for fetching tracking snapshots from an external
// tracking-info service.
//
// ## Implementations
//
// - HTTP: `parcels-provider-http` crate
//
// ## Usage
//
// ```rust,ignore
// use parcels_core::TrackingProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* TrackingProvider implementation */;
//
//     let infos = provider.fetch("TRACK123").await?;
//     println!("{} provider(s) know this parcel", infos.len());
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::error::FetchError;
use crate::model::TrackingInfo;

/// Trait for tracking provider implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Single-shot
///
/// A fetch is one request. Providers do not retry, back off or cache:
/// the poll scheduler re-fetches every due tracking on its next tick,
/// which is the only retry policy in the system.
///
/// # Not found
///
/// A provider that does not know the number yet must return
/// [`FetchError::NotFound`] rather than an empty snapshot, so the
/// engine can tell "nothing yet" apart from a failure.
#[async_trait]
pub trait TrackingProvider: Send + Sync {
    /// Fetch the current snapshot for a tracking number
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<TrackingInfo>)`: One block per provider that reports the parcel
    /// - `Err(FetchError)`: The fetch failed
    async fn fetch(&self, tracking_number: &str) -> Result<Vec<TrackingInfo>, FetchError>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing tracking providers from configuration
pub trait TrackingProviderFactory: Send + Sync {
    /// Create a TrackingProvider instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn TrackingProvider>, crate::Error>;
}
