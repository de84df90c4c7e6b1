// # Tracking Store Trait
//
// Defines the interface for persistent tracking state.
//
// ## Purpose
//
// The store owns every persisted `Tracking`. The engine holds a transient
// copy while diffing and hands the updated snapshot back through `save`.
//
// ## Implementations
//
// - In-memory: `MemoryTrackingStore`
// - JSON file: `FileTrackingStore`

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::Tracking;

/// Trait for tracking store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
/// Writes must not interleave: a `save` either lands completely or not at all.
///
/// # Uniqueness
///
/// A user has at most one tracking per tracking number. `save` is an upsert
/// keyed on `(user_id, tracking_number)`:
///
/// - unknown key, `tracking.id == 0`: insert, assign an id
/// - known key, `tracking.id == 0` (a fresh track request): replace the
///   display name only, keep the stored snapshot
/// - known key, matching id: replace snapshot, `last_polled_at` and display name
/// - any other assigned id: the row was deleted (or deleted and re-tracked)
///   since it was read; fail with `Error::TrackingNotFound`, store untouched
///
/// Listings return trackings in ascending id order.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Insert or update a tracking
    ///
    /// # Returns
    ///
    /// - `Ok(Tracking)`: The stored tracking, with its id
    /// - `Err(Error::TrackingNotFound)`: The row this copy was read from is gone
    /// - `Err(Error)`: Storage error
    async fn save(&self, tracking: &Tracking) -> Result<Tracking, crate::Error>;

    /// Get one user's tracking for a number
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Tracking))`: Found
    /// - `Ok(None)`: The user does not track this number
    /// - `Err(Error)`: Storage error
    async fn get(&self, user_id: i64, tracking_number: &str)
    -> Result<Option<Tracking>, crate::Error>;

    /// List all trackings of a user
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Tracking>, crate::Error>;

    /// List trackings never polled or last polled strictly before `cutoff`
    async fn list_due_for_poll(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Tracking>, crate::Error>;

    /// Delete a user's tracking
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Deleted (or didn't exist)
    /// - `Err(Error)`: Storage error
    async fn delete(&self, user_id: i64, tracking_number: &str) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing tracking stores from configuration
#[async_trait]
pub trait TrackingStoreFactory: Send + Sync {
    /// Create a TrackingStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::StoreConfig,
    ) -> Result<Box<dyn TrackingStore>, crate::Error>;
}
