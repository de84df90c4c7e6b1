// # Memory Tracking Store
//
// In-memory implementation of TrackingStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for short-lived deployments.
//
// ## Crash Behavior
//
// - All trackings are lost on restart/crash
// - Users must re-issue their track requests

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::TrackingTable;
use crate::Error;
use crate::config::StoreConfig;
use crate::model::Tracking;
use crate::traits::tracking_store::{TrackingStore, TrackingStoreFactory};

/// In-memory tracking store implementation
///
/// Trackings live in a table protected by a RwLock. Each write holds the
/// write half only for the duration of one upsert or delete.
///
/// # Example
///
/// ```rust,no_run
/// use parcels_core::model::Tracking;
/// use parcels_core::state::MemoryTrackingStore;
/// use parcels_core::traits::TrackingStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryTrackingStore::new();
///
///     let saved = store.save(&Tracking::new(42, "TRACK123", None)).await?;
///     assert_eq!(saved.id, 1);
///
///     let found = store.get(42, "TRACK123").await?;
///     assert_eq!(found, Some(saved));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackingStore {
    inner: Arc<RwLock<TrackingTable>>,
}

impl MemoryTrackingStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of trackings in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.len() == 0
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn save(&self, tracking: &Tracking) -> Result<Tracking, Error> {
        let mut guard = self.inner.write().await;
        guard.upsert(tracking)
    }

    async fn get(&self, user_id: i64, tracking_number: &str) -> Result<Option<Tracking>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(user_id, tracking_number).cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Tracking>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.by_user(user_id))
    }

    async fn list_due_for_poll(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tracking>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.due(cutoff))
    }

    async fn delete(&self, user_id: i64, tracking_number: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(user_id, tracking_number);
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for [`MemoryTrackingStore`]
pub struct MemoryTrackingStoreFactory;

#[async_trait]
impl TrackingStoreFactory for MemoryTrackingStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn TrackingStore>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryTrackingStore::new())),
            _ => Err(Error::config("Invalid config for memory tracking store")),
        }
    }
}
