//! Plugin-based factory registry
//!
//! The registry lets tracking providers and stores be registered at
//! runtime and created from configuration, avoiding hardcoded if-else
//! chains in the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use parcels_core::registry::ProviderRegistry;
//! use parcels_core::config::{ProviderConfig, StoreConfig};
//!
//! let registry = ProviderRegistry::with_builtin_stores();
//! parcels_provider_http::register(&registry);
//!
//! let provider = registry.create_provider(&ProviderConfig::http("https://parcels.example.com"))?;
//! let store = registry.create_store(&StoreConfig::Memory).await?;
//! ```

use crate::config::{ProviderConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileTrackingStoreFactory, MemoryTrackingStoreFactory};
use crate::traits::{TrackingProvider, TrackingProviderFactory, TrackingStore, TrackingStoreFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of provider and store factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered tracking provider factories
    providers: RwLock<HashMap<String, Box<dyn TrackingProviderFactory>>>,

    /// Registered tracking store factories
    stores: RwLock<HashMap<String, Arc<dyn TrackingStoreFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("memory", Box::new(MemoryTrackingStoreFactory));
        registry.register_store("file", Box::new(FileTrackingStoreFactory));
        registry
    }

    /// Register a tracking provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "http")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(
        &self,
        name: impl Into<String>,
        factory: Box<dyn TrackingProviderFactory>,
    ) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), factory);
    }

    /// Register a tracking store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn TrackingStoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create a tracking provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TrackingProvider>)`: Created provider instance
    /// - `Err(Error)`: If the provider type is not registered or creation fails
    pub fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn TrackingProvider>> {
        let provider_type = config.type_name();
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(provider_type)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?;

        factory.create(config)
    }

    /// Create a tracking store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn TrackingStore>)`: Created store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Box<dyn TrackingStore>> {
        let store_type = config.type_name();

        // Release the lock before calling async create
        let factory = {
            let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?
        };

        factory.create(config).await
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockProviderFactory;

    impl TrackingProviderFactory for MockProviderFactory {
        fn create(&self, _config: &ProviderConfig) -> Result<Box<dyn TrackingProvider>> {
            Err(Error::config("Mock provider not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_provider("mock"));

        registry.register_provider("mock", Box::new(MockProviderFactory));

        assert!(registry.has_provider("mock"));
        assert!(registry.list_providers().contains(&"mock".to_string()));
    }

    #[test]
    fn test_unknown_provider_is_a_config_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create_provider(&ProviderConfig::http("http://localhost"))
            .err()
            .expect("no provider registered");
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_builtin_stores() {
        let registry = ProviderRegistry::with_builtin_stores();
        assert!(registry.has_store("memory"));
        assert!(registry.has_store("file"));

        let store = registry.create_store(&StoreConfig::Memory).await.unwrap();
        assert!(store.list_by_user(42).await.unwrap().is_empty());

        let custom = StoreConfig::Custom {
            factory: "redis".to_string(),
            config: serde_json::json!({}),
        };
        assert!(registry.create_store(&custom).await.is_err());
    }
}
