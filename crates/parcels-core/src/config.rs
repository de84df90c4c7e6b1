//! Configuration types for the parcels tracker
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParcelsConfig {
    /// Tracking provider configuration
    pub provider: ProviderConfig,

    /// Tracking store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Polling and update-stream settings
    #[serde(default)]
    pub poller: PollerConfig,
}

impl ParcelsConfig {
    /// Create a new configuration with defaults
    pub fn new(provider: ProviderConfig, store: StoreConfig) -> Self {
        Self {
            provider,
            store,
            poller: PollerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.store.validate()?;
        self.poller.validate()?;
        Ok(())
    }
}

/// Tracking provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// HTTP tracking-info service
    Http {
        /// Base URL of the service (e.g. "https://parcels.example.com")
        base_url: String,
        /// Request timeout in seconds
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Create an HTTP provider configuration with the default timeout
    pub fn http(base_url: impl Into<String>) -> Self {
        ProviderConfig::Http {
            base_url: base_url.into(),
            timeout_secs: default_http_timeout_secs(),
        }
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Http {
                base_url,
                timeout_secs,
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Provider base URL cannot be empty"));
                }
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Provider base URL must use http or https: {}",
                        base_url
                    )));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Provider timeout must be > 0"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Http { .. } => "http",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::http(String::new())
    }
}

/// Tracking store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            StoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Polling and update-stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Interval between poll ticks, and the age after which a tracking is
    /// due for re-poll (in seconds)
    #[serde(default = "default_polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// Capacity of the update stream
    ///
    /// Publishing waits while the stream is full; updates are never dropped.
    /// Keep this small: it bounds how far the engine runs ahead of a slow
    /// consumer.
    #[serde(default = "default_update_buffer")]
    pub update_buffer: usize,

    /// How long shutdown waits for in-flight track reconciliations
    /// before aborting them (in seconds)
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl PollerConfig {
    /// Validate the poller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.polling_interval_secs == 0 {
            return Err(crate::Error::config("Polling interval must be > 0"));
        }
        if self.update_buffer == 0 {
            return Err(crate::Error::config("Update buffer must be > 0"));
        }
        Ok(())
    }

    /// Polling interval as a Duration
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    /// Shutdown grace period as a Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            polling_interval_secs: default_polling_interval_secs(),
            update_buffer: default_update_buffer(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_polling_interval_secs() -> u64 {
    600
}

fn default_update_buffer() -> usize {
    1
}

fn default_shutdown_grace_secs() -> u64 {
    10
}
