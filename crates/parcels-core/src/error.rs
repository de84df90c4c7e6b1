//! Error types for the parcels tracker
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for parcels operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a tracking provider for a single fetch
///
/// This is `Clone` because it travels inside [`TrackingUpdate`](crate::TrackingUpdate)
/// values handed to the notification consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The provider does not know this tracking number (yet)
    #[error("no tracking info found for {0}")]
    NotFound(String),

    /// Network or provider failure; the next poll retries
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// The provider answered with a body we could not decode
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Create a "not found at provider" error
    pub fn not_found(tracking_number: impl Into<String>) -> Self {
        Self::NotFound(tracking_number.into())
    }

    /// Create a transient fetch error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Whether the provider simply has no data for the parcel yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Core error type for the parcels tracker
#[derive(Error, Debug)]
pub enum Error {
    /// Tracking store failure (unavailable, constraint violation, I/O)
    #[error("Tracking store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The user does not track this number
    #[error("Tracking {tracking_number} not found for user {user_id}")]
    TrackingNotFound {
        /// Owner of the requested tracking
        user_id: i64,
        /// Requested tracking number
        tracking_number: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filesystem errors while loading the store file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a tracking store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a "tracking not found" error
    pub fn tracking_not_found(user_id: i64, tracking_number: impl Into<String>) -> Self {
        Self::TrackingNotFound {
            user_id,
            tracking_number: tracking_number.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
