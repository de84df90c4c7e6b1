//! Core traits for the parcels tracker
//!
//! This module defines the abstract interfaces the reconciliation engine
//! talks to.
//!
//! - [`TrackingProvider`]: Fetch the current tracking snapshot for a number
//! - [`TrackingStore`]: Persist trackings and answer "due for re-poll"

pub mod tracking_provider;
pub mod tracking_store;

pub use tracking_provider::{TrackingProvider, TrackingProviderFactory};
pub use tracking_store::{TrackingStore, TrackingStoreFactory};
