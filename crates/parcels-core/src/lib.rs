// # parcels-core
//
// Tracking-state reconciliation engine for the parcels tracker.
//
// ## Architecture Overview
//
// - **TrackingProvider**: Trait for fetching a parcel's current tracking snapshot
// - **TrackingStore**: Trait for persisting trackings (upsert, due-for-poll queries)
// - **diff**: Pure comparison of a stored snapshot against a fetched one
// - **ParcelService**: Fetch → diff → persist → publish, per tracking
// - **PollScheduler**: Recurring re-poll of overdue trackings
// - **UpdateStream**: Hand-off of tracking updates to the notification consumer
// - **ProviderRegistry**: Plugin-based registry for providers and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Provider I/O and storage sit behind traits
// 2. **Idempotent re-fetch**: Re-polling an unchanged parcel writes and publishes nothing
// 3. **No lost updates**: Publishing waits on the consumer rather than dropping
// 4. **Resilient polling**: Fetch and store failures during polling are logged, never fatal
// 5. **Library-First**: The daemon is a thin wiring layer over this crate

pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{ParcelsConfig, PollerConfig, ProviderConfig, StoreConfig};
pub use diff::{TrackingDelta, diff};
pub use engine::{ErrorReporting, ParcelService, PollScheduler, ReconcileOutcome, SchedulerState, TryRecvError, UpdateStream};
pub use error::{Error, FetchError, Result};
pub use model::{Tracking, TrackingEvent, TrackingInfo, TrackingKey, TrackingUpdate};
pub use registry::ProviderRegistry;
pub use state::{FileTrackingStore, MemoryTrackingStore};
pub use traits::{TrackingProvider, TrackingStore};
