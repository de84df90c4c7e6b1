//! Reconciliation engine
//!
//! The ParcelService is responsible for:
//! - Accepting track requests and persisting new trackings
//! - Fetching snapshots via TrackingProvider
//! - Diffing them against the stored snapshot
//! - Persisting changed snapshots and publishing updates
//!
//! ## Architecture
//!
//! ```text
//!   track request          PollScheduler tick
//!        │                        │
//!        │ (supervised task)      │ (sequential, in store order)
//!        ▼                        ▼
//!  ┌──────────────────────────────────────┐
//!  │         ParcelService::reconcile     │
//!  └──────────────────────────────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌──────────────┐ ┌──────────┐ ┌──────────────┐
//! │ TrackingProv │ │   diff   │ │ TrackingStore│──▶ UpdateStream
//! │ (fetch)      │ │          │ │ (save)       │    (publish)
//! └──────────────┘ └──────────┘ └──────────────┘
//! ```
//!
//! ## Reconciliation Flow
//!
//! 1. Lock the tracking's key and re-read it from the store
//! 2. Fetch the current snapshot
//! 3. On failure: publish the error (track path) or log it (poll path)
//! 4. Diff against the stored snapshot; stop if nothing is new
//! 5. Save the new snapshot with `last_polled_at = now`
//! 6. Publish the update
//!
//! Persistence happens before publication. An unchanged snapshot leaves
//! `last_polled_at` untouched, so the tracking stays due and is fetched
//! again on every tick.

pub mod scheduler;
pub mod updates;

pub use scheduler::{PollScheduler, SchedulerState};
pub use updates::{TryRecvError, UpdateStream};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::diff::diff;
use crate::error::{Error, FetchError, Result};
use crate::model::{Tracking, TrackingKey, TrackingUpdate};
use crate::traits::{TrackingProvider, TrackingStore};
use updates::UpdatePublisher;

/// What to do with a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReporting {
    /// Publish the error as an update (user-initiated track)
    Downstream,
    /// Log only; the next poll retries (scheduled poll)
    LogOnly,
}

/// Result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Snapshot changed, was saved and the update published
    Updated,
    /// Nothing new; store untouched
    Unchanged,
    /// Provider fetch failed; store untouched
    FetchFailed,
    /// The tracking was deleted (or deleted and re-added) before the
    /// snapshot could be saved; nothing written or published
    Skipped,
}

/// Core tracking service
///
/// Cheap to clone; clones share the provider, store, update stream and
/// background task set.
///
/// ## Lifecycle
///
/// 1. Create with [`ParcelService::new()`], keep the returned [`UpdateStream`]
/// 2. Drive polling with a [`PollScheduler`]
/// 3. Call [`ParcelService::shutdown()`] to drain track reconciliations
#[derive(Clone)]
pub struct ParcelService {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Box<dyn TrackingProvider>,
    store: Box<dyn TrackingStore>,
    polling_interval: Duration,
    poll_age: TimeDelta,
    shutdown_grace: Duration,
    publisher: UpdatePublisher,
    locks: KeyedLocks,
    background: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for ParcelService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParcelService")
            .field("provider", &self.inner.provider.provider_name())
            .field("polling_interval", &self.inner.polling_interval)
            .finish_non_exhaustive()
    }
}

impl ParcelService {
    /// Create a new service
    ///
    /// # Returns
    ///
    /// A tuple of (service, update_stream). The stream has exactly one
    /// consumer; publishing waits while it is full.
    pub fn new(
        provider: Box<dyn TrackingProvider>,
        store: Box<dyn TrackingStore>,
        config: &PollerConfig,
    ) -> Result<(Self, UpdateStream)> {
        config.validate()?;

        let polling_interval = config.polling_interval();
        let poll_age = TimeDelta::from_std(polling_interval)
            .map_err(|_| Error::config("Polling interval out of range"))?;
        let (publisher, stream) = updates::channel(config.update_buffer);

        let service = Self {
            inner: Arc::new(Inner {
                provider,
                store,
                polling_interval,
                poll_age,
                shutdown_grace: config.shutdown_grace(),
                publisher,
                locks: KeyedLocks::default(),
                background: Mutex::new(JoinSet::new()),
            }),
        };

        Ok((service, stream))
    }

    /// Configured polling interval
    pub fn polling_interval(&self) -> Duration {
        self.inner.polling_interval
    }

    /// Start tracking a number for a user
    ///
    /// Re-tracking a number the user already tracks updates its display
    /// name and keeps the known snapshot. Once the tracking is saved, one
    /// reconciliation is started in the background with errors reported
    /// downstream; this call does not wait for it.
    pub async fn track(
        &self,
        user_id: i64,
        tracking_number: &str,
        display_name: Option<String>,
    ) -> Result<Tracking> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(Error::invalid_input("Tracking number cannot be empty"));
        }

        info!(user_id, tracking_number, "Got track request");

        let saved = self
            .inner
            .store
            .save(&Tracking::new(user_id, tracking_number, display_name))
            .await
            .inspect_err(|e| error!(user_id, tracking_number, error = %e, "Failed to add tracking"))?;

        info!(user_id, tracking_number, tracking_id = saved.id, "Tracking added");

        self.spawn_reconcile(saved.clone()).await;
        Ok(saved)
    }

    /// Get one of a user's trackings
    pub async fn get_tracking(&self, user_id: i64, tracking_number: &str) -> Result<Tracking> {
        self.inner
            .store
            .get(user_id, tracking_number)
            .await?
            .ok_or_else(|| Error::tracking_not_found(user_id, tracking_number))
    }

    /// List a user's trackings
    pub async fn list_trackings(&self, user_id: i64) -> Result<Vec<Tracking>> {
        self.inner.store.list_by_user(user_id).await
    }

    /// Stop tracking a number
    ///
    /// Does not wait for a run in flight for the tracking. That run finds
    /// the row gone when it saves and ends as [`ReconcileOutcome::Skipped`].
    pub async fn delete_tracking(&self, user_id: i64, tracking_number: &str) -> Result<()> {
        self.inner.store.delete(user_id, tracking_number).await?;
        info!(user_id, tracking_number, "Tracking deleted");
        Ok(())
    }

    /// Run one reconciliation for a tracking
    ///
    /// Runs for the same tracking are serialized. The stored tracking is
    /// re-read under that lock, so the diff always starts from the latest
    /// snapshot. The save carries the stored id, and the store refuses it
    /// once the row is deleted, so a tracking deleted mid-fetch is never
    /// written back or published.
    ///
    /// # Returns
    ///
    /// - `Ok(ReconcileOutcome)`: What happened
    /// - `Err(Error)`: The store failed; nothing was published
    pub async fn reconcile(
        &self,
        tracking: Tracking,
        reporting: ErrorReporting,
    ) -> Result<ReconcileOutcome> {
        let key = tracking.key();
        let _guard = self.inner.locks.lock(&key).await;

        let Some(mut tracking) = self
            .inner
            .store
            .get(key.user_id, &key.tracking_number)
            .await?
        else {
            debug!(%key, "Tracking no longer exists, skipping");
            return Ok(ReconcileOutcome::Skipped);
        };

        debug!(
            %key,
            tracking_id = tracking.id,
            provider = self.inner.provider.provider_name(),
            "Fetching tracking info"
        );

        let fetched = match self.inner.provider.fetch(&tracking.tracking_number).await {
            Ok(infos) => infos,
            Err(err) => {
                self.report_fetch_error(&tracking, err, reporting).await;
                return Ok(ReconcileOutcome::FetchFailed);
            }
        };

        let Some(delta) = diff(&tracking.tracking_infos, &fetched) else {
            debug!(%key, "Tracking info is up to date");
            return Ok(ReconcileOutcome::Unchanged);
        };

        debug!(
            %key,
            new_infos = delta.new_tracking_infos.len(),
            new_events = delta.new_tracking_events.len(),
            "Tracking info changed"
        );

        tracking.tracking_infos = fetched;
        tracking.last_polled_at = Some(Utc::now());

        let saved = match self.inner.store.save(&tracking).await {
            Ok(saved) => saved,
            Err(Error::TrackingNotFound { .. }) => {
                debug!(%key, tracking_id = tracking.id, "Tracking deleted during fetch, skipping");
                return Ok(ReconcileOutcome::Skipped);
            }
            Err(e) => {
                error!(%key, error = %e, "Failed to update tracking");
                return Err(e);
            }
        };

        info!(%key, tracking_id = saved.id, "Publishing tracking update");
        self.inner.publisher.publish(delta.into_update(&saved)).await;

        Ok(ReconcileOutcome::Updated)
    }

    /// Reconcile every tracking due for re-poll
    ///
    /// Trackings are processed one after another in store order, with
    /// errors logged only. Returns how many trackings were due.
    pub async fn poll_due(&self) -> Result<usize> {
        let cutoff = Utc::now() - self.inner.poll_age;
        let trackings = self.inner.store.list_due_for_poll(cutoff).await?;
        let count = trackings.len();

        info!(trackings_count = count, "Polling");

        for tracking in trackings {
            let key = tracking.key();
            match self.reconcile(tracking, ErrorReporting::LogOnly).await {
                Ok(outcome) => debug!(%key, ?outcome, "Reconciled"),
                Err(e) => error!(%key, error = %e, "Reconciliation failed"),
            }
        }

        Ok(count)
    }

    /// Wait for background track reconciliations, then abort stragglers
    ///
    /// Waits at most the configured shutdown grace period.
    pub async fn shutdown(&self) {
        let mut tasks = self.inner.background.lock().await;
        if tasks.is_empty() {
            return;
        }

        info!(pending = tasks.len(), "Waiting for background reconciliations");

        let drained = tokio::time::timeout(self.inner.shutdown_grace, async {
            while let Some(result) = tasks.join_next().await {
                log_task_result(result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(pending = tasks.len(), "Aborting background reconciliations");
            tasks.abort_all();
            while let Some(result) = tasks.join_next().await {
                log_task_result(result);
            }
        }
    }

    /// Number of background reconciliations not yet reaped
    pub async fn pending_background(&self) -> usize {
        let mut tasks = self.inner.background.lock().await;
        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }
        tasks.len()
    }

    /// Flush the store
    pub(crate) async fn flush_store(&self) -> Result<()> {
        self.inner.store.flush().await
    }

    async fn spawn_reconcile(&self, tracking: Tracking) {
        let service = self.clone();
        let mut tasks = self.inner.background.lock().await;

        while let Some(result) = tasks.try_join_next() {
            log_task_result(result);
        }

        tasks.spawn(async move {
            let key = tracking.key();
            if let Err(e) = service.reconcile(tracking, ErrorReporting::Downstream).await {
                error!(%key, error = %e, "Track reconciliation failed");
            }
        });
    }

    async fn report_fetch_error(
        &self,
        tracking: &Tracking,
        err: FetchError,
        reporting: ErrorReporting,
    ) {
        let key = tracking.key();
        match reporting {
            ErrorReporting::Downstream => {
                warn!(%key, error = %err, "Failed to fetch tracking info, reporting to user");
                self.inner
                    .publisher
                    .publish(TrackingUpdate::failed(tracking, err))
                    .await;
            }
            ErrorReporting::LogOnly if err.is_not_found() => {
                info!(%key, "Provider has no tracking info yet, will retry on next poll");
            }
            ErrorReporting::LogOnly => {
                warn!(%key, error = %err, "Failed to fetch tracking info, will retry on next poll");
            }
        }
    }
}

fn log_task_result(result: std::result::Result<(), JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(error = %e, "Background reconciliation panicked"),
        Err(e) => debug!(error = %e, "Background reconciliation cancelled"),
    }
}

/// Per-tracking async locks
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Debug, Default)]
struct KeyedLocks {
    locks: std::sync::Mutex<HashMap<TrackingKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &TrackingKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
