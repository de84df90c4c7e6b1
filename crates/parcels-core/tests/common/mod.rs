//! Test doubles and common utilities for the engine contract tests
//!
//! The doubles share their counters through `Arc`s, so a test keeps a
//! clone while the service owns the boxed original.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parcels_core::engine::UpdateStream;
use parcels_core::model::{Tracking, TrackingEvent, TrackingInfo, TrackingUpdate};
use parcels_core::traits::{TrackingProvider, TrackingStore};
use parcels_core::{Error, FetchError, MemoryTrackingStore, ParcelService, PollerConfig, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type FetchResult = std::result::Result<Vec<TrackingInfo>, FetchError>;

/// A provider answering from per-number scripts
///
/// Each fetch pops the next scripted answer; the last answer repeats.
/// Unscripted numbers answer `NotFound`.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, VecDeque<FetchResult>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch (simulates a slow provider)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an answer for a tracking number
    pub fn script(&self, tracking_number: &str, answer: FetchResult) {
        self.scripts
            .lock()
            .unwrap()
            .entry(tracking_number.to_string())
            .or_default()
            .push_back(answer);
    }

    /// Replace every queued answer for a tracking number
    pub fn set(&self, tracking_number: &str, answer: FetchResult) {
        self.scripts
            .lock()
            .unwrap()
            .insert(tracking_number.to_string(), VecDeque::from([answer]));
    }

    /// Number of fetches performed
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Tracking numbers fetched, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingProvider for ScriptedProvider {
    async fn fetch(&self, tracking_number: &str) -> FetchResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(tracking_number.to_string());

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(tracking_number) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(FetchError::not_found(tracking_number))),
            None => Err(FetchError::not_found(tracking_number)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// A memory store that counts calls and can be told to fail writes
#[derive(Clone, Default)]
pub struct CountingStore {
    inner: MemoryTrackingStore,
    save_count: Arc<AtomicUsize>,
    flush_count: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Insert a tracking directly, bypassing the counters
    pub async fn seed(&self, tracking: Tracking) -> Tracking {
        self.inner.save(&tracking).await.unwrap()
    }
}

#[async_trait]
impl TrackingStore for CountingStore {
    async fn save(&self, tracking: &Tracking) -> Result<Tracking> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::store("disk full"));
        }
        self.inner.save(tracking).await
    }

    async fn get(&self, user_id: i64, tracking_number: &str) -> Result<Option<Tracking>> {
        self.inner.get(user_id, tracking_number).await
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Tracking>> {
        self.inner.list_by_user(user_id).await
    }

    async fn list_due_for_poll(&self, cutoff: DateTime<Utc>) -> Result<Vec<Tracking>> {
        self.inner.list_due_for_poll(cutoff).await
    }

    async fn delete(&self, user_id: i64, tracking_number: &str) -> Result<()> {
        self.inner.delete(user_id, tracking_number).await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
}

pub fn event(hour: u32, status: &str) -> TrackingEvent {
    TrackingEvent::new(at(hour), status, format!("{status} at {hour}:00"))
}

pub fn info(api_name: &str, events: Vec<TrackingEvent>) -> TrackingInfo {
    TrackingInfo::new(api_name, events)
}

/// Poller settings for tests: one-second due age, roomy update buffer
pub fn test_config() -> PollerConfig {
    PollerConfig {
        polling_interval_secs: 1,
        update_buffer: 8,
        shutdown_grace_secs: 1,
    }
}

/// Build a service over clones of the given doubles
pub fn service(provider: &ScriptedProvider, store: &CountingStore) -> (ParcelService, UpdateStream) {
    ParcelService::new(
        Box::new(provider.clone()),
        Box::new(store.clone()),
        &test_config(),
    )
    .expect("service construction succeeds")
}

/// Receive the next update or fail after a second
pub async fn next_update(stream: &mut UpdateStream) -> TrackingUpdate {
    tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("update arrives in time")
        .expect("stream open")
}

/// Assert no update arrives within a short window
pub async fn assert_no_update(stream: &mut UpdateStream) {
    let received = tokio::time::timeout(Duration::from_millis(100), stream.recv()).await;
    assert!(
        received.is_err(),
        "expected no update, got {:?}",
        received.ok().flatten()
    );
}
