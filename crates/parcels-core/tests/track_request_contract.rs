//! Architectural Contract Test: Track Requests
//!
//! This test verifies that:
//! - A track request returns once the tracking is saved, before any fetch
//! - The background run publishes news, fetch errors and not-found alike
//! - Re-tracking keeps the known snapshot and only renames
//! - Shutdown drains background runs within the grace period

mod common;

use common::*;
use parcels_core::traits::TrackingStore;
use parcels_core::{Error, FetchError, ParcelService, PollerConfig};
use std::time::Duration;

#[tokio::test]
async fn track_returns_before_fetch_completes() {
    let provider = ScriptedProvider::new().with_delay(Duration::from_millis(200));
    let store = CountingStore::new();
    let snapshot = vec![info("cainiao", vec![event(8, "accepted")])];
    provider.set("TRACK123", Ok(snapshot.clone()));

    let (service, mut updates) = service(&provider, &store);

    let tracking = tokio::time::timeout(
        Duration::from_millis(100),
        service.track(42, "TRACK123", None),
    )
    .await
    .expect("track must not wait for the fetch")
    .unwrap();

    assert_eq!(tracking.id, 1);
    assert!(tracking.tracking_infos.is_empty());
    assert_eq!(provider.call_count(), 0);

    let update = next_update(&mut updates).await;
    assert_eq!(update.user_id, 42);
    assert_eq!(update.tracking_number, "TRACK123");
    assert_eq!(update.new_tracking_infos, snapshot);
}

#[tokio::test]
async fn fetch_error_on_track_is_reported_downstream() {
    let provider = ScriptedProvider::new();
    let store = CountingStore::new();
    provider.set("TRACK123", Err(FetchError::transient("connection reset")));

    let (service, mut updates) = service(&provider, &store);
    service
        .track(42, "TRACK123", Some("shoes".to_string()))
        .await
        .unwrap();

    let update = next_update(&mut updates).await;
    assert_eq!(update.error, Some(FetchError::transient("connection reset")));
    assert_eq!(update.display_name.as_deref(), Some("shoes"));
    assert!(!update.has_news());

    service.shutdown().await;
    let stored = store.get(42, "TRACK123").await.unwrap().unwrap();
    assert!(stored.last_polled_at.is_none());
    assert_eq!(store.save_count(), 1, "only the track request itself is saved");
}

#[tokio::test]
async fn unknown_number_is_reported_as_not_found() {
    let provider = ScriptedProvider::new();
    let store = CountingStore::new();

    let (service, mut updates) = service(&provider, &store);
    service.track(42, "NOPE000", None).await.unwrap();

    let update = next_update(&mut updates).await;
    let error = update.error.expect("not-found is reported on track");
    assert!(error.is_not_found());

    // The tracking stays, so a later poll can pick it up
    assert!(service.get_tracking(42, "NOPE000").await.is_ok());
}

#[tokio::test]
async fn retrack_renames_and_keeps_snapshot() {
    let provider = ScriptedProvider::new();
    let store = CountingStore::new();
    let snapshot = vec![info("cainiao", vec![event(8, "accepted")])];
    provider.set("TRACK123", Ok(snapshot.clone()));

    let (service, mut updates) = service(&provider, &store);

    let first = service
        .track(42, "TRACK123", Some("shoes".to_string()))
        .await
        .unwrap();
    next_update(&mut updates).await;
    service.shutdown().await;

    let second = service
        .track(42, "TRACK123", Some("boots".to_string()))
        .await
        .unwrap();
    service.shutdown().await;

    assert_eq!(second.id, first.id);
    assert_eq!(second.display_name.as_deref(), Some("boots"));
    assert_eq!(second.tracking_infos, snapshot);

    // The re-track run found nothing new
    assert!(updates.try_recv().is_err());
    assert_eq!(service.list_trackings(42).await.unwrap().len(), 1);
}

#[tokio::test]
async fn tracking_number_is_trimmed_and_must_not_be_empty() {
    let provider = ScriptedProvider::new();
    let store = CountingStore::new();
    let (service, _updates) = service(&provider, &store);

    for blank in ["", "   "] {
        let result = service.track(42, blank, None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
    assert_eq!(store.save_count(), 0);

    let tracking = service.track(42, "  TRACK123\n", None).await.unwrap();
    assert_eq!(tracking.tracking_number, "TRACK123");
}

#[tokio::test]
async fn deleted_tracking_is_gone_for_its_user_only() {
    let provider = ScriptedProvider::new();
    let store = CountingStore::new();
    let (service, _updates) = service(&provider, &store);

    service.track(1, "TRACK123", None).await.unwrap();
    service.track(2, "TRACK123", None).await.unwrap();
    service.shutdown().await;

    service.delete_tracking(1, "TRACK123").await.unwrap();

    match service.get_tracking(1, "TRACK123").await {
        Err(Error::TrackingNotFound { user_id, tracking_number }) => {
            assert_eq!(user_id, 1);
            assert_eq!(tracking_number, "TRACK123");
        }
        other => panic!("expected TrackingNotFound, got {other:?}"),
    }
    assert!(service.get_tracking(2, "TRACK123").await.is_ok());

    // Deleting again is not an error
    service.delete_tracking(1, "TRACK123").await.unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_background_runs() {
    let provider = ScriptedProvider::new().with_delay(Duration::from_millis(100));
    let store = CountingStore::new();
    provider.set("TRACK123", Ok(vec![info("cainiao", vec![event(8, "accepted")])]));

    let (service, mut updates) = service(&provider, &store);
    service.track(42, "TRACK123", None).await.unwrap();
    assert_eq!(service.pending_background().await, 1);

    service.shutdown().await;

    assert_eq!(service.pending_background().await, 0);
    assert_eq!(provider.call_count(), 1);
    assert!(updates.try_recv().is_ok(), "drained run published its update");
}

#[tokio::test]
async fn shutdown_aborts_runs_past_the_grace_period() {
    let provider = ScriptedProvider::new().with_delay(Duration::from_secs(30));
    let store = CountingStore::new();
    let config = PollerConfig {
        shutdown_grace_secs: 0,
        ..test_config()
    };
    let (service, mut updates) =
        ParcelService::new(Box::new(provider.clone()), Box::new(store.clone()), &config).unwrap();

    service.track(42, "TRACK123", None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), service.shutdown())
        .await
        .expect("shutdown gives up after the grace period");

    assert_eq!(service.pending_background().await, 0);
    assert_eq!(provider.call_count(), 0);
    assert!(updates.try_recv().is_err());
}
