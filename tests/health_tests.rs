// Health transition tests: status always follows the failure counter; tracker persistence

mod common;

use capacity_collector::health::HealthTracker;
use capacity_collector::models::*;
use capacity_collector::store::TenantStore;
use common::*;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// Status bands for the default thresholds, written out literally.
fn expected_status(consecutive_failures: u32) -> HealthStatus {
    match consecutive_failures {
        0..=2 => HealthStatus::Healthy,
        3..=4 => HealthStatus::Degraded,
        _ => HealthStatus::Critical,
    }
}

proptest! {
    #[test]
    fn status_follows_failure_bands_for_any_sequence(
        outcomes in prop::collection::vec(any::<bool>(), 0..60)
    ) {
        let thresholds = HealthThresholds::default();
        let now = chrono::Utc::now();
        let mut health = TenantHealth::default();
        let mut expected_failures = 0u32;
        for success in outcomes {
            let outcome = if success {
                expected_failures = 0;
                CollectionOutcome::Success
            } else {
                expected_failures += 1;
                CollectionOutcome::Failure(format!("failure {expected_failures}"))
            };
            health = health.apply(&outcome, &thresholds, now);
            prop_assert_eq!(health.consecutive_failures, expected_failures);
            prop_assert_eq!(health.status, expected_status(expected_failures));
            if success {
                prop_assert_eq!(health.status, HealthStatus::Healthy);
                prop_assert!(health.last_collection_error.is_none());
                prop_assert_eq!(health.last_successful_collection, Some(now));
            } else {
                let expected_error = format!("failure {expected_failures}");
                prop_assert_eq!(
                    health.last_collection_error.as_deref(),
                    Some(expected_error.as_str())
                );
            }
        }
    }

    #[test]
    fn one_success_resets_any_failure_streak(failures in 0u32..50) {
        let thresholds = HealthThresholds::default();
        let now = chrono::Utc::now();
        let mut health = TenantHealth::default();
        for i in 0..failures {
            health = health.apply(&CollectionOutcome::Failure(format!("f{i}")), &thresholds, now);
        }
        prop_assert_eq!(health.status, expected_status(failures));
        let recovered = health.apply(&CollectionOutcome::Success, &thresholds, now);
        prop_assert_eq!(recovered.status, HealthStatus::Healthy);
        prop_assert_eq!(recovered.consecutive_failures, 0);
    }
}

#[test]
fn band_edges_match_defaults() {
    let thresholds = HealthThresholds::default();
    for (failures, status) in [
        (0, HealthStatus::Healthy),
        (2, HealthStatus::Healthy),
        (3, HealthStatus::Degraded),
        (4, HealthStatus::Degraded),
        (5, HealthStatus::Critical),
        (40, HealthStatus::Critical),
    ] {
        assert_eq!(thresholds.status_for(failures), status, "{failures} failures");
    }
}

#[test]
fn failure_keeps_last_success_timestamp() {
    let thresholds = HealthThresholds::default();
    let t0 = chrono::Utc::now();
    let t1 = t0 + chrono::Duration::minutes(15);
    let healthy = TenantHealth::default().apply(&CollectionOutcome::Success, &thresholds, t0);
    let failed = healthy.apply(&CollectionOutcome::Failure("x".into()), &thresholds, t1);
    assert_eq!(failed.last_successful_collection, Some(t0));
}

#[test]
fn custom_thresholds_apply() {
    let thresholds = HealthThresholds {
        degraded_after: 1,
        critical_after: 2,
    };
    let now = chrono::Utc::now();
    let once = TenantHealth::default().apply(&CollectionOutcome::Failure("a".into()), &thresholds, now);
    assert_eq!(once.status, HealthStatus::Degraded);
    let twice = once.apply(&CollectionOutcome::Failure("b".into()), &thresholds, now);
    assert_eq!(twice.status, HealthStatus::Critical);
    assert_eq!(twice.last_collection_error.as_deref(), Some("b"));
}

#[test]
fn long_errors_are_truncated() {
    let long = "é".repeat(MAX_ERROR_CHARS + 250);
    let health = TenantHealth::default().apply(
        &CollectionOutcome::Failure(long),
        &HealthThresholds::default(),
        chrono::Utc::now(),
    );
    assert_eq!(
        health.last_collection_error.unwrap().chars().count(),
        MAX_ERROR_CHARS
    );
}

#[tokio::test]
async fn tracker_advances_from_stored_record() {
    let (_dir, store) = temp_store().await;
    let tenant = store.create_tenant(&new_tenant(0)).await.unwrap();
    let tracker = HealthTracker::new(store.clone(), HealthThresholds::default());

    // `tenant` is the stale enumerated copy; the counter must still advance.
    for _ in 0..3 {
        tracker
            .record(&tenant, &CollectionOutcome::Failure("boom".into()))
            .await;
    }
    let stored = store.get_tenant(tenant.id).await.unwrap().unwrap();
    assert_eq!(stored.health.consecutive_failures, 3);
    assert_eq!(stored.health.status, HealthStatus::Degraded);

    let next = tracker.record(&tenant, &CollectionOutcome::Success).await;
    assert_eq!(next.consecutive_failures, 0);
    let stored = store.get_tenant(tenant.id).await.unwrap().unwrap();
    assert_eq!(stored.health.status, HealthStatus::Healthy);
    assert_eq!(stored.health.consecutive_failures, 0);
    assert!(stored.health.last_collection_error.is_none());
    // Stored at millisecond precision.
    let stored_at = stored.health.last_successful_collection.unwrap();
    let computed_at = next.last_successful_collection.unwrap();
    assert_eq!(stored_at.timestamp_millis(), computed_at.timestamp_millis());
}

#[tokio::test]
async fn tracker_returns_computed_health_when_write_fails() {
    let (_dir, store) = temp_store().await;
    let tenant = store.create_tenant(&new_tenant(0)).await.unwrap();
    let mut counting = CountingTenants::new(store.clone());
    counting.fail_writes = true;
    let counting = Arc::new(counting);
    let tracker = HealthTracker::new(counting.clone(), HealthThresholds::default());

    let next = tracker
        .record(&tenant, &CollectionOutcome::Failure("boom".into()))
        .await;
    assert_eq!(next.consecutive_failures, 1);
    assert_eq!(counting.health_writes.load(Ordering::SeqCst), 1);
    let stored = store.get_tenant(tenant.id).await.unwrap().unwrap();
    assert_eq!(stored.health.consecutive_failures, 0);
}
