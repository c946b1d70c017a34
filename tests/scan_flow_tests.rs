// SPDX-License-Identifier: MIT

//! Scan state machine tests: check-in, check-out, and every rejection
//! path, driven directly against `ScanProcessor` with a scripted
//! location provider.

use chrono::Utc;
use gymgate::config::Config;
use gymgate::db::{MemoryStore, Store};
use gymgate::models::{AttendanceRecord, AttendanceStatus};
use gymgate::services::scan::{RejectReason, ScanOutcome, ScanProcessor};
use gymgate::services::{ProximityVerifier, VerificationStage};
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::ScriptedLocationProvider;

const MEMBER: &str = "member-1";
const VALID_CODE: &str = "GYMGATE-TEST-CODE";

// Test gym is at (0, 0) with a 100 m radius; at the equator 0.0005
// degrees of longitude is about 55.6 m and 0.01 degrees about 1112 m.
const IN_ZONE_LON: f64 = 0.0005;
const OUT_OF_ZONE_LON: f64 = 0.01;

fn scan_engine(store: Arc<MemoryStore>) -> ScanProcessor {
    let config = Config::test_default();
    let db: Arc<dyn Store> = store;
    ScanProcessor::new(
        db,
        ProximityVerifier::new(config.zone.clone()),
        config.access_code,
    )
}

async fn scan(
    processor: &ScanProcessor,
    provider: &ScriptedLocationProvider,
    code: &str,
) -> (ScanOutcome, Vec<VerificationStage>) {
    let mut stages = Vec::new();
    let outcome = processor
        .process_scan(MEMBER, code, provider, &mut |stage| stages.push(stage))
        .await;
    (outcome, stages)
}

#[tokio::test]
async fn test_invalid_code_rejected_before_location() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    let (outcome, stages) = scan(&processor, &provider, "WRONG-CODE").await;

    match outcome {
        ScanOutcome::Rejected { reason } => {
            assert!(matches!(reason, RejectReason::InvalidCode));
            assert!(reason.retryable());
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    // Rejected before verification ran and before any store write
    assert!(stages.is_empty());
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_code_is_trimmed_before_comparison() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    let padded = format!("  {}\n", VALID_CODE);
    let (outcome, _) = scan(&processor, &provider, &padded).await;

    assert!(matches!(outcome, ScanOutcome::CheckedIn { .. }));
}

#[tokio::test]
async fn test_check_in_opens_session() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    let (outcome, stages) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::CheckedIn {
        record,
        verification,
    } = outcome
    else {
        panic!("expected check-in");
    };

    assert_eq!(record.member_id, MEMBER);
    assert_eq!(record.status, AttendanceStatus::Inside);
    assert!(record.exit_time.is_none());

    let verification = verification.expect("verification present on check-in");
    assert!(verification.verified);
    assert_eq!(verification.distance_meters, 55.6);

    assert_eq!(
        stages,
        vec![
            VerificationStage::RequestingPermission,
            VerificationStage::AcquiringSignal,
            VerificationStage::CalculatingDistance,
            VerificationStage::VerifyingZone,
        ]
    );

    let stored = store.get_session(&record.id).expect("record persisted");
    assert_eq!(stored.status, AttendanceStatus::Inside);
}

#[tokio::test]
async fn test_check_out_completes_open_session() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    let entry = Utc::now() - chrono::Duration::minutes(90);
    let open = AttendanceRecord::check_in(MEMBER, entry);
    let open_id = open.id.clone();
    store.put_session(open);

    let (outcome, _) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::CheckedOut {
        record, duration, ..
    } = outcome
    else {
        panic!("expected check-out");
    };

    assert_eq!(record.id, open_id);
    assert_eq!(record.status, AttendanceStatus::Completed);
    assert!(record.exit_time.is_some());
    assert_eq!(duration.num_minutes(), 90);

    // Closed in place: no second record was created
    assert_eq!(store.session_count(), 1);
    let stored = store.get_session(&open_id).unwrap();
    assert_eq!(stored.status, AttendanceStatus::Completed);
}

#[tokio::test]
async fn test_out_of_zone_reports_distance_and_radius() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, OUT_OF_ZONE_LON);

    let (outcome, stages) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::Rejected { reason } = outcome else {
        panic!("expected rejection");
    };
    let RejectReason::OutOfZone {
        distance_meters,
        radius_meters,
    } = &reason
    else {
        panic!("expected out-of-zone, got {:?}", reason);
    };

    assert!((distance_meters - 1111.9).abs() < 1.0);
    assert_eq!(*radius_meters, 100.0);
    assert!(reason.message().contains("100"));
    assert!(reason.retryable());

    // Verification ran to completion even though the result is negative
    assert_eq!(stages.len(), 4);
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_permission_denied_rejection() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.deny(MEMBER);

    let (outcome, stages) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::Rejected { reason } = outcome else {
        panic!("expected rejection");
    };
    assert!(matches!(reason, RejectReason::PermissionDenied));
    assert_eq!(stages, vec![VerificationStage::RequestingPermission]);
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_signal_timeout_rejection() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    // Test config's GPS timeout is 250 ms; this fix never arrives in time
    provider.grant_with_delay(MEMBER, 0.0, IN_ZONE_LON, Duration::from_secs(2));

    let (outcome, _) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::Rejected { reason } = outcome else {
        panic!("expected rejection");
    };
    assert!(matches!(reason, RejectReason::SignalTimeout));
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_location_unavailable_rejection() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant_without_fix(MEMBER);

    let (outcome, _) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::Rejected { reason } = outcome else {
        panic!("expected rejection");
    };
    assert!(matches!(reason, RejectReason::LocationUnavailable { .. }));
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_persistence_failure_is_retryable() {
    let store = Arc::new(MemoryStore::new());
    let processor = scan_engine(store.clone());
    let provider = ScriptedLocationProvider::new();
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    store.set_fail_writes(true);
    let (outcome, _) = scan(&processor, &provider, VALID_CODE).await;

    let ScanOutcome::Rejected { reason } = outcome else {
        panic!("expected rejection");
    };
    assert!(matches!(reason, RejectReason::PersistenceFailure { .. }));
    assert!(reason.retryable());
    assert_eq!(store.session_count(), 0);

    // Store recovers; the retry succeeds without any cleanup
    store.set_fail_writes(false);
    let (outcome, _) = scan(&processor, &provider, VALID_CODE).await;
    assert!(matches!(outcome, ScanOutcome::CheckedIn { .. }));
    assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn test_reentrant_scan_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(scan_engine(store.clone()));
    let provider = Arc::new(ScriptedLocationProvider::new());
    // Slow enough that the second scan arrives mid-flight, fast enough
    // to beat the 250 ms GPS timeout
    provider.grant_with_delay(MEMBER, 0.0, IN_ZONE_LON, Duration::from_millis(150));

    let first = {
        let processor = processor.clone();
        let provider = provider.clone();
        tokio::spawn(async move {
            processor
                .process_scan(MEMBER, VALID_CODE, provider.as_ref(), &mut |_| {})
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    let second = processor
        .process_scan(MEMBER, VALID_CODE, provider.as_ref(), &mut |_| {})
        .await;
    assert!(matches!(second, ScanOutcome::Ignored));

    let first = first.await.expect("first scan task");
    assert!(matches!(first, ScanOutcome::CheckedIn { .. }));
    assert_eq!(store.session_count(), 1);

    // The guard is released once the first scan finishes
    let (third, _) = scan(&processor, &provider, VALID_CODE).await;
    assert!(matches!(third, ScanOutcome::CheckedOut { .. }));
}

#[tokio::test]
async fn test_scan_with_observer_runs_on_spawned_task() {
    let store = Arc::new(MemoryStore::new());
    let processor = Arc::new(scan_engine(store.clone()));
    let provider = Arc::new(ScriptedLocationProvider::new());
    provider.grant(MEMBER, 0.0, IN_ZONE_LON);

    // Scans run on executor worker threads; the future must be able to
    // move between threads together with its stage observer.
    let task = tokio::spawn({
        let processor = processor.clone();
        let provider = provider.clone();
        async move {
            let mut stages = Vec::new();
            let outcome = processor
                .process_scan(MEMBER, VALID_CODE, provider.as_ref(), &mut |stage| {
                    stages.push(stage)
                })
                .await;
            (outcome, stages)
        }
    });

    let (outcome, stages) = task.await.expect("scan task");
    assert!(matches!(outcome, ScanOutcome::CheckedIn { .. }));
    assert_eq!(stages.len(), 4);
}

#[tokio::test]
async fn test_dev_bypass_skips_verification() {
    let mut config = Config::test_default();
    config.zone.dev_bypass = true;

    let store = Arc::new(MemoryStore::new());
    let db: Arc<dyn Store> = store.clone();
    let processor = ScanProcessor::new(
        db,
        ProximityVerifier::new(config.zone.clone()),
        config.access_code,
    );
    // Device never reported anything; bypass must not care
    let provider = ScriptedLocationProvider::new();

    let mut stages = Vec::new();
    let outcome = processor
        .process_scan(MEMBER, VALID_CODE, &provider, &mut |stage| {
            stages.push(stage)
        })
        .await;

    let ScanOutcome::CheckedIn { verification, .. } = outcome else {
        panic!("expected check-in under bypass");
    };
    let verification = verification.unwrap();
    assert!(verification.verified);
    assert_eq!(verification.distance_meters, 0.0);
    assert!(stages.is_empty());
    assert_eq!(store.session_count(), 1);
}
