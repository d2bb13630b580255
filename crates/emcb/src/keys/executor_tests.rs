// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;

use super::*;
use crate::test_support::MemoryApi;

fn scope() -> CredentialScope {
    CredentialScope::organization("org-1")
}

fn provision(device: &str, key_type: KeyType, priority: Priority, evict: Option<&str>) -> RotationAction {
    RotationAction::Provision {
        device_id: device.into(),
        key_type,
        priority,
        evict: evict.map(String::from),
    }
}

#[tokio::test]
async fn provision_creates_evicts_then_assigns() {
    let api = Arc::new(MemoryApi::new().with_devices(&["d1"]));
    api.add_key("old", "unicast", TimeDelta::hours(1), Some("d1"));
    let executor = ActionExecutor::new(api.clone(), scope());

    let report = executor
        .execute(vec![provision("d1", KeyType::Unicast, Priority::Secondary, Some("old"))])
        .await;

    assert_eq!((report.planned, report.succeeded, report.failed), (1, 1, 0));
    assert_eq!(report.outcomes[0].result, Ok(Some("new-1".into())));
    assert_eq!(api.calls(), vec!["create unicast", "delete old", "assign d1"]);
    assert_eq!(api.assignments(), vec![("new-1".into(), Priority::Secondary, "d1".into())]);
    assert!(api.keys().iter().all(|k| k.id != "old"));
}

#[tokio::test]
async fn orphan_deletion_reports_no_created_key() {
    let api = Arc::new(MemoryApi::new());
    api.add_key("o1", "broadcast", TimeDelta::days(3), None);
    let executor = ActionExecutor::new(api.clone(), scope());

    let report = executor.execute(vec![RotationAction::DeleteOrphan { key_id: "o1".into() }]).await;

    assert_eq!(report.outcomes[0].result, Ok(None));
    assert!(api.keys().is_empty());
}

#[tokio::test]
async fn one_failure_does_not_stop_siblings() {
    let api = Arc::new(MemoryApi::new().with_devices(&["d1", "d2"]));
    api.fail("assign", "d1", ApiError::Status { status: 500, message: "boom".into() });
    let executor = ActionExecutor::new(api.clone(), scope());

    let report = executor
        .execute(vec![
            provision("d1", KeyType::Broadcast, Priority::Primary, None),
            provision("d2", KeyType::Broadcast, Priority::Primary, None),
        ])
        .await;

    assert_eq!((report.planned, report.succeeded, report.failed), (2, 1, 1));
    let failed = &report.outcomes[0];
    assert!(!failed.is_success());
    assert_eq!(
        failed.result.as_ref().err().map(|e| e.step),
        Some("assign"),
    );
    assert!(report.outcomes[1].is_success());
    // The key created for d1 stays behind unassigned, to be cleaned up next pass.
    let orphans: Vec<_> = api.keys().into_iter().filter(|k| k.device_ids.is_empty()).collect();
    assert_eq!(orphans.len(), 1);
}

#[tokio::test]
async fn failed_create_skips_eviction() {
    let api = Arc::new(MemoryApi::new().with_devices(&["d1"]));
    api.add_key("old", "broadcast", TimeDelta::hours(1), Some("d1"));
    api.fail("create", "broadcast", ApiError::RateLimited);
    let executor = ActionExecutor::new(api.clone(), scope());

    let report = executor
        .execute(vec![provision("d1", KeyType::Broadcast, Priority::Primary, Some("old"))])
        .await;

    assert_eq!(
        report.outcomes[0].result,
        Err(ActionError { step: "create", source: ApiError::RateLimited })
    );
    assert_eq!(api.calls(), vec!["create broadcast"]);
    assert!(api.keys().iter().any(|k| k.id == "old"));
}

#[tokio::test(start_paused = true)]
async fn actions_run_concurrently() {
    let latency = Duration::from_secs(1);
    let api = Arc::new(MemoryApi::new().with_devices(&["d1", "d2", "d3"]).with_latency(latency));
    let executor = ActionExecutor::new(api.clone(), scope());
    let actions = ["d1", "d2", "d3"]
        .into_iter()
        .map(|d| provision(d, KeyType::Unicast, Priority::Primary, None))
        .collect();

    let start = tokio::time::Instant::now();
    let report = executor.execute(actions).await;

    assert_eq!(report.succeeded, 3);
    // Each unit is create + assign; run serially this would take six latencies.
    assert_eq!(start.elapsed(), latency * 2);
}

#[tokio::test]
async fn empty_plan_is_an_empty_report() {
    let executor = ActionExecutor::new(Arc::new(MemoryApi::new()), scope());
    let report = executor.execute(Vec::new()).await;
    assert_eq!((report.planned, report.succeeded, report.failed), (0, 0, 0));
    assert!(report.outcomes.is_empty());
}
