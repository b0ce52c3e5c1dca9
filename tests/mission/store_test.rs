//! Mission store tests.

use sentryai::adapters::{MissionStore, StoreError};
use sentryai::budget::CognitiveBudget;
use sentryai::types::{MissionStatus, ScanOutput};

use super::support::{scan_input, temp_pool};

async fn store(dir: &tempfile::TempDir) -> MissionStore {
    MissionStore::new(temp_pool(dir).await)
        .await
        .expect("store")
}

#[tokio::test]
async fn created_missions_are_pending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let input = scan_input(false, CognitiveBudget::default());

    store.create(&input, "agent").await.expect("create");
    let record = store
        .get(&input.mission_id)
        .await
        .expect("get")
        .expect("row");

    assert_eq!(record.status, MissionStatus::Pending);
    assert_eq!(record.target, "www.example.com");
    assert_eq!(record.config.objective, "find XSS");
    assert!(!record.auto_pilot);
}

#[tokio::test]
async fn list_is_tenant_scoped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;

    let mut a = scan_input(false, CognitiveBudget::default());
    a.tenant_id = "tenant-a".to_owned();
    let mut b = scan_input(false, CognitiveBudget::default());
    b.tenant_id = "tenant-b".to_owned();

    store.create(&a, "agent").await.expect("create a");
    store.create(&b, "agent").await.expect("create b");

    let listed = store.list("tenant-a").await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, a.mission_id);
}

#[tokio::test]
async fn status_updates_until_terminal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let input = scan_input(true, CognitiveBudget::default());
    store.create(&input, "agent").await.expect("create");

    store
        .update_status(&input.mission_id, MissionStatus::Running)
        .await
        .expect("running");

    let output = ScanOutput {
        mission_id: input.mission_id.clone(),
        status: MissionStatus::Completed,
        findings: Vec::new(),
        steps_taken: 3,
        cost_usd: 0.01,
        runtime_seconds: 4.2,
        error_message: None,
    };
    store.record_result(&output).await.expect("result");

    // Terminal rows are immutable.
    let result = store
        .update_status(&input.mission_id, MissionStatus::Running)
        .await;
    assert!(matches!(result, Err(StoreError::Terminal { .. })));

    let record = store
        .get(&input.mission_id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(record.status, MissionStatus::Completed);
    assert_eq!(record.result.expect("result").steps_taken, 3);
}

#[tokio::test]
async fn non_terminal_scan_finds_unfinished_missions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;

    let running = scan_input(true, CognitiveBudget::default());
    store.create(&running, "agent").await.expect("create");
    store
        .update_status(&running.mission_id, MissionStatus::Running)
        .await
        .expect("running");

    let finished = scan_input(true, CognitiveBudget::default());
    store.create(&finished, "agent").await.expect("create");
    store
        .record_result(&ScanOutput {
            mission_id: finished.mission_id.clone(),
            status: MissionStatus::Killed,
            findings: Vec::new(),
            steps_taken: 0,
            cost_usd: 0.0,
            runtime_seconds: 0.1,
            error_message: Some("user cancel".to_owned()),
        })
        .await
        .expect("result");

    let unfinished = store.non_terminal().await.expect("scan");
    assert_eq!(unfinished.len(), 1);
    assert_eq!(unfinished[0].id, running.mission_id);
}

#[tokio::test]
async fn delete_removes_the_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store(&dir).await;
    let input = scan_input(false, CognitiveBudget::default());
    store.create(&input, "agent").await.expect("create");

    assert!(store.delete(&input.mission_id).await.expect("delete"));
    assert!(store
        .get(&input.mission_id)
        .await
        .expect("get")
        .is_none());
    assert!(!store.delete(&input.mission_id).await.expect("second delete"));
}
