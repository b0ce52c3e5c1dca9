//! Activity journal durability tests.

use sentryai::mission::ActivityJournal;

use super::support::temp_pool;

#[tokio::test]
async fn lookup_misses_before_record() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = ActivityJournal::new(temp_pool(&dir).await)
        .await
        .expect("journal");

    let result = journal.lookup("m-1", 1).await.expect("lookup");
    assert!(result.is_none());
}

#[tokio::test]
async fn recorded_results_replay() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = ActivityJournal::new(temp_pool(&dir).await)
        .await
        .expect("journal");

    let value = serde_json::json!({ "plan_id": "p-1", "cost_usd": 0.02 });
    journal
        .record("m-1", 1, "generate_plan", &value)
        .await
        .expect("record");

    let replayed = journal.lookup("m-1", 1).await.expect("lookup");
    assert_eq!(replayed, Some(value));
}

#[tokio::test]
async fn recording_is_idempotent_per_sequence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = ActivityJournal::new(temp_pool(&dir).await)
        .await
        .expect("journal");

    let first = serde_json::json!({ "value": 1 });
    let second = serde_json::json!({ "value": 2 });
    journal.record("m-1", 1, "a", &first).await.expect("record");
    // A second write for the same (mission, seq) is ignored.
    journal.record("m-1", 1, "a", &second).await.expect("record");

    let replayed = journal.lookup("m-1", 1).await.expect("lookup");
    assert_eq!(replayed, Some(first));
}

#[tokio::test]
async fn missions_do_not_share_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = ActivityJournal::new(temp_pool(&dir).await)
        .await
        .expect("journal");

    let value = serde_json::json!(true);
    journal.record("m-1", 1, "emit", &value).await.expect("record");

    assert!(journal.lookup("m-2", 1).await.expect("lookup").is_none());
}

#[tokio::test]
async fn clear_removes_a_missions_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = ActivityJournal::new(temp_pool(&dir).await)
        .await
        .expect("journal");

    let value = serde_json::json!(true);
    journal.record("m-1", 1, "emit", &value).await.expect("record");
    journal.record("m-1", 2, "emit", &value).await.expect("record");
    journal.record("m-2", 1, "emit", &value).await.expect("record");

    journal.clear("m-1").await.expect("clear");

    assert!(journal.lookup("m-1", 1).await.expect("lookup").is_none());
    assert!(journal.lookup("m-2", 1).await.expect("lookup").is_some());
}
