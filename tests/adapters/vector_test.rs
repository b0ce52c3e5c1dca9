//! Vector store contract tests.

use sentryai::adapters::{InMemoryVectorStore, VectorDocument, VectorStore};

fn doc(id: &str, embedding: &[f32]) -> VectorDocument {
    VectorDocument {
        id: id.to_owned(),
        content: format!("document {id}"),
        embedding: embedding.to_vec(),
        metadata: serde_json::json!({}),
    }
}

#[tokio::test]
async fn search_orders_by_similarity() {
    let store = InMemoryVectorStore::default();
    store
        .upsert("t-1", doc("exact", &[1.0, 0.0]))
        .await
        .expect("upsert");
    store
        .upsert("t-1", doc("close", &[0.9, 0.1]))
        .await
        .expect("upsert");
    store
        .upsert("t-1", doc("orthogonal", &[0.0, 1.0]))
        .await
        .expect("upsert");

    let hits = store.search("t-1", &[1.0, 0.0], 10).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
    assert_eq!(ids, vec!["exact", "close", "orthogonal"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits[0].score > hits[1].score);
    assert!(hits[1].score > hits[2].score);
}

#[tokio::test]
async fn search_truncates_to_the_limit() {
    let store = InMemoryVectorStore::default();
    for i in 0..5 {
        store
            .upsert("t-1", doc(&format!("d{i}"), &[1.0, 0.0]))
            .await
            .expect("upsert");
    }

    let hits = store.search("t-1", &[1.0, 0.0], 2).await.expect("search");
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn mismatched_and_empty_vectors_score_zero() {
    let store = InMemoryVectorStore::default();
    store
        .upsert("t-1", doc("short", &[1.0]))
        .await
        .expect("upsert");
    store.upsert("t-1", doc("empty", &[])).await.expect("upsert");

    let hits = store.search("t-1", &[1.0, 0.0], 10).await.expect("search");
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score == 0.0));
}

#[tokio::test]
async fn zero_norm_query_scores_zero() {
    let store = InMemoryVectorStore::default();
    store
        .upsert("t-1", doc("d", &[1.0, 0.0]))
        .await
        .expect("upsert");

    let hits = store.search("t-1", &[0.0, 0.0], 10).await.expect("search");
    assert_eq!(hits[0].score, 0.0);
}

#[tokio::test]
async fn upsert_replaces_by_document_id() {
    let store = InMemoryVectorStore::default();
    store
        .upsert("t-1", doc("d", &[1.0, 0.0]))
        .await
        .expect("upsert");
    store
        .upsert("t-1", doc("d", &[0.0, 1.0]))
        .await
        .expect("upsert");

    let hits = store.search("t-1", &[0.0, 1.0], 10).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn collections_are_tenant_scoped() {
    let store = InMemoryVectorStore::default();
    store
        .upsert("t-1", doc("d", &[1.0, 0.0]))
        .await
        .expect("upsert");

    let hits = store.search("t-2", &[1.0, 0.0], 10).await.expect("search");
    assert!(hits.is_empty());
}
