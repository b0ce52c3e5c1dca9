//! Graph store contract tests.

use sentryai::adapters::{AssetEdge, AssetNode, GraphStore, InMemoryGraph};

fn node(project_id: &str, kind: &str, key: &str) -> AssetNode {
    AssetNode {
        project_id: project_id.to_owned(),
        kind: kind.to_owned(),
        key: key.to_owned(),
        properties: serde_json::json!({}),
    }
}

#[tokio::test]
async fn assets_are_project_scoped() {
    let graph = InMemoryGraph::default();
    graph
        .upsert_asset(node("m-1", "host", "a.example.com"))
        .await
        .expect("upsert");
    graph
        .upsert_asset(node("m-2", "host", "b.example.com"))
        .await
        .expect("upsert");

    let assets = graph.assets("m-1").await.expect("assets");
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].key, "a.example.com");
}

#[tokio::test]
async fn upsert_replaces_by_project_and_key() {
    let graph = InMemoryGraph::default();
    graph
        .upsert_asset(node("m-1", "host", "a.example.com"))
        .await
        .expect("upsert");

    let mut updated = node("m-1", "host", "a.example.com");
    updated.properties = serde_json::json!({ "alive": true });
    graph.upsert_asset(updated).await.expect("upsert");

    let assets = graph.assets("m-1").await.expect("assets");
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].properties["alive"], true);
}

#[tokio::test]
async fn edges_are_recorded_and_project_scoped() {
    let graph = InMemoryGraph::default();
    graph
        .upsert_asset(node("m-1", "host", "a.example.com"))
        .await
        .expect("upsert");
    graph
        .upsert_asset(node("m-1", "finding", "f-1"))
        .await
        .expect("upsert");
    graph
        .upsert_edge(AssetEdge {
            project_id: "m-1".to_owned(),
            from_key: "a.example.com".to_owned(),
            to_key: "f-1".to_owned(),
            relation: "has_finding".to_owned(),
        })
        .await
        .expect("edge");

    let edges = graph.edges("m-1");
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_key, "a.example.com");
    assert_eq!(edges[0].to_key, "f-1");
    assert_eq!(edges[0].relation, "has_finding");

    assert!(graph.edges("m-2").is_empty());
}
