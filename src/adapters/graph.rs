//! Project-scoped property-graph contract.
//!
//! The core only upserts assets and findings edges; every operation takes
//! structured, parameterized arguments — no statement text is ever built
//! from tenant input.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A graph node upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetNode {
    /// Project scope the node belongs to.
    pub project_id: String,
    /// Node kind, e.g. `domain`, `host`, `service`.
    pub kind: String,
    /// Stable node key within the project (e.g. the hostname).
    pub key: String,
    /// Arbitrary properties.
    pub properties: serde_json::Value,
}

/// An edge between two asset nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEdge {
    /// Project scope.
    pub project_id: String,
    /// Source node key.
    pub from_key: String,
    /// Destination node key.
    pub to_key: String,
    /// Relationship label, e.g. `resolves_to`, `has_finding`.
    pub relation: String,
}

/// Property-graph operations the core depends on.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update a node.
    async fn upsert_asset(&self, node: AssetNode) -> anyhow::Result<()>;

    /// Insert an edge between two existing nodes.
    async fn upsert_edge(&self, edge: AssetEdge) -> anyhow::Result<()>;

    /// Nodes currently stored for a project.
    async fn assets(&self, project_id: &str) -> anyhow::Result<Vec<AssetNode>>;
}

/// In-memory graph store (tests, single-node deployments).
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    nodes: RwLock<HashMap<(String, String), AssetNode>>,
    edges: RwLock<Vec<AssetEdge>>,
}

impl InMemoryGraph {
    /// Edges currently stored for a project.
    pub fn edges(&self, project_id: &str) -> Vec<AssetEdge> {
        self.edges
            .read()
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| e.project_id == project_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn upsert_asset(&self, node: AssetNode) -> anyhow::Result<()> {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert((node.project_id.clone(), node.key.clone()), node);
        }
        Ok(())
    }

    async fn upsert_edge(&self, edge: AssetEdge) -> anyhow::Result<()> {
        if let Ok(mut edges) = self.edges.write() {
            edges.push(edge);
        }
        Ok(())
    }

    async fn assets(&self, project_id: &str) -> anyhow::Result<Vec<AssetNode>> {
        Ok(self
            .nodes
            .read()
            .map(|nodes| {
                nodes
                    .values()
                    .filter(|n| n.project_id == project_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
