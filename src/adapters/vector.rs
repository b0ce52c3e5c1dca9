//! Tenant-scoped vector search contract.
//!
//! The core consumes only this narrow interface; production deployments
//! bind it to a real vector database, tests and single-node deployments
//! use the in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored document with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    /// Document identifier.
    pub id: String,
    /// Raw text content.
    pub content: String,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// Arbitrary metadata.
    pub metadata: serde_json::Value,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorHit {
    /// The matched document.
    pub document: VectorDocument,
    /// Cosine similarity in [-1, 1].
    pub score: f32,
}

/// Vector store operations the core depends on.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a document in a tenant's collection.
    async fn upsert(&self, tenant_id: &str, document: VectorDocument) -> anyhow::Result<()>;

    /// Return the `limit` most similar documents for a tenant.
    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> anyhow::Result<Vec<VectorHit>>;
}

/// In-memory vector store with brute-force cosine search.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorDocument>>>,
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, tenant_id: &str, document: VectorDocument) -> anyhow::Result<()> {
        if let Ok(mut collections) = self.collections.write() {
            let docs = collections.entry(tenant_id.to_owned()).or_default();
            docs.retain(|d| d.id != document.id);
            docs.push(document);
        }
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> anyhow::Result<Vec<VectorHit>> {
        let mut hits: Vec<VectorHit> = self
            .collections
            .read()
            .map(|collections| {
                collections
                    .get(tenant_id)
                    .map(|docs| {
                        docs.iter()
                            .map(|d| VectorHit {
                                score: cosine_similarity(&d.embedding, embedding),
                                document: d.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Cosine similarity of two vectors; zero for mismatched or empty inputs.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
