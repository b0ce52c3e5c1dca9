//! Adapter surface: the narrow contracts the core consumes from external
//! storage systems (mission rows, property graph, vector search).

pub mod graph;
pub mod store;
pub mod vector;

pub use graph::{AssetEdge, AssetNode, GraphStore, InMemoryGraph};
pub use store::{MissionRecord, MissionStore, StoreError};
pub use vector::{InMemoryVectorStore, VectorDocument, VectorHit, VectorStore};
