//! Vector index clients.
//!
//! The retriever talks to a nearest-neighbour index through [`VectorIndex`].
//! Two backends are provided:
//!
//! - [`QdrantIndex`] - remote Qdrant collection (feature `qdrant`)
//! - [`HnswIndex`] - in-process HNSW graph for local use and tests

use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod hnsw;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use self::hnsw::HnswIndex;
#[cfg(feature = "qdrant")]
pub use self::qdrant::QdrantIndex;

/// One nearest-neighbour hit as returned by the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Point identifier, stringified
    pub id: String,
    /// Cosine similarity; `None` if the backend omitted it
    pub score: Option<f32>,
    /// Payload fields flattened to strings
    pub payload: HashMap<String, String>,
}

/// Summary of the indexed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub point_count: u64,
}

/// Nearest-neighbour search over the knowledge-base vectors.
///
/// Hits are returned best first. Implementations must be safe to share
/// across concurrent queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` nearest neighbours of `vector`.
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>, SearchError>;

    /// Reports collection metadata. Used as a reachability check at startup.
    async fn collection_info(&self) -> Result<CollectionInfo, SearchError>;
}

/// Validates that an embedding has the expected dimension.
pub fn validate_dimension(expected: usize, actual: usize) -> Result<(), SearchError> {
    if expected != actual {
        return Err(SearchError::DimensionMismatch { expected, actual });
    }
    Ok(())
}
