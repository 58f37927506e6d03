//! Similarity retrieval over the knowledge base.
//!
//! Encodes the query, asks the vector index for nearest neighbours and keeps
//! only those at or above the score threshold. Index order is preserved.

use crate::embedding::TextEncoder;
use crate::error::SearchError;
use crate::index::{IndexHit, VectorIndex};
use crate::types::RetrievedMatch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Knowledge-base search as seen by the router.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns at most `top_k` matches with `score >= threshold`, best first.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedMatch>, SearchError>;
}

/// [`Retriever`] backed by a text encoder and a vector index.
pub struct SimilarityRetriever {
    encoder: Arc<dyn TextEncoder>,
    index: Arc<dyn VectorIndex>,
}

impl SimilarityRetriever {
    /// Creates the retriever after confirming the index is reachable.
    ///
    /// # Errors
    ///
    /// Fails if the collection metadata cannot be read. Callers treat this as
    /// a startup failure.
    pub async fn connect(
        encoder: Arc<dyn TextEncoder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self, SearchError> {
        let info = index.collection_info().await?;
        info!(
            "Connected to knowledge base ({} points, {}-d encoder)",
            info.point_count,
            encoder.dimension()
        );
        Ok(Self { encoder, index })
    }
}

#[async_trait]
impl Retriever for SimilarityRetriever {
    #[instrument(skip_all, fields(top_k = top_k, threshold = threshold))]
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RetrievedMatch>, SearchError> {
        if top_k == 0 {
            return Err(SearchError::InvalidQuery("top_k must be positive".to_string()));
        }

        let vector = self.encoder.encode(query).await?;
        let hits = self.index.search(&vector, top_k).await?;
        let candidates = hits.len();

        let matches: Vec<RetrievedMatch> = hits
            .into_iter()
            .filter(|hit| hit.score.unwrap_or(0.0) >= threshold)
            .map(hit_to_match)
            .collect();

        debug!(
            "Retained {} of {} candidates at threshold {}",
            matches.len(),
            candidates,
            threshold
        );
        Ok(matches)
    }
}

fn hit_to_match(hit: IndexHit) -> RetrievedMatch {
    let mut payload = hit.payload;
    RetrievedMatch {
        problem: take_field(&mut payload, "problem"),
        solution: take_field(&mut payload, "solution"),
        level: take_field(&mut payload, "level"),
        topic: take_field(&mut payload, "type"),
        score: hit.score.unwrap_or(0.0),
    }
}

fn take_field(payload: &mut HashMap<String, String>, key: &str) -> String {
    payload.remove(key).unwrap_or_default()
}
