//! Traits for embedding operations.

use super::tokenizer::TokenizedQuery;
use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Trait for embedding model operations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the encoder moves them onto the
/// blocking thread pool behind an `Arc`.
pub trait Embedder: Send + Sync {
    /// Returns the maximum number of position embeddings (sequence length).
    fn max_position_embeddings(&self) -> usize;

    /// Returns the embedding dimension (vector size).
    fn embedding_dim(&self) -> usize;

    /// Embeds one tokenized query, pooling only over attended positions.
    ///
    /// # Returns
    ///
    /// Embedding vector of dimension `embedding_dim()`
    fn embed_tokens(&self, tokens: TokenizedQuery) -> Result<Vec<f32>, EmbeddingError>;
}

/// Deterministic text-to-vector encoder.
///
/// The same text always yields the same vector. This is the seam the
/// retriever depends on, so tests can substitute a cheap encoder.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Output vector length.
    fn dimension(&self) -> usize;

    /// Encodes one text into a vector of length `dimension()`.
    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
