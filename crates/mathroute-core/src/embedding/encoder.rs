//! Async text encoder combining tokenizer and model.

use super::model::MiniLmEmbedder;
use super::tokenizer::TokenizerHandle;
use super::traits::{Embedder, TextEncoder};
use crate::config::MAX_QUERY_TOKENS;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Production [`TextEncoder`]: tokenizes and runs the model on tokio's
/// blocking pool so inference never stalls the async runtime.
#[derive(Clone)]
pub struct MiniLmEncoder {
    tokenizer: Arc<TokenizerHandle>,
    model: Arc<dyn Embedder>,
}

impl MiniLmEncoder {
    pub fn new(tokenizer: TokenizerHandle, model: Arc<dyn Embedder>) -> Self {
        Self {
            tokenizer: Arc::new(tokenizer),
            model,
        }
    }

    /// Loads the MiniLM model and tokenizer from raw file contents.
    pub fn from_bytes(
        model_bytes: Vec<u8>,
        config_bytes: Vec<u8>,
        tokenizer_bytes: Vec<u8>,
    ) -> Result<Self, EmbeddingError> {
        let model = MiniLmEmbedder::from_bytes(model_bytes, config_bytes)?;
        let max_tokens = MAX_QUERY_TOKENS.min(model.max_position_embeddings());
        let tokenizer = TokenizerHandle::from_bytes(tokenizer_bytes, max_tokens)?;
        Ok(Self::new(tokenizer, Arc::new(model)))
    }
}

#[async_trait]
impl TextEncoder for MiniLmEncoder {
    fn dimension(&self) -> usize {
        self.model.embedding_dim()
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokenizer = Arc::clone(&self.tokenizer);
        let model = Arc::clone(&self.model);
        let text = text.to_string();

        let embedding = tokio::task::spawn_blocking(move || {
            let tokens = tokenizer.tokenize(&text)?;
            debug!("Encoding {} tokens", tokens.len());
            model.embed_tokens(tokens)
        })
        .await
        .map_err(|e| EmbeddingError::InferenceFailed(format!("Embedding task failed: {}", e)))??;

        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::tokenizer::TokenizedQuery;
    use crate::test_utils::{padded_tokenizer_handle, test_tokenizer_handle};
    use std::sync::Mutex;

    /// Embeds token IDs as a histogram over a tiny vocabulary.
    struct CountingEmbedder;

    impl Embedder for CountingEmbedder {
        fn max_position_embeddings(&self) -> usize {
            16
        }

        fn embedding_dim(&self) -> usize {
            5
        }

        fn embed_tokens(&self, tokens: TokenizedQuery) -> Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; 5];
            for (id, mask) in tokens.ids.iter().zip(&tokens.attention_mask) {
                v[*id as usize] += *mask as f32;
            }
            Ok(v)
        }
    }

    /// Remembers every tokenized query it is asked to embed.
    #[derive(Default)]
    struct RecordingEmbedder {
        seen: Mutex<Vec<TokenizedQuery>>,
    }

    impl Embedder for RecordingEmbedder {
        fn max_position_embeddings(&self) -> usize {
            512
        }

        fn embedding_dim(&self) -> usize {
            1
        }

        fn embed_tokens(&self, tokens: TokenizedQuery) -> Result<Vec<f32>, EmbeddingError> {
            let len = tokens.len() as f32;
            self.seen.lock().unwrap().push(tokens);
            Ok(vec![len])
        }
    }

    #[tokio::test]
    async fn test_encode_runs_tokenizer_and_model() {
        let encoder = MiniLmEncoder::new(test_tokenizer_handle(16), Arc::new(CountingEmbedder));
        assert_eq!(encoder.dimension(), 5);

        let v = encoder.encode("what is two plus two").await.unwrap();
        assert_eq!(v, vec![0.0, 1.0, 1.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_encode_is_deterministic() {
        let encoder = MiniLmEncoder::new(test_tokenizer_handle(16), Arc::new(CountingEmbedder));
        let a = encoder.encode("two plus two").await.unwrap();
        let b = encoder.encode("two plus two").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_encode_propagates_tokenizer_errors() {
        let encoder = MiniLmEncoder::new(test_tokenizer_handle(16), Arc::new(CountingEmbedder));
        let result = encoder.encode("").await;
        assert!(matches!(result, Err(EmbeddingError::TokenizationFailed(_))));
    }

    #[tokio::test]
    async fn test_encode_sends_only_real_tokens_to_model() {
        let model = Arc::new(RecordingEmbedder::default());
        let encoder = MiniLmEncoder::new(padded_tokenizer_handle(128), model.clone());

        encoder.encode("two plus two").await.unwrap();

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].ids, vec![3, 4, 3]);
        assert_eq!(seen[0].attention_mask, vec![1, 1, 1]);
    }
}
