//! Configuration for the sentence encoder.

use crate::config::{EMBEDDING_DIM, EMBEDDING_MODEL_ID};
use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};

/// Configuration for the MiniLM sentence encoder.
///
/// Architecture details (layers, heads, vocabulary) come from the model's own
/// `config.json`; this struct only carries what the pooling step and callers
/// need to know.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MiniLmConfig {
    /// Model identifier (e.g., "sentence-transformers/all-MiniLM-L6-v2")
    pub model_id: String,

    /// Whether to apply L2 normalization to embeddings
    pub normalize_embeddings: bool,

    /// Hidden dimension size (embedding output dimension)
    pub hidden_size: usize,

    /// Maximum position embeddings (sequence length limit)
    pub max_position_embeddings: usize,
}

impl Default for MiniLmConfig {
    fn default() -> Self {
        Self {
            model_id: EMBEDDING_MODEL_ID.to_string(),
            normalize_embeddings: true,
            hidden_size: EMBEDDING_DIM,
            max_position_embeddings: 512,
        }
    }
}

/// Subset of a HuggingFace BERT `config.json`.
#[derive(Deserialize)]
struct HfConfigDims {
    hidden_size: usize,
    max_position_embeddings: usize,
}

impl MiniLmConfig {
    /// Reads dimensions from HuggingFace `config.json` bytes.
    pub fn from_hf_config(config_bytes: &[u8]) -> Result<Self, EmbeddingError> {
        let dims: HfConfigDims = serde_json::from_slice(config_bytes)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Invalid config.json: {}", e)))?;
        Ok(Self {
            hidden_size: dims.hidden_size,
            max_position_embeddings: dims.max_position_embeddings,
            ..Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MiniLmConfig::default();
        assert_eq!(config.hidden_size, 384);
        assert_eq!(config.max_position_embeddings, 512);
        assert!(config.normalize_embeddings);
    }

    #[test]
    fn test_from_hf_config() {
        let json = br#"{"hidden_size": 384, "max_position_embeddings": 512, "num_hidden_layers": 6}"#;
        let config = MiniLmConfig::from_hf_config(json).unwrap();
        assert_eq!(config, MiniLmConfig::default());
    }

    #[test]
    fn test_from_hf_config_rejects_garbage() {
        let result = MiniLmConfig::from_hf_config(b"not json");
        assert!(matches!(result, Err(EmbeddingError::ModelLoad(_))));
    }
}
