//! Embedding model inference.
//!
//! BERT sentence encoder (all-MiniLM-L6-v2) running on Candle.

use super::config::MiniLmConfig;
use super::tokenizer::TokenizedQuery;
use super::traits::Embedder;
use crate::error::EmbeddingError;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tracing::info;

/// MiniLM sentence embedding model.
///
/// # Architecture
///
/// - Hidden size: 384
/// - Layers: 6
/// - Attention heads: 12
/// - Pooling: mean over the attention mask
/// - Normalization: L2 (unit vector)
///
/// # Examples
///
/// ```ignore
/// let model = MiniLmEmbedder::from_bytes(
///     std::fs::read("model.safetensors")?,
///     std::fs::read("config.json")?,
/// )?;
/// let tokens = TokenizedQuery {
///     ids: vec![101, 2054, 2003, 1037, 3231, 102],
///     attention_mask: vec![1; 6],
/// };
/// let embedding = model.embed_tokens(tokens)?;
/// assert_eq!(embedding.len(), 384);
/// ```
pub struct MiniLmEmbedder {
    model: BertModel,
    config: MiniLmConfig,
    device: Device,
}

impl MiniLmEmbedder {
    /// Creates a new model from safetensors weights and HuggingFace
    /// `config.json` bytes.
    ///
    /// # Errors
    ///
    /// Returns `EmbeddingError::ModelLoad` if initialization fails.
    pub fn from_bytes(model_bytes: Vec<u8>, config_bytes: Vec<u8>) -> Result<Self, EmbeddingError> {
        let config = MiniLmConfig::from_hf_config(&config_bytes)?;
        info!("Loading embedding model '{}'", config.model_id);
        info!(
            "Model bytes length: {} bytes ({:.2}MB)",
            model_bytes.len(),
            model_bytes.len() as f64 / 1_000_000.0
        );

        let bert_config: BertConfig = serde_json::from_slice(&config_bytes)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Invalid BERT config: {}", e)))?;

        let device = Self::select_device();
        let model = Self::create_model(model_bytes, &bert_config, &device)?;

        Ok(Self {
            model,
            config,
            device,
        })
    }

    /// Returns a reference to the config.
    pub fn config(&self) -> &MiniLmConfig {
        &self.config
    }

    /// Selects the best available compute device.
    pub fn select_device() -> Device {
        if let Ok(cuda_device) = Device::new_cuda(0) {
            info!("Using CUDA GPU");
            return cuda_device;
        }

        if let Ok(metal_device) = Device::new_metal(0) {
            info!("Using Metal GPU");
            return metal_device;
        }

        info!("Using CPU");
        Device::Cpu
    }

    fn create_model(
        model_bytes: Vec<u8>,
        bert_config: &BertConfig,
        device: &Device,
    ) -> Result<BertModel, EmbeddingError> {
        // Safetensors files start with an 8-byte header length
        if model_bytes.len() < 8 {
            return Err(EmbeddingError::ModelLoad(
                "Model file too small".to_string(),
            ));
        }

        let vb = VarBuilder::from_buffered_safetensors(model_bytes, DType::F32, device).map_err(
            |e| EmbeddingError::ModelLoad(format!("Failed to create VarBuilder: {}", e)),
        )?;

        let model = BertModel::load(vb, bert_config)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to create BertModel: {}", e)))?;
        info!("BertModel created successfully");

        Ok(model)
    }

    /// Mean pooling over tokens, ignoring positions where the mask is 0.
    ///
    /// `[batch, seq_len, hidden]` with mask `[batch, seq_len]` -> `[batch, hidden]`
    fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> Result<Tensor, EmbeddingError> {
        let mask = attention_mask
            .to_dtype(DType::F32)
            .and_then(|m| m.unsqueeze(2))
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to expand mask: {}", e)))?;
        let summed = embeddings
            .broadcast_mul(&mask)
            .and_then(|t| t.sum(1))
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to sum: {}", e)))?;
        let counts = mask
            .sum(1)
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to count: {}", e)))?;
        summed
            .broadcast_div(&counts)
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to average: {}", e)))
    }

    /// Applies L2 normalization to create unit vectors.
    fn normalize_l2(v: &Tensor) -> Result<Tensor, EmbeddingError> {
        v.broadcast_div(
            &v.sqr()
                .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to square: {}", e)))?
                .sum_keepdim(1)
                .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to sum: {}", e)))?
                .sqrt()
                .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to sqrt: {}", e)))?,
        )
        .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to normalize: {}", e)))
    }
}

impl Embedder for MiniLmEmbedder {
    fn max_position_embeddings(&self) -> usize {
        self.config.max_position_embeddings
    }

    fn embedding_dim(&self) -> usize {
        self.config.hidden_size
    }

    fn embed_tokens(&self, tokens: TokenizedQuery) -> Result<Vec<f32>, EmbeddingError> {
        let TokenizedQuery { ids, attention_mask } = tokens;
        if ids.len() != attention_mask.len() {
            return Err(EmbeddingError::TensorCreation(format!(
                "{} token ids but {} mask entries",
                ids.len(),
                attention_mask.len()
            )));
        }
        let seq_len = ids.len();

        // [1, seq_len]
        let input_ids = Tensor::from_vec(ids, (1, seq_len), &self.device)
            .map_err(|e| EmbeddingError::TensorCreation(format!("Failed to create tensor: {}", e)))?;
        let token_type_ids = input_ids
            .zeros_like()
            .map_err(|e| EmbeddingError::TensorCreation(format!("Failed to create type ids: {}", e)))?;
        let attention_mask = Tensor::from_vec(attention_mask, (1, seq_len), &self.device)
            .map_err(|e| EmbeddingError::TensorCreation(format!("Failed to create mask: {}", e)))?;

        // [1, seq_len] -> [1, seq_len, hidden_size]
        let embeddings = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Forward pass failed: {}", e)))?;

        let pooled = Self::mean_pool(&embeddings, &attention_mask)?;

        let normalized = if self.config.normalize_embeddings {
            Self::normalize_l2(&pooled)?
        } else {
            pooled
        };

        normalized
            .squeeze(0)
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to squeeze: {}", e)))?
            .to_vec1::<f32>()
            .map_err(|e| EmbeddingError::InferenceFailed(format!("Failed to convert to vec: {}", e)))
    }
}
