//! Sentence embedding for knowledge-base queries.
//!
//! The knowledge base was indexed with all-MiniLM-L6-v2, so queries must be
//! encoded with the same model: BERT forward pass, mean pooling over the
//! attention mask, L2 normalization, 384 dimensions.
//!
//! ## Core Traits
//!
//! - [`Embedder`] - Synchronous model inference over token IDs
//! - [`TextEncoder`] - Async text-to-vector interface consumed by the retriever
//!
//! ## Implementations
//!
//! - [`MiniLmConfig`] - Configuration for the MiniLM sentence encoder
//! - [`MiniLmEmbedder`] - BERT inference using Candle
//! - [`TokenizerHandle`] - Unpadded, truncating HuggingFace tokenizer
//! - [`TokenizedQuery`] - Token ids plus attention mask for one query
//! - [`MiniLmEncoder`] - Tokenizer + model, run on the blocking pool
//!
//! ## Example
//!
//! ```ignore
//! use mathroute_core::embedding::{MiniLmEncoder, TextEncoder};
//!
//! let encoder = MiniLmEncoder::from_bytes(
//!     std::fs::read("model.safetensors")?,
//!     std::fs::read("config.json")?,
//!     std::fs::read("tokenizer.json")?,
//! )?;
//! let vector = encoder.encode("What is the quadratic formula?").await?;
//! assert_eq!(vector.len(), 384);
//! ```

mod traits;

pub mod config;
pub mod encoder;
pub mod model;
pub mod tokenizer;

pub use traits::{Embedder, TextEncoder};

pub use config::MiniLmConfig;
pub use encoder::MiniLmEncoder;
pub use model::MiniLmEmbedder;
pub use tokenizer::{TokenizedQuery, TokenizerHandle};
