//! # Mathroute Core
//!
//! Answer-routing engine for a retrieval-augmented mathematics tutor.
//!
//! Given a natural-language math question, the [`router::MathRouter`] decides
//! where the explanation's context comes from: similar solved problems in a
//! vector knowledge base, an external computational-answer service, or the
//! generation model's own knowledge. The [`service::TutorService`] wraps the
//! router and persists every interaction together with user feedback.
//!
//! ## Modules
//!
//! - [`guardrail`] - Denylist check run before any retrieval or generation
//! - [`embedding`] - Sentence embedding (MiniLM via Candle) behind [`embedding::TextEncoder`]
//! - [`index`] - Vector index clients (Qdrant, in-process HNSW)
//! - [`retriever`] - Similarity search with score-threshold filtering
//! - [`lookup`] - External computational-answer client (WolframAlpha)
//! - [`generation`] - Text generation client (Gemini)
//! - [`composer`] - Context formatting and the fixed instruction template
//! - [`router`] - The fallback chain KB → lookup → LLM-only
//! - [`storage`] - Conversation, feedback and intervention persistence
//! - [`service`] - Router + store, as consumed by a hosting process
//! - [`config`] - Constants and environment-driven [`config::Settings`]
//! - [`error`] - Error types shared across the crate

pub mod composer;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod guardrail;
pub mod index;
pub mod lookup;
pub mod retriever;
pub mod router;
pub mod service;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;
