//! Production configuration.
//!
//! Compile-time constants describing the reference deployment live at the top
//! of this module. Runtime options are collected into [`Settings`], which is
//! read from environment variables by the hosting process.
//!
//! # Usage
//!
//! ```
//! use mathroute_core::config::{Settings, DEFAULT_TOP_K, EMBEDDING_DIM};
//!
//! let settings = Settings::from_vars(|_| None);
//! assert_eq!(settings.top_k, DEFAULT_TOP_K);
//! let embedding = vec![0.0f32; EMBEDDING_DIM];
//! assert_eq!(embedding.len(), 384);
//! ```

use crate::error::ConfigError;
use crate::guardrail::DEFAULT_DENYLIST;
use serde::Serialize;
use std::time::Duration;

// =============================================================================
// Embedding Model Configuration
// =============================================================================

/// Embedding vector dimension (all-MiniLM-L6-v2 hidden size).
///
/// The knowledge-base collection is indexed with this model, so query
/// vectors must have exactly this length.
pub const EMBEDDING_DIM: usize = 384;

/// Model identifier of the sentence encoder used to build the knowledge base.
pub const EMBEDDING_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Maximum tokens fed to the encoder. Longer queries are truncated.
pub const MAX_QUERY_TOKENS: usize = 256;

// =============================================================================
// Routing Configuration
// =============================================================================

/// Default number of nearest neighbours requested from the index.
pub const DEFAULT_TOP_K: usize = 5;

/// Default minimum cosine similarity for a knowledge-base match to be kept.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;

/// Confidence reported when the answer context came from the external lookup.
///
/// Fixed midpoint; the lookup service gives no quality signal.
pub const WEB_SEARCH_CONFIDENCE: f32 = 0.5;

/// Confidence reported for blocked queries and LLM-only answers.
pub const NO_CONFIDENCE: f32 = 0.0;

/// Accepted query length in characters at the hosting surface.
pub const MIN_QUERY_CHARS: usize = 3;
pub const MAX_QUERY_CHARS: usize = 1000;

// =============================================================================
// External Services
// =============================================================================

/// Time bound on a single external lookup request.
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// WolframAlpha Short Answers endpoint.
pub const WOLFRAM_RESULT_URL: &str = "https://api.wolframalpha.com/v1/result";

/// Gemini REST endpoint root.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Sampling temperature for explanations.
pub const GENERATION_TEMPERATURE: f32 = 0.2;

/// Client-level timeout for the vector index service.
pub const INDEX_TIMEOUT: Duration = Duration::from_secs(120);

/// Client-level timeout for the generation service.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Feedback
// =============================================================================

/// A correction strictly longer than this is recorded as a human intervention.
pub const INTERVENTION_MIN_CORRECTION_CHARS: usize = 50;

/// Upper bounds on free-text feedback fields.
pub const MAX_CORRECTION_CHARS: usize = 5000;
pub const MAX_NOTES_CHARS: usize = 1000;

// =============================================================================
// Runtime Settings
// =============================================================================

const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_COLLECTION: &str = "math_knowledge_base";

/// Runtime settings for the tutor service.
///
/// Variable names follow the reference deployment (`TOP_K`, `QDRANT_URL`, ...)
/// so an existing `.env` keeps working. Credentials are skipped when the
/// settings are serialized for display.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Settings {
    /// Maximum candidates requested from the index (`TOP_K`)
    pub top_k: usize,
    /// Minimum retained similarity (`SCORE_THRESHOLD`)
    pub score_threshold: f32,
    /// Guardrail denylist (`MATHROUTE_GUARDRAIL_TERMS`, comma separated)
    pub guardrail_terms: Vec<String>,
    /// Generation credential (`GOOGLE_API_KEY`)
    #[serde(skip_serializing)]
    pub google_api_key: String,
    /// Generation model (`GEMINI_MODEL`)
    pub gemini_model: String,
    /// Vector index url (`QDRANT_URL`)
    pub qdrant_url: String,
    /// Vector index credential (`QDRANT_API_KEY`)
    #[serde(skip_serializing)]
    pub qdrant_api_key: String,
    /// Knowledge-base collection (`QDRANT_COLLECTION_NAME`)
    pub collection: String,
    /// Lookup credential (`WOLFRAM_APP_ID`); empty disables the lookup
    #[serde(skip_serializing)]
    pub wolfram_app_id: String,
    /// Extra attempts for failed lookup transports (`MATHROUTE_LOOKUP_RETRIES`)
    pub lookup_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            guardrail_terms: DEFAULT_DENYLIST.iter().map(|t| t.to_string()).collect(),
            google_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            qdrant_url: String::new(),
            qdrant_api_key: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            wolfram_app_id: String::new(),
            lookup_retries: 0,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// Unparseable numeric values are reported rather than silently replaced.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::try_from_vars(|key| std::env::var(key).ok())
    }

    /// Reads settings through an arbitrary variable lookup, ignoring
    /// unparseable numbers. Used by tests and doc examples.
    pub fn from_vars<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.apply_strings(&get);
        if let Some(Ok(v)) = get("TOP_K").map(|v| v.trim().parse::<usize>()) {
            settings.top_k = v;
        }
        if let Some(Ok(v)) = get("SCORE_THRESHOLD").map(|v| v.trim().parse::<f32>()) {
            settings.score_threshold = v;
        }
        if let Some(Ok(v)) = get("MATHROUTE_LOOKUP_RETRIES").map(|v| v.trim().parse::<u32>()) {
            settings.lookup_retries = v;
        }
        settings
    }

    /// Reads settings through a variable lookup, failing on unparseable numbers.
    pub fn try_from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        settings.apply_strings(&get);
        if let Some(v) = get("TOP_K") {
            settings.top_k = parse_var("TOP_K", &v)?;
        }
        if let Some(v) = get("SCORE_THRESHOLD") {
            settings.score_threshold = parse_var("SCORE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MATHROUTE_LOOKUP_RETRIES") {
            settings.lookup_retries = parse_var("MATHROUTE_LOOKUP_RETRIES", &v)?;
        }
        Ok(settings)
    }

    fn apply_strings<F>(&mut self, get: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(terms) = get("MATHROUTE_GUARDRAIL_TERMS") {
            let terms: Vec<String> = terms
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
            if !terms.is_empty() {
                self.guardrail_terms = terms;
            }
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.google_api_key = v;
        }
        if let Some(v) = get("GEMINI_MODEL").filter(|v| !v.is_empty()) {
            self.gemini_model = v;
        }
        if let Some(v) = get("QDRANT_URL") {
            self.qdrant_url = v;
        }
        if let Some(v) = get("QDRANT_API_KEY") {
            self.qdrant_api_key = v;
        }
        if let Some(v) = get("QDRANT_COLLECTION_NAME").filter(|v| !v.is_empty()) {
            self.collection = v;
        }
        if let Some(v) = get("WOLFRAM_APP_ID") {
            self.wolfram_app_id = v;
        }
    }

    /// Checks routing parameters only.
    ///
    /// Used when the knowledge base and generator are injected directly
    /// (tests, local indexes) and no credentials are involved.
    pub fn validate_routing(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("TOP_K must be greater than 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigError::Invalid(format!(
                "SCORE_THRESHOLD must be within [0, 1], got {}",
                self.score_threshold
            )));
        }
        Ok(())
    }

    /// Checks everything the production service needs to start.
    ///
    /// All missing credentials are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.google_api_key.is_empty() {
            missing.push("GOOGLE_API_KEY");
        }
        if self.qdrant_url.is_empty() {
            missing.push("QDRANT_URL");
        }
        if self.qdrant_api_key.is_empty() {
            missing.push("QDRANT_API_KEY");
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing.join(", ")));
        }
        self.validate_routing()
    }

    /// Whether the external lookup has a credential.
    pub fn lookup_enabled(&self) -> bool {
        !self.wolfram_app_id.is_empty()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{} has an invalid value: {:?}", name, value)))
}
