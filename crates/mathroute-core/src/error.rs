//! Error types for mathroute-core.
//!
//! Each collaborator boundary has its own error enum. The router only lets
//! [`GenerationError`] escape a query; retrieval and lookup failures are
//! absorbed into the fallback chain.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    /// Failed to load model weights or configuration
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
    /// Failed to create tensor during inference
    #[error("Failed to create tensor: {0}")]
    TensorCreation(String),
    /// Forward pass through the model failed
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    /// Failed to tokenize text
    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Tokenizer not available or initialization failed
    #[error("Tokenizer unavailable: {0}")]
    TokenizerUnavailable(String),
}

/// Errors from the vector index and similarity search.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    /// The index service could not be reached or rejected the request
    #[error("Index unavailable: {0}")]
    Unavailable(String),
    /// Index query failed after the connection was established
    #[error("Index error: {0}")]
    IndexError(String),
    /// Query embedding failed
    #[error("Embedding error: {0}")]
    EmbeddingError(String),
    /// Vector dimension mismatch (expected vs actual)
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected embedding dimension
        expected: usize,
        /// Actual embedding dimension received
        actual: usize,
    },
    /// Invalid search parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors from the text generation service.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Request could not be sent or the connection dropped
    #[error("Generation request failed: {0}")]
    RequestFailed(String),
    /// Service answered with a non-success status
    #[error("Generation service returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },
    /// Response could not be decoded
    #[error("Invalid generation response: {0}")]
    InvalidResponse(String),
    /// Response decoded but carried no text
    #[error("Generation service returned no text")]
    EmptyResponse,
}

/// Errors that can occur during conversation store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),
    /// Record rejected before it was written
    #[error("Invalid record: {0}")]
    Invalid(String),
}

/// Configuration errors detected at startup.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Required settings are absent
    #[error("Missing configuration: {0}")]
    Missing(String),
    /// A setting has an unusable value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors constructing a lookup client.
///
/// Lookups themselves never fail; only setup can.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Errors that escape [`MathRouter::route_and_answer`](crate::router::MathRouter::route_and_answer).
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// The generation step failed; no further fallback exists
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Errors from the tutor service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Query rejected by surface validation
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// Routing failed
    #[error(transparent)]
    Route(#[from] RouteError),
    /// Persisting or reading records failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

// Conversion implementations for error chaining

impl From<EmbeddingError> for SearchError {
    fn from(err: EmbeddingError) -> Self {
        SearchError::EmbeddingError(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationError(err.to_string())
    }
}
