//! Routing data model shared by the router, its collaborators and the store.

use crate::config::{MAX_QUERY_CHARS, MIN_QUERY_CHARS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns the current Unix timestamp (seconds since UNIX_EPOCH).
///
/// If the system time is before UNIX_EPOCH, returns 0 instead of panicking.
pub fn get_current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Checks a query's length at the hosting surface.
///
/// The router itself accepts any text; this is the gate applied before a
/// query is routed and persisted. Lengths are counted in characters.
pub fn validate_query(query: &str) -> Result<(), String> {
    let len = query.chars().count();
    if len < MIN_QUERY_CHARS {
        return Err(format!(
            "query must be at least {} characters (got {})",
            MIN_QUERY_CHARS, len
        ));
    }
    if len > MAX_QUERY_CHARS {
        return Err(format!(
            "query must be at most {} characters (got {})",
            MAX_QUERY_CHARS, len
        ));
    }
    Ok(())
}

/// A solved problem from the knowledge base that cleared the score threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedMatch {
    /// Problem statement
    pub problem: String,
    /// Worked solution
    pub solution: String,
    /// Difficulty label from the dataset
    pub level: String,
    /// Subject label (stored under the payload key `type`)
    pub topic: String,
    /// Cosine similarity reported by the index
    pub score: f32,
}

/// Where a lookup result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOrigin {
    /// The service answered (any HTTP status)
    WolframAlphaHttp,
    /// No credential configured; no request was made
    NoApiKey,
    /// Transport failure
    Error,
}

impl LookupOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOrigin::WolframAlphaHttp => "wolfram_alpha_http",
            LookupOrigin::NoApiKey => "no_api_key",
            LookupOrigin::Error => "error",
        }
    }
}

/// Outcome of an external computational lookup.
///
/// When `succeeded` is false, `content` is diagnostic text and must not be
/// used as answer context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    pub content: String,
    pub succeeded: bool,
    pub origin: LookupOrigin,
}

impl LookupResult {
    /// The lookup was skipped for lack of a credential.
    pub fn no_api_key() -> Self {
        Self {
            content: String::new(),
            succeeded: false,
            origin: LookupOrigin::NoApiKey,
        }
    }

    /// The request never produced a response.
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            succeeded: false,
            origin: LookupOrigin::Error,
        }
    }
}

/// Which context source the router used for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Query rejected by the content guardrail
    Guardrails,
    /// Context built from knowledge-base matches
    KnowledgeBase,
    /// Context built from the external lookup
    WebSearch,
    /// No context; the model answers from its own knowledge
    LlmKnowledge,
}

impl AnswerSource {
    /// All sources, in routing order.
    pub const ALL: [AnswerSource; 4] = [
        AnswerSource::Guardrails,
        AnswerSource::KnowledgeBase,
        AnswerSource::WebSearch,
        AnswerSource::LlmKnowledge,
    ];

    /// Wire label, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerSource::Guardrails => "guardrails",
            AnswerSource::KnowledgeBase => "knowledge_base",
            AnswerSource::WebSearch => "web_search",
            AnswerSource::LlmKnowledge => "llm_knowledge",
        }
    }
}

impl fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final output of routing one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    /// The query as received
    pub query: String,
    /// Generated explanation, or the refusal text for blocked queries
    pub answer: String,
    pub source: AnswerSource,
    /// In [0, 1]; see [`AnswerSource`] for how each source sets it
    pub confidence_score: f32,
    /// Number of retained knowledge-base matches
    pub kb_matches: usize,
}
