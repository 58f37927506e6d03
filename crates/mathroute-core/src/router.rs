//! Answer routing.
//!
//! Every query walks the same fallback chain:
//!
//! ```text
//! guardrail ──blocked──▶ refusal
//!     │
//!     ▼
//! knowledge base ──matches──▶ KB context ─────────┐
//!     │ none                                      │
//!     ▼                                           ▼
//! external lookup ──answer──▶ web context ──▶ generate ──▶ RoutingResult
//!     │ failed                                    ▲
//!     ▼                                           │
//! first-principles context ───────────────────────┘
//! ```
//!
//! Retrieval errors are treated as "no matches" and lookups never fail, so
//! the only error a caller sees is a generation failure.

use crate::composer;
use crate::config::{Settings, DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K, NO_CONFIDENCE, WEB_SEARCH_CONFIDENCE};
use crate::error::RouteError;
use crate::generation::Generator;
use crate::guardrail::{ContentGuardrail, REFUSAL_MESSAGE};
use crate::lookup::LookupClient;
use crate::retriever::Retriever;
use crate::types::{AnswerSource, RetrievedMatch, RoutingResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Routes queries to a context source and generates the explanation.
///
/// Holds only shared collaborators and immutable limits, so one instance can
/// serve concurrent queries.
pub struct MathRouter {
    guardrail: ContentGuardrail,
    retriever: Arc<dyn Retriever>,
    lookup: Arc<dyn LookupClient>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    score_threshold: f32,
}

impl MathRouter {
    /// Creates a router with the default denylist and retrieval limits.
    pub fn new(
        retriever: Arc<dyn Retriever>,
        lookup: Arc<dyn LookupClient>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            guardrail: ContentGuardrail::default(),
            retriever,
            lookup,
            generator,
            top_k: DEFAULT_TOP_K,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }

    /// Creates a router using the denylist and limits from `settings`.
    pub fn from_settings(
        settings: &Settings,
        retriever: Arc<dyn Retriever>,
        lookup: Arc<dyn LookupClient>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self::new(retriever, lookup, generator)
            .with_guardrail(ContentGuardrail::new(&settings.guardrail_terms))
            .with_retrieval_limits(settings.top_k, settings.score_threshold)
    }

    pub fn with_guardrail(mut self, guardrail: ContentGuardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn with_retrieval_limits(mut self, top_k: usize, score_threshold: f32) -> Self {
        self.top_k = top_k;
        self.score_threshold = score_threshold;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    /// Answers one query.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::Generation`] if the generation service fails.
    /// Blocked queries and low-confidence answers are not errors.
    #[instrument(skip_all, fields(query_chars = query.chars().count()))]
    pub async fn route_and_answer(&self, query: &str) -> Result<RoutingResult, RouteError> {
        if !self.guardrail.allow(query) {
            info!(source = %AnswerSource::Guardrails, "Query blocked by guardrail");
            return Ok(RoutingResult {
                query: query.to_string(),
                answer: REFUSAL_MESSAGE.to_string(),
                source: AnswerSource::Guardrails,
                confidence_score: NO_CONFIDENCE,
                kb_matches: 0,
            });
        }

        let matches = self.retrieve(query).await;

        let (context, source, confidence_score) = if matches.is_empty() {
            info!("No knowledge-base match above {}, trying lookup", self.score_threshold);
            let lookup = self.lookup.lookup(query).await;
            if lookup.succeeded {
                info!(source = %AnswerSource::WebSearch, origin = lookup.origin.as_str(), "Using lookup answer");
                (
                    composer::web_context(&lookup),
                    AnswerSource::WebSearch,
                    WEB_SEARCH_CONFIDENCE,
                )
            } else {
                info!(
                    source = %AnswerSource::LlmKnowledge,
                    origin = lookup.origin.as_str(),
                    "Lookup unavailable, answering from model knowledge"
                );
                (
                    composer::LLM_ONLY_CONTEXT.to_string(),
                    AnswerSource::LlmKnowledge,
                    NO_CONFIDENCE,
                )
            }
        } else {
            let best = best_score(&matches);
            info!(
                source = %AnswerSource::KnowledgeBase,
                "Using {} knowledge-base matches (best: {:.3})",
                matches.len(),
                best
            );
            (
                composer::knowledge_base_context(&matches),
                AnswerSource::KnowledgeBase,
                best,
            )
        };

        let request = composer::build_request(query, &context);
        let answer = self.generator.generate(&request).await?;

        Ok(RoutingResult {
            query: query.to_string(),
            answer,
            source,
            confidence_score,
            kb_matches: matches.len(),
        })
    }

    async fn retrieve(&self, query: &str) -> Vec<RetrievedMatch> {
        match self
            .retriever
            .search(query, self.top_k, self.score_threshold)
            .await
        {
            Ok(matches) => matches,
            Err(e) => {
                warn!("Knowledge-base search failed, continuing without matches: {}", e);
                Vec::new()
            }
        }
    }
}

/// Highest match score, clamped to [0, 1].
fn best_score(matches: &[RetrievedMatch]) -> f32 {
    matches
        .iter()
        .map(|m| m.score)
        .fold(0.0f32, f32::max)
        .clamp(0.0, 1.0)
}
