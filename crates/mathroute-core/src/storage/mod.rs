//! Conversation, feedback and intervention persistence.
//!
//! Every routed query is stored as a [`ConversationRecord`]. Users may attach
//! [`FeedbackRecord`]s; a feedback carrying a substantial correction also
//! produces an [`InterventionRecord`] in the same write, queued for review.
//!
//! # Implementations
//!
//! - [`InMemoryConversationStore`] - Process-local store for tests and dry runs
//! - [`RedbConversationStore`] - Embedded redb database (feature `redb-store`)
//!
//! Records are append-only. Ids are assigned per table, starting at 1, and
//! listings return the highest ids first.

mod memory;

#[cfg(feature = "redb-store")]
mod redb_store;

pub use memory::InMemoryConversationStore;

#[cfg(feature = "redb-store")]
pub use redb_store::RedbConversationStore;

use crate::config::{INTERVENTION_MIN_CORRECTION_CHARS, MAX_CORRECTION_CHARS, MAX_NOTES_CHARS};
use crate::error::StoreError;
use crate::types::{AnswerSource, RoutingResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reason attached to automatically recorded interventions.
pub const INTERVENTION_REASON: &str = "User provided substantial correction";

/// A persisted routing result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: u64,
    pub query: String,
    pub answer: String,
    pub source: AnswerSource,
    pub confidence_score: f32,
    pub kb_matches: usize,
    /// Unix timestamp (seconds)
    pub created_at: u64,
}

impl ConversationRecord {
    pub fn from_result(id: u64, result: &RoutingResult, created_at: u64) -> Self {
        Self {
            id,
            query: result.query.clone(),
            answer: result.answer.clone(),
            source: result.source,
            confidence_score: result.confidence_score,
            kb_matches: result.kb_matches,
            created_at,
        }
    }
}

/// Feedback as submitted, before an id is assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFeedback {
    pub conversation_id: Option<u64>,
    pub query: String,
    pub answer: String,
    /// 1 (poor) to 5 (excellent)
    pub rating: u8,
    pub is_correct: Option<bool>,
    pub correction: Option<String>,
    pub notes: Option<String>,
}

impl NewFeedback {
    /// Checks rating range and free-text lengths.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(1..=5).contains(&self.rating) {
            return Err(StoreError::Invalid(format!(
                "rating must be between 1 and 5 (got {})",
                self.rating
            )));
        }
        if let Some(correction) = &self.correction {
            let len = correction.chars().count();
            if len > MAX_CORRECTION_CHARS {
                return Err(StoreError::Invalid(format!(
                    "correction exceeds {} characters (got {})",
                    MAX_CORRECTION_CHARS, len
                )));
            }
        }
        if let Some(notes) = &self.notes {
            let len = notes.chars().count();
            if len > MAX_NOTES_CHARS {
                return Err(StoreError::Invalid(format!(
                    "notes exceed {} characters (got {})",
                    MAX_NOTES_CHARS, len
                )));
            }
        }
        Ok(())
    }

    /// True if the correction is long enough to be recorded as an intervention.
    pub fn needs_intervention(&self) -> bool {
        self.correction
            .as_ref()
            .is_some_and(|c| c.chars().count() > INTERVENTION_MIN_CORRECTION_CHARS)
    }
}

/// A persisted feedback entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: u64,
    pub conversation_id: Option<u64>,
    pub query: String,
    pub answer: String,
    pub rating: u8,
    pub is_correct: Option<bool>,
    pub correction: Option<String>,
    pub notes: Option<String>,
    pub created_at: u64,
}

impl FeedbackRecord {
    pub fn from_new(id: u64, feedback: &NewFeedback, created_at: u64) -> Self {
        Self {
            id,
            conversation_id: feedback.conversation_id,
            query: feedback.query.clone(),
            answer: feedback.answer.clone(),
            rating: feedback.rating,
            is_correct: feedback.is_correct,
            correction: feedback.correction.clone(),
            notes: feedback.notes.clone(),
            created_at,
        }
    }
}

/// A substantial correction queued for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub id: u64,
    pub feedback_id: u64,
    pub original_answer: String,
    pub corrected_answer: String,
    pub reason: String,
    pub created_at: u64,
}

impl InterventionRecord {
    /// Builds the intervention for `feedback`, if its correction qualifies.
    pub fn for_feedback(id: u64, feedback: &FeedbackRecord, created_at: u64) -> Option<Self> {
        let correction = feedback.correction.as_ref()?;
        if correction.chars().count() <= INTERVENTION_MIN_CORRECTION_CHARS {
            return None;
        }
        Some(Self {
            id,
            feedback_id: feedback.id,
            original_answer: feedback.answer.clone(),
            corrected_answer: correction.clone(),
            reason: INTERVENTION_REASON.to_string(),
            created_at,
        })
    }
}

/// An intervention joined with the query and rating of its feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionView {
    #[serde(flatten)]
    pub intervention: InterventionRecord,
    pub query: String,
    pub rating: u8,
}

/// Ids assigned by [`ConversationStore::save_feedback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackReceipt {
    pub feedback_id: u64,
    /// Present when the correction was recorded as an intervention
    pub intervention_id: Option<u64>,
}

/// Aggregate feedback counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub total_feedback: u64,
    /// Mean rating; `None` when there is no feedback
    pub avg_rating: Option<f64>,
    pub correct_count: u64,
    pub incorrect_count: u64,
    /// Entries carrying any correction text
    pub corrections_count: u64,
}

/// Persistence for conversations, feedback and interventions.
///
/// The analytics methods have default implementations that aggregate over
/// full scans; backends with native aggregation may override them.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Stores a routing result and returns its conversation id.
    async fn save_conversation(&self, result: &RoutingResult) -> Result<u64, StoreError>;

    /// Returns `Ok(None)` if the conversation doesn't exist.
    async fn get_conversation(&self, id: u64) -> Result<Option<ConversationRecord>, StoreError>;

    /// Most recent first, at most `limit` entries.
    async fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationRecord>, StoreError>;

    /// Every stored conversation, oldest first.
    async fn all_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError>;

    /// Validates and stores feedback. A qualifying correction also records an
    /// intervention within the same write.
    async fn save_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackReceipt, StoreError>;

    /// Most recent first, at most `limit` entries.
    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError>;

    /// Every stored feedback entry, oldest first.
    async fn all_feedback(&self) -> Result<Vec<FeedbackRecord>, StoreError>;

    /// Most recent first, joined with feedback query and rating.
    async fn recent_interventions(&self, limit: usize) -> Result<Vec<InterventionView>, StoreError>;

    async fn conversation_count(&self) -> Result<u64, StoreError> {
        Ok(self.all_conversations().await?.len() as u64)
    }

    async fn feedback_stats(&self) -> Result<FeedbackStats, StoreError> {
        Ok(summarize_feedback(&self.all_feedback().await?))
    }

    async fn source_distribution(&self) -> Result<BTreeMap<AnswerSource, u64>, StoreError> {
        Ok(count_by_source(&self.all_conversations().await?))
    }

    async fn average_confidence_by_source(&self) -> Result<BTreeMap<AnswerSource, f64>, StoreError> {
        Ok(average_confidence_by_source(&self.all_conversations().await?))
    }
}

/// Aggregates feedback counters.
pub fn summarize_feedback(records: &[FeedbackRecord]) -> FeedbackStats {
    let total = records.len() as u64;
    let avg_rating = if records.is_empty() {
        None
    } else {
        let sum: u64 = records.iter().map(|r| r.rating as u64).sum();
        Some(sum as f64 / total as f64)
    };

    FeedbackStats {
        total_feedback: total,
        avg_rating,
        correct_count: records.iter().filter(|r| r.is_correct == Some(true)).count() as u64,
        incorrect_count: records.iter().filter(|r| r.is_correct == Some(false)).count() as u64,
        corrections_count: records.iter().filter(|r| r.correction.is_some()).count() as u64,
    }
}

/// Number of conversations per answer source.
pub fn count_by_source(records: &[ConversationRecord]) -> BTreeMap<AnswerSource, u64> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.source).or_insert(0) += 1;
    }
    counts
}

/// Mean confidence per source over conversations with a positive score,
/// rounded to three decimals. Sources with no positive score are absent.
pub fn average_confidence_by_source(records: &[ConversationRecord]) -> BTreeMap<AnswerSource, f64> {
    let mut sums: BTreeMap<AnswerSource, (f64, u64)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.confidence_score > 0.0) {
        let entry = sums.entry(record.source).or_insert((0.0, 0));
        entry.0 += record.confidence_score as f64;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(source, (sum, n))| (source, round_to(sum / n as f64, 3)))
        .collect()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Highest-id-first slice of an oldest-first list.
pub(crate) fn newest_first<T: Clone>(records: &[T], limit: usize) -> Vec<T> {
    records.iter().rev().take(limit).cloned().collect()
}
