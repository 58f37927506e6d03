//! Redb-backed conversation store.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust, ACID-compliant,
//! embedded B-tree database.
//!
//! # Tables
//!
//! - `conversations`: id (u64) -> ConversationRecord (JSON)
//! - `feedback`: id (u64) -> FeedbackRecord (JSON)
//! - `human_interventions`: id (u64) -> InterventionRecord (JSON)
//!
//! Ids are `last key + 1` within the writing transaction, so they start at 1
//! and never repeat while rows are append-only.

use super::{
    ConversationRecord, ConversationStore, FeedbackReceipt, FeedbackRecord, InterventionRecord,
    InterventionView, NewFeedback,
};
use crate::error::StoreError;
use crate::types::{get_current_timestamp, RoutingResult};
use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, Table, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const CONVERSATIONS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("conversations");
const FEEDBACK_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("feedback");
const INTERVENTIONS_TABLE: TableDefinition<u64, &[u8]> =
    TableDefinition::new("human_interventions");

fn db_error(context: &str, e: impl Display) -> StoreError {
    StoreError::DatabaseError(format!("{}: {}", context, e))
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record)
        .map_err(|e| StoreError::SerializationError(format!("Failed to serialize record: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::SerializationError(format!("Failed to deserialize record: {}", e)))
}

/// Next free id in a table: one past the largest key, or 1 if empty.
fn next_id(table: &Table<u64, &'static [u8]>) -> Result<u64, StoreError> {
    let last = table.last().map_err(|e| db_error("Failed to read last key", e))?;
    Ok(last.map(|(key, _)| key.value() + 1).unwrap_or(1))
}

/// Conversation store persisted to a single redb file.
///
/// # Example
///
/// ```ignore
/// use mathroute_core::storage::RedbConversationStore;
///
/// let store = RedbConversationStore::open("./data/conversations.redb")?;
/// let id = store.save_conversation(&result).await?;
/// ```
pub struct RedbConversationStore {
    db: Arc<Database>,
}

impl RedbConversationStore {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates the database file and all required tables if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| db_error("Failed to open database", e))?;

        {
            let write_txn = db
                .begin_write()
                .map_err(|e| db_error("Failed to begin write transaction", e))?;
            write_txn
                .open_table(CONVERSATIONS_TABLE)
                .map_err(|e| db_error("Failed to create conversations table", e))?;
            write_txn
                .open_table(FEEDBACK_TABLE)
                .map_err(|e| db_error("Failed to create feedback table", e))?;
            write_txn
                .open_table(INTERVENTIONS_TABLE)
                .map_err(|e| db_error("Failed to create interventions table", e))?;
            write_txn
                .commit()
                .map_err(|e| db_error("Failed to commit table creation", e))?;
        }

        debug!("Opened conversation store at {}", path.as_ref().display());
        Ok(Self { db: Arc::new(db) })
    }

    fn get<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<u64, &'static [u8]>,
        id: u64,
    ) -> Result<Option<T>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_error("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(definition)
            .map_err(|e| db_error("Failed to open table", e))?;

        match table.get(id).map_err(|e| db_error("Failed to get record", e))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Reads up to `limit` records, newest first when `newest_first` is set.
    fn scan<T: DeserializeOwned>(
        &self,
        definition: TableDefinition<u64, &'static [u8]>,
        limit: usize,
        newest_first: bool,
    ) -> Result<Vec<T>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_error("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(definition)
            .map_err(|e| db_error("Failed to open table", e))?;
        let iter = table.iter().map_err(|e| db_error("Failed to iterate table", e))?;

        let mut records = Vec::new();
        if newest_first {
            for entry in iter.rev().take(limit) {
                let (_, value) = entry.map_err(|e| db_error("Failed to read entry", e))?;
                records.push(decode(value.value())?);
            }
        } else {
            for entry in iter.take(limit) {
                let (_, value) = entry.map_err(|e| db_error("Failed to read entry", e))?;
                records.push(decode(value.value())?);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl ConversationStore for RedbConversationStore {
    async fn save_conversation(&self, result: &RoutingResult) -> Result<u64, StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_error("Failed to begin write transaction", e))?;

        let id = {
            let mut table = write_txn
                .open_table(CONVERSATIONS_TABLE)
                .map_err(|e| db_error("Failed to open conversations table", e))?;
            let id = next_id(&table)?;
            let record = ConversationRecord::from_result(id, result, get_current_timestamp());
            table
                .insert(id, encode(&record)?.as_slice())
                .map_err(|e| db_error("Failed to insert conversation", e))?;
            id
        };

        write_txn
            .commit()
            .map_err(|e| db_error("Failed to commit transaction", e))?;
        debug!(id, source = %result.source, "Saved conversation");
        Ok(id)
    }

    async fn get_conversation(&self, id: u64) -> Result<Option<ConversationRecord>, StoreError> {
        self.get(CONVERSATIONS_TABLE, id)
    }

    async fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationRecord>, StoreError> {
        self.scan(CONVERSATIONS_TABLE, limit, true)
    }

    async fn all_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        self.scan(CONVERSATIONS_TABLE, usize::MAX, false)
    }

    async fn conversation_count(&self) -> Result<u64, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| db_error("Failed to begin read transaction", e))?;
        let table = read_txn
            .open_table(CONVERSATIONS_TABLE)
            .map_err(|e| db_error("Failed to open conversations table", e))?;
        table
            .len()
            .map_err(|e| db_error("Failed to get conversation count", e))
    }

    async fn save_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackReceipt, StoreError> {
        feedback.validate()?;
        let now = get_current_timestamp();

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| db_error("Failed to begin write transaction", e))?;

        // Feedback and its intervention commit together or not at all.
        let receipt = {
            let mut feedback_table = write_txn
                .open_table(FEEDBACK_TABLE)
                .map_err(|e| db_error("Failed to open feedback table", e))?;
            let feedback_id = next_id(&feedback_table)?;
            let record = FeedbackRecord::from_new(feedback_id, feedback, now);
            feedback_table
                .insert(feedback_id, encode(&record)?.as_slice())
                .map_err(|e| db_error("Failed to insert feedback", e))?;

            let mut interventions = write_txn
                .open_table(INTERVENTIONS_TABLE)
                .map_err(|e| db_error("Failed to open interventions table", e))?;
            let intervention_id = next_id(&interventions)?;
            let intervention = InterventionRecord::for_feedback(intervention_id, &record, now);
            if let Some(intervention) = &intervention {
                interventions
                    .insert(intervention.id, encode(intervention)?.as_slice())
                    .map_err(|e| db_error("Failed to insert intervention", e))?;
            }

            FeedbackReceipt {
                feedback_id,
                intervention_id: intervention.map(|i| i.id),
            }
        };

        write_txn
            .commit()
            .map_err(|e| db_error("Failed to commit transaction", e))?;
        debug!(
            feedback_id = receipt.feedback_id,
            intervention = receipt.intervention_id.is_some(),
            "Saved feedback"
        );
        Ok(receipt)
    }

    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.scan(FEEDBACK_TABLE, limit, true)
    }

    async fn all_feedback(&self) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.scan(FEEDBACK_TABLE, usize::MAX, false)
    }

    async fn recent_interventions(&self, limit: usize) -> Result<Vec<InterventionView>, StoreError> {
        let interventions: Vec<InterventionRecord> = self.scan(INTERVENTIONS_TABLE, limit, true)?;

        let mut feedback: HashMap<u64, FeedbackRecord> = HashMap::new();
        let mut views = Vec::with_capacity(interventions.len());
        for intervention in interventions {
            if !feedback.contains_key(&intervention.feedback_id) {
                match self.get::<FeedbackRecord>(FEEDBACK_TABLE, intervention.feedback_id)? {
                    Some(record) => {
                        feedback.insert(record.id, record);
                    }
                    None => continue,
                }
            }
            if let Some(fb) = feedback.get(&intervention.feedback_id) {
                views.push(InterventionView {
                    query: fb.query.clone(),
                    rating: fb.rating,
                    intervention,
                });
            }
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnswerSource;
    use tempfile::TempDir;

    fn create_test_store() -> (RedbConversationStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.redb");
        let store = RedbConversationStore::open(&db_path).unwrap();
        (store, temp_dir)
    }

    fn make_result(query: &str, source: AnswerSource, confidence_score: f32) -> RoutingResult {
        RoutingResult {
            query: query.to_string(),
            answer: "Step 1: ...".to_string(),
            source,
            confidence_score,
            kb_matches: if source == AnswerSource::KnowledgeBase { 2 } else { 0 },
        }
    }

    fn make_feedback(rating: u8, correction: Option<String>) -> NewFeedback {
        NewFeedback {
            conversation_id: Some(1),
            query: "Solve x^2 = 9".to_string(),
            answer: "x = 3".to_string(),
            rating,
            is_correct: Some(false),
            correction,
            notes: Some("missed the negative root".to_string()),
        }
    }

    #[tokio::test]
    async fn test_conversation_crud() {
        let (store, _temp) = create_test_store();

        let first = store
            .save_conversation(&make_result("What is 2+2?", AnswerSource::LlmKnowledge, 0.0))
            .await
            .unwrap();
        let second = store
            .save_conversation(&make_result("Quadratic formula?", AnswerSource::KnowledgeBase, 0.9))
            .await
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let record = store.get_conversation(2).await.unwrap().unwrap();
        assert_eq!(record.query, "Quadratic formula?");
        assert_eq!(record.source, AnswerSource::KnowledgeBase);
        assert_eq!(record.kb_matches, 2);

        assert!(store.get_conversation(3).await.unwrap().is_none());
        assert_eq!(store.conversation_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recent_conversations_newest_first() {
        let (store, _temp) = create_test_store();
        for q in ["first", "second", "third"] {
            store
                .save_conversation(&make_result(q, AnswerSource::WebSearch, 0.5))
                .await
                .unwrap();
        }

        let recent = store.recent_conversations(2).await.unwrap();
        let ids: Vec<u64> = recent.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2]);

        let all = store.all_conversations().await.unwrap();
        assert_eq!(all.first().unwrap().query, "first");
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_feedback_with_intervention() {
        let (store, _temp) = create_test_store();

        let short = store
            .save_feedback(&make_feedback(3, Some("x = ±3".to_string())))
            .await
            .unwrap();
        assert_eq!(short.intervention_id, None);

        let long_correction = "x² = 9 has two solutions: x = 3 and x = -3, since (-3)² is also 9.";
        let long = store
            .save_feedback(&make_feedback(1, Some(long_correction.to_string())))
            .await
            .unwrap();
        assert_eq!(long.feedback_id, 2);
        assert_eq!(long.intervention_id, Some(1));

        let views = store.recent_interventions(10).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].intervention.feedback_id, 2);
        assert_eq!(views[0].intervention.corrected_answer, long_correction);
        assert_eq!(views[0].query, "Solve x^2 = 9");
        assert_eq!(views[0].rating, 1);

        let recent = store.recent_feedback(1).await.unwrap();
        assert_eq!(recent[0].id, 2);
    }

    #[tokio::test]
    async fn test_invalid_feedback_rejected() {
        let (store, _temp) = create_test_store();
        let err = store.save_feedback(&make_feedback(0, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(store.all_feedback().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analytics() {
        let (store, _temp) = create_test_store();
        store
            .save_conversation(&make_result("a", AnswerSource::KnowledgeBase, 0.9))
            .await
            .unwrap();
        store
            .save_conversation(&make_result("b", AnswerSource::WebSearch, 0.5))
            .await
            .unwrap();
        store
            .save_conversation(&make_result("c", AnswerSource::LlmKnowledge, 0.0))
            .await
            .unwrap();
        store.save_feedback(&make_feedback(5, None)).await.unwrap();

        let dist = store.source_distribution().await.unwrap();
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[&AnswerSource::WebSearch], 1);

        let conf = store.average_confidence_by_source().await.unwrap();
        assert_eq!(conf[&AnswerSource::KnowledgeBase], 0.9);
        assert!(!conf.contains_key(&AnswerSource::LlmKnowledge));

        let stats = store.feedback_stats().await.unwrap();
        assert_eq!(stats.total_feedback, 1);
        assert_eq!(stats.avg_rating, Some(5.0));
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("persist.redb");

        {
            let store = RedbConversationStore::open(&db_path).unwrap();
            store
                .save_conversation(&make_result("persisted", AnswerSource::WebSearch, 0.5))
                .await
                .unwrap();
        }

        {
            let store = RedbConversationStore::open(&db_path).unwrap();
            let record = store.get_conversation(1).await.unwrap().unwrap();
            assert_eq!(record.query, "persisted");

            let id = store
                .save_conversation(&make_result("next", AnswerSource::WebSearch, 0.5))
                .await
                .unwrap();
            assert_eq!(id, 2);
        }
    }
}
