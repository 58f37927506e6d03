//! In-memory conversation store.

use super::{
    newest_first, ConversationRecord, ConversationStore, FeedbackReceipt, FeedbackRecord,
    InterventionRecord, InterventionView, NewFeedback,
};
use crate::error::StoreError;
use crate::types::{get_current_timestamp, RoutingResult};
use async_trait::async_trait;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    conversations: Vec<ConversationRecord>,
    feedback: Vec<FeedbackRecord>,
    interventions: Vec<InterventionRecord>,
}

/// Keeps every table in process memory behind one lock.
///
/// Nothing is persisted. Useful for unit tests and dry runs.
#[derive(Default)]
pub struct InMemoryConversationStore {
    tables: RwLock<Tables>,
}

impl InMemoryConversationStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::DatabaseError(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save_conversation(&self, result: &RoutingResult) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let id = tables.conversations.len() as u64 + 1;
        tables
            .conversations
            .push(ConversationRecord::from_result(id, result, get_current_timestamp()));
        Ok(id)
    }

    async fn get_conversation(&self, id: u64) -> Result<Option<ConversationRecord>, StoreError> {
        let tables = self.read()?;
        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationRecord>, StoreError> {
        Ok(newest_first(&self.read()?.conversations, limit))
    }

    async fn all_conversations(&self) -> Result<Vec<ConversationRecord>, StoreError> {
        Ok(self.read()?.conversations.clone())
    }

    async fn conversation_count(&self) -> Result<u64, StoreError> {
        Ok(self.read()?.conversations.len() as u64)
    }

    async fn save_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackReceipt, StoreError> {
        feedback.validate()?;

        let now = get_current_timestamp();
        let mut tables = self.write()?;

        let feedback_id = tables.feedback.len() as u64 + 1;
        let record = FeedbackRecord::from_new(feedback_id, feedback, now);

        let intervention_id = tables.interventions.len() as u64 + 1;
        let intervention = InterventionRecord::for_feedback(intervention_id, &record, now);
        let receipt = FeedbackReceipt {
            feedback_id,
            intervention_id: intervention.as_ref().map(|i| i.id),
        };

        tables.feedback.push(record);
        if let Some(intervention) = intervention {
            tables.interventions.push(intervention);
        }
        Ok(receipt)
    }

    async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(newest_first(&self.read()?.feedback, limit))
    }

    async fn all_feedback(&self) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(self.read()?.feedback.clone())
    }

    async fn recent_interventions(&self, limit: usize) -> Result<Vec<InterventionView>, StoreError> {
        let tables = self.read()?;
        let views = newest_first(&tables.interventions, limit)
            .into_iter()
            .filter_map(|intervention| {
                let fb = tables.feedback.iter().find(|f| f.id == intervention.feedback_id)?;
                Some(InterventionView {
                    query: fb.query.clone(),
                    rating: fb.rating,
                    intervention,
                })
            })
            .collect();
        Ok(views)
    }
}
