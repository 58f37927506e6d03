//! Router and store, as consumed by a hosting process.
//!
//! [`TutorService`] is the surface a CLI or HTTP front end talks to: it
//! validates queries, routes them and persists every interaction.
//! [`Records`] serves feedback and analytics over the stored data and needs
//! only a store, so hosts can use it without loading the model.

use crate::error::{ServiceError, StoreError};
use crate::router::MathRouter;
use crate::storage::{
    ConversationRecord, ConversationStore, FeedbackReceipt, FeedbackRecord, InterventionView,
    NewFeedback,
};
use crate::types::{validate_query, AnswerSource, RoutingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Aggregated usage and feedback figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_conversations: u64,
    pub total_feedback: u64,
    /// Mean rating rounded to two decimals; `None` without feedback
    pub avg_rating: Option<f64>,
    pub correct_count: u64,
    pub incorrect_count: u64,
    pub corrections_count: u64,
    pub source_distribution: BTreeMap<AnswerSource, u64>,
    pub avg_confidence_by_source: BTreeMap<AnswerSource, f64>,
}

impl StatsSummary {
    /// Gathers the figures from a store.
    pub async fn collect(store: &dyn ConversationStore) -> Result<Self, StoreError> {
        let total_conversations = store.conversation_count().await?;
        let feedback = store.feedback_stats().await?;

        Ok(Self {
            total_conversations,
            total_feedback: feedback.total_feedback,
            avg_rating: feedback.avg_rating.map(|r| (r * 100.0).round() / 100.0),
            correct_count: feedback.correct_count,
            incorrect_count: feedback.incorrect_count,
            corrections_count: feedback.corrections_count,
            source_distribution: store.source_distribution().await?,
            avg_confidence_by_source: store.average_confidence_by_source().await?,
        })
    }
}

/// Overall health of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// State of one component in a [`HealthReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    pub detail: String,
}

/// Health of each component; degraded if any component is unhealthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            components: BTreeMap::new(),
        }
    }
}

impl HealthReport {
    /// Records a component and updates the overall status.
    pub fn with_component(
        mut self,
        name: impl Into<String>,
        healthy: bool,
        detail: impl Into<String>,
    ) -> Self {
        if !healthy {
            self.status = HealthStatus::Degraded;
        }
        self.components.insert(
            name.into(),
            ComponentHealth {
                healthy,
                detail: detail.into(),
            },
        );
        self
    }

    /// Records the store as a component, healthy if it can be read.
    pub async fn with_store(self, store: &dyn ConversationStore) -> Self {
        match store.conversation_count().await {
            Ok(count) => self.with_component("store", true, format!("{} conversations", count)),
            Err(e) => {
                warn!("Store health check failed: {}", e);
                self.with_component("store", false, e.to_string())
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Feedback intake and read-only views over a conversation store.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn ConversationStore>,
}

impl Records {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn ConversationStore {
        self.store.as_ref()
    }

    /// Stores feedback, recording an intervention for substantial corrections.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`] if the feedback is invalid or cannot be saved.
    pub async fn submit_feedback(&self, feedback: &NewFeedback) -> Result<FeedbackReceipt, ServiceError> {
        let receipt = self.store.save_feedback(feedback).await?;
        if let Some(intervention_id) = receipt.intervention_id {
            info!(
                feedback_id = receipt.feedback_id,
                intervention_id, "Correction queued for review"
            );
        }
        Ok(receipt)
    }

    pub async fn stats(&self) -> Result<StatsSummary, ServiceError> {
        Ok(StatsSummary::collect(self.store.as_ref()).await?)
    }

    pub async fn recent_conversations(&self, limit: usize) -> Result<Vec<ConversationRecord>, ServiceError> {
        Ok(self.store.recent_conversations(limit).await?)
    }

    pub async fn recent_feedback(&self, limit: usize) -> Result<Vec<FeedbackRecord>, ServiceError> {
        Ok(self.store.recent_feedback(limit).await?)
    }

    pub async fn interventions(&self, limit: usize) -> Result<Vec<InterventionView>, ServiceError> {
        Ok(self.store.recent_interventions(limit).await?)
    }

    pub async fn conversation(&self, id: u64) -> Result<Option<ConversationRecord>, ServiceError> {
        Ok(self.store.get_conversation(id).await?)
    }
}

/// Routes queries and records everything that happens to them.
#[derive(Clone)]
pub struct TutorService {
    router: Arc<MathRouter>,
    records: Records,
}

impl TutorService {
    pub fn new(router: Arc<MathRouter>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            router,
            records: Records::new(store),
        }
    }

    pub fn router(&self) -> &MathRouter {
        &self.router
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Validates, routes and persists one query.
    ///
    /// Returns the new conversation id with the routing result. Guardrail
    /// refusals are stored like any other answer.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidQuery`] if the query is too short or too long
    /// - [`ServiceError::Route`] if generation fails (nothing is stored)
    /// - [`ServiceError::Store`] if the result cannot be persisted
    #[instrument(skip_all)]
    pub async fn ask(&self, query: &str) -> Result<(u64, RoutingResult), ServiceError> {
        validate_query(query).map_err(ServiceError::InvalidQuery)?;

        let result = self.router.route_and_answer(query).await?;
        let id = self.records.store().save_conversation(&result).await?;

        info!(
            conversation_id = id,
            source = %result.source,
            confidence = result.confidence_score,
            "Answered query"
        );
        Ok((id, result))
    }

    /// Checks the store and reports the router's retrieval limits.
    ///
    /// Never contacts the external services.
    pub async fn health(&self) -> HealthReport {
        let report = HealthReport::default().with_component(
            "router",
            true,
            format!(
                "top_k={}, score_threshold={}",
                self.router.top_k(),
                self.router.score_threshold()
            ),
        );

        report.with_store(self.records.store()).await
    }
}
