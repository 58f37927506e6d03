//! Service assembly.
//!
//! Builds the production collaborators from [`Settings`] and wires them into
//! a [`TutorService`]. Nothing here is a global: every command constructs
//! exactly what it needs.

use crate::config;
use anyhow::{Context, Result};
use mathroute_core::config::Settings;
use mathroute_core::embedding::{MiniLmEncoder, TextEncoder};
use mathroute_core::generation::GeminiGenerator;
use mathroute_core::index::QdrantIndex;
use mathroute_core::lookup::{LookupClient, RetryingLookup, WolframClient};
use mathroute_core::retriever::SimilarityRetriever;
use mathroute_core::router::MathRouter;
use mathroute_core::service::TutorService;
use mathroute_core::storage::{ConversationStore, RedbConversationStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Opens (or creates) the conversation database.
pub fn open_store(data_dir: Option<&PathBuf>) -> Result<Arc<dyn ConversationStore>> {
    let db_path = config::database_path(data_dir)?;
    info!("Opening database: {}", db_path.display());
    let store = RedbConversationStore::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// Builds the full tutor service.
///
/// This function:
/// 1. Validates settings (all missing credentials reported together)
/// 2. Loads the MiniLM encoder
/// 3. Connects to the Qdrant collection and checks it is reachable
/// 4. Creates the lookup and generation clients
/// 5. Assembles the router and service
///
/// Any failure here is a startup failure.
pub async fn build_service(
    settings: &Settings,
    store: Arc<dyn ConversationStore>,
) -> Result<TutorService> {
    settings.validate().context("Invalid configuration")?;

    info!("Loading embedding model...");
    let files = config::load_model_files()?;
    let encoder = MiniLmEncoder::from_bytes(files.weights, files.config, files.tokenizer)
        .context("Failed to load embedding model")?;
    info!("Model loaded ({}-d)", encoder.dimension());

    let index = QdrantIndex::connect(
        &settings.qdrant_url,
        &settings.qdrant_api_key,
        &settings.collection,
    )
    .context("Failed to create index client")?;
    let retriever = SimilarityRetriever::connect(Arc::new(encoder), Arc::new(index))
        .await
        .with_context(|| format!("Knowledge base '{}' is unreachable", settings.collection))?;

    if !settings.lookup_enabled() {
        warn!("WOLFRAM_APP_ID not set; external lookup disabled");
    }
    let wolfram = WolframClient::new(settings.wolfram_app_id.clone())
        .context("Failed to create lookup client")?;
    let lookup: Arc<dyn LookupClient> = Arc::new(RetryingLookup::new(wolfram, settings.lookup_retries));

    let generator = GeminiGenerator::new(settings.google_api_key.clone(), settings.gemini_model.clone())
        .context("Failed to create generation client")?;
    info!("Using generation model {}", generator.model());

    let router = MathRouter::from_settings(settings, Arc::new(retriever), lookup, Arc::new(generator));
    Ok(TutorService::new(Arc::new(router), store))
}
