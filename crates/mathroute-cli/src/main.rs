//! Mathroute CLI - command-line host for the math tutor.
//!
//! # Usage
//!
//! ```bash
//! # Ask a question (needs GOOGLE_API_KEY, QDRANT_URL, QDRANT_API_KEY)
//! mathroute ask "What is the quadratic formula?"
//!
//! # Rate an answer, taking query and answer from the stored conversation
//! mathroute feedback --conversation-id 1 --rating 2 --incorrect --correction "..."
//!
//! # Inspect stored data
//! mathroute stats
//! mathroute recent -n 5 --json
//! mathroute interventions
//!
//! # Check configuration and store without contacting services
//! mathroute health
//! ```

mod config;
mod engine;
mod output;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mathroute_core::config::Settings;
use mathroute_core::service::{HealthReport, Records, DEFAULT_LIST_LIMIT};
use mathroute_core::storage::NewFeedback;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Retrieval-augmented math tutor.
///
/// Answers come from similar solved problems, an external computational
/// service, or the generation model itself, in that order of preference.
#[derive(Parser)]
#[command(name = "mathroute", version, about)]
struct Cli {
    /// Custom data directory (default: platform standard location)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a math question and record the conversation
    Ask {
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record feedback on an answer
    Feedback {
        /// Rating from 1 (poor) to 5 (excellent)
        #[arg(long)]
        rating: u8,

        /// Conversation the feedback refers to
        #[arg(long)]
        conversation_id: Option<u64>,

        /// Mark the answer as correct
        #[arg(long, conflicts_with = "incorrect")]
        correct: bool,

        /// Mark the answer as incorrect
        #[arg(long)]
        incorrect: bool,

        /// Corrected answer
        #[arg(long)]
        correction: Option<String>,

        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,

        /// Question text (defaults to the stored conversation's)
        #[arg(long)]
        query: Option<String>,

        /// Answer text (defaults to the stored conversation's)
        #[arg(long)]
        answer: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show usage and feedback statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// List recent conversations
    Recent {
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List recent feedback
    FeedbackList {
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// List corrections queued for review
    Interventions {
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Report store and configuration status
    Health {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = cli.data_dir.as_ref();

    match cli.command {
        Command::Ask { query, json } => {
            let settings = Settings::from_env().context("Failed to read settings")?;
            let store = engine::open_store(data_dir)?;
            let service = engine::build_service(&settings, store).await?;

            let (id, result) = service.ask(&query).await?;
            let output = if json {
                output::format_answer_json(id, &result)
            } else {
                output::format_answer_human(id, &result)
            };
            println!("{}", output);
        }
        Command::Feedback {
            rating,
            conversation_id,
            correct,
            incorrect,
            correction,
            notes,
            query,
            answer,
            json,
        } => {
            let records = Records::new(engine::open_store(data_dir)?);

            let (query, answer) = match (query, answer, conversation_id) {
                (Some(q), Some(a), _) => (q, a),
                (q, a, Some(id)) => {
                    let conversation = records
                        .conversation(id)
                        .await?
                        .ok_or_else(|| anyhow!("Conversation #{} not found", id))?;
                    (
                        q.unwrap_or(conversation.query),
                        a.unwrap_or(conversation.answer),
                    )
                }
                _ => {
                    return Err(anyhow!(
                        "Provide --query and --answer, or --conversation-id to take them from a stored conversation"
                    ))
                }
            };

            let is_correct = match (correct, incorrect) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };

            let receipt = records
                .submit_feedback(&NewFeedback {
                    conversation_id,
                    query,
                    answer,
                    rating,
                    is_correct,
                    correction,
                    notes,
                })
                .await?;

            let output = if json {
                output::format_json(&receipt)
            } else {
                output::format_receipt_human(&receipt)
            };
            println!("{}", output);
        }
        Command::Stats { json } => {
            let records = Records::new(engine::open_store(data_dir)?);
            let stats = records.stats().await?;
            let output = if json {
                output::format_json(&stats)
            } else {
                output::format_stats_human(&stats)
            };
            println!("{}", output);
        }
        Command::Recent { limit, json } => {
            let records = Records::new(engine::open_store(data_dir)?);
            let conversations = records.recent_conversations(limit).await?;
            let output = if json {
                output::format_json(&conversations)
            } else {
                output::format_conversations_human(&conversations)
            };
            println!("{}", output);
        }
        Command::FeedbackList { limit, json } => {
            let records = Records::new(engine::open_store(data_dir)?);
            let feedback = records.recent_feedback(limit).await?;
            let output = if json {
                output::format_json(&feedback)
            } else {
                output::format_feedback_human(&feedback)
            };
            println!("{}", output);
        }
        Command::Interventions { limit, json } => {
            let records = Records::new(engine::open_store(data_dir)?);
            let views = records.interventions(limit).await?;
            let output = if json {
                output::format_json(&views)
            } else {
                output::format_interventions_human(&views)
            };
            println!("{}", output);
        }
        Command::Health { json } => {
            let report = health_report(data_dir).await;
            let output = if json {
                output::format_json(&report)
            } else {
                output::format_health_human(&report)
            };
            println!("{}", output);
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Checks configuration, model files and the store. Never contacts services.
async fn health_report(data_dir: Option<&PathBuf>) -> HealthReport {
    let mut report = HealthReport::default();

    report = match Settings::from_env().and_then(|s| s.validate().map(|_| s)) {
        Ok(settings) => {
            let lookup = if settings.lookup_enabled() {
                "enabled".to_string()
            } else {
                "disabled (WOLFRAM_APP_ID not set)".to_string()
            };
            report
                .with_component(
                    "configuration",
                    true,
                    format!("model {}, collection {}", settings.gemini_model, settings.collection),
                )
                .with_component("lookup", true, lookup)
        }
        Err(e) => report.with_component("configuration", false, e.to_string()),
    };

    report = match config::find_model_dir() {
        Ok(dir) => report.with_component("embedding_model", true, dir.display().to_string()),
        Err(_) => report.with_component("embedding_model", false, "model files not found"),
    };

    match engine::open_store(data_dir) {
        Ok(store) => report.with_store(store.as_ref()).await,
        Err(e) => report.with_component("store", false, format!("{:#}", e)),
    }
}
