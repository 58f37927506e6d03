//! Output formatting for command results.
//!
//! Supports both human-readable terminal output and JSON for scripting.

use mathroute_core::service::{HealthReport, StatsSummary};
use mathroute_core::storage::{ConversationRecord, FeedbackReceipt, FeedbackRecord, InterventionView};
use mathroute_core::types::RoutingResult;
use serde::Serialize;

/// Maximum characters shown for answers and corrections in listings
const SNIPPET_MAX_LEN: usize = 120;

/// JSON output for an answered query
#[derive(Serialize)]
pub struct JsonAnswer<'a> {
    pub conversation_id: u64,
    #[serde(flatten)]
    pub result: &'a RoutingResult,
}

/// Formats any serializable value as pretty JSON.
pub fn format_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_answer_json(conversation_id: u64, result: &RoutingResult) -> String {
    format_json(&JsonAnswer {
        conversation_id,
        result,
    })
}

/// Formats an answer for the terminal.
pub fn format_answer_human(conversation_id: u64, result: &RoutingResult) -> String {
    let mut output = String::new();
    output.push_str(result.answer.trim_end());
    output.push_str("\n\n");
    output.push_str(&format!(
        "[source: {}, confidence: {:.2}",
        result.source, result.confidence_score
    ));
    if result.kb_matches > 0 {
        output.push_str(&format!(", {} KB match{}", result.kb_matches, plural_es(result.kb_matches)));
    }
    output.push_str(&format!(", conversation #{}]", conversation_id));
    output
}

pub fn format_receipt_human(receipt: &FeedbackReceipt) -> String {
    match receipt.intervention_id {
        Some(id) => format!(
            "Feedback #{} recorded. Correction queued for review as intervention #{}.",
            receipt.feedback_id, id
        ),
        None => format!("Feedback #{} recorded.", receipt.feedback_id),
    }
}

pub fn format_stats_human(stats: &StatsSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!("Conversations: {}\n", stats.total_conversations));
    output.push_str(&format!("Feedback:      {}\n", stats.total_feedback));
    if let Some(avg) = stats.avg_rating {
        output.push_str(&format!("Avg rating:    {:.2}\n", avg));
    }
    output.push_str(&format!(
        "Correct: {}  Incorrect: {}  Corrections: {}\n",
        stats.correct_count, stats.incorrect_count, stats.corrections_count
    ));

    if !stats.source_distribution.is_empty() {
        output.push_str("\nBy source:\n");
        for (source, count) in &stats.source_distribution {
            let confidence = stats
                .avg_confidence_by_source
                .get(source)
                .map(|c| format!("  (avg confidence {:.3})", c))
                .unwrap_or_default();
            output.push_str(&format!("  {:<15} {}{}\n", source.as_str(), count, confidence));
        }
    }

    output.trim_end().to_string()
}

pub fn format_conversations_human(records: &[ConversationRecord]) -> String {
    if records.is_empty() {
        return "No conversations yet.".to_string();
    }

    let mut output = String::new();
    for record in records {
        output.push_str(&format!(
            "#{} [{} {:.2}] {}\n   {}\n\n",
            record.id,
            record.source,
            record.confidence_score,
            record.query,
            truncate_text(&record.answer, SNIPPET_MAX_LEN)
        ));
    }
    output.trim_end().to_string()
}

pub fn format_feedback_human(records: &[FeedbackRecord]) -> String {
    if records.is_empty() {
        return "No feedback yet.".to_string();
    }

    let mut output = String::new();
    for record in records {
        let verdict = match record.is_correct {
            Some(true) => "correct",
            Some(false) => "incorrect",
            None => "unrated",
        };
        output.push_str(&format!(
            "#{} rating {}/5 ({}) {}\n",
            record.id, record.rating, verdict, record.query
        ));
        if let Some(correction) = &record.correction {
            output.push_str(&format!(
                "   correction: {}\n",
                truncate_text(correction, SNIPPET_MAX_LEN)
            ));
        }
        if let Some(notes) = &record.notes {
            output.push_str(&format!("   notes: {}\n", truncate_text(notes, SNIPPET_MAX_LEN)));
        }
    }
    output.trim_end().to_string()
}

pub fn format_interventions_human(views: &[InterventionView]) -> String {
    if views.is_empty() {
        return "No interventions pending.".to_string();
    }

    let mut output = String::new();
    for view in views {
        let i = &view.intervention;
        output.push_str(&format!(
            "#{} (feedback #{}, rating {}/5) {}\n   original:  {}\n   corrected: {}\n\n",
            i.id,
            i.feedback_id,
            view.rating,
            view.query,
            truncate_text(&i.original_answer, SNIPPET_MAX_LEN),
            truncate_text(&i.corrected_answer, SNIPPET_MAX_LEN)
        ));
    }
    output.trim_end().to_string()
}

pub fn format_health_human(report: &HealthReport) -> String {
    let mut output = format!("Status: {}\n", if report.is_healthy() { "healthy" } else { "degraded" });
    for (name, component) in &report.components {
        output.push_str(&format!(
            "  {} {:<16} {}\n",
            if component.healthy { "ok " } else { "ERR" },
            name,
            component.detail
        ));
    }
    output.trim_end().to_string()
}

fn plural_es(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "es"
    }
}

/// Truncates text to a maximum number of characters at a word boundary,
/// adding ellipsis if needed. Newlines are flattened.
fn truncate_text(text: &str, max_len: usize) -> String {
    let text = text.trim().replace('\n', " ");
    if text.chars().count() <= max_len {
        return text;
    }

    let truncated: String = text.chars().take(max_len).collect();
    match truncated.rfind(' ') {
        Some(last_space) => format!("{}...", &truncated[..last_space]),
        None => format!("{}...", truncated),
    }
}
