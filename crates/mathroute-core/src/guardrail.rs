//! Content guardrail.
//!
//! A query is rejected when its lower-cased text contains any denylisted term
//! as a substring. Matching is deliberately coarse: "shack" is rejected
//! because it contains "hack".

/// Built-in denylist.
pub const DEFAULT_DENYLIST: &[&str] = &["politics", "religion", "weapon", "nsfw", "hack", "adult"];

/// Fixed answer returned for rejected queries.
pub const REFUSAL_MESSAGE: &str = "Only mathematics content allowed.";

/// Denylist check run before any retrieval or generation.
#[derive(Debug, Clone)]
pub struct ContentGuardrail {
    terms: Vec<String>,
}

impl Default for ContentGuardrail {
    fn default() -> Self {
        Self::new(DEFAULT_DENYLIST.iter().copied())
    }
}

impl ContentGuardrail {
    /// Builds a guardrail from denylist terms. Terms are lower-cased; empty
    /// terms are dropped (an empty term would match every query).
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { terms }
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Returns true if the query may proceed.
    pub fn allow(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        !self.terms.iter().any(|term| lowered.contains(term.as_str()))
    }
}
