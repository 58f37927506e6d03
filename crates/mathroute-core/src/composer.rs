//! Answer composition: context text and the fixed instruction template.

use crate::generation::GenerationRequest;
use crate::types::{LookupResult, RetrievedMatch};

/// System instruction sent with every generation request.
pub const SYSTEM_INSTRUCTION: &str = "You are a math professor explaining step-by-step to a student.

CRITICAL FORMATTING RULES:
- Do NOT use LaTeX ($$, $, \\(...\\), \\[...\\], etc.)
- Write math using plain text and Unicode symbols (√, ², ³, ∫, ∑, π, etc.)
- For fractions: use '/' or Unicode fraction characters like ½, ¾
- For exponents: use superscript Unicode (x², x³) or write x^2, x^3
- For square roots: use √ symbol or write sqrt(...)
- For equations: write them on separate lines with clear labels
- End with a boxed final answer using text formatting (e.g., 'FINAL ANSWER: x = 3')
- Include a brief tip at the end.

Example output format:
Step 1: Identify the formula
For a quadratic equation ax² + bx + c = 0, the quadratic formula is:
x = (-b ± √(b² - 4ac)) / (2a)

FINAL ANSWER: x = (-b ± √(b² - 4ac)) / (2a)

TIP: Remember the discriminant b² - 4ac determines the number of solutions.";

/// Context used when neither the knowledge base nor the lookup produced anything.
pub const LLM_ONLY_CONTEXT: &str = "No KB or web results. Solve from first principles.";

const MATCH_SEPARATOR: &str = "\n\n---\n\n";

/// Formats knowledge-base matches as context blocks, in the given order.
pub fn knowledge_base_context(matches: &[RetrievedMatch]) -> String {
    matches
        .iter()
        .map(|m| {
            format!(
                "Problem: {}\nSolution: {}\n[Score={:.3}, Level={}, Type={}]",
                m.problem, m.solution, m.score, m.level, m.topic
            )
        })
        .collect::<Vec<_>>()
        .join(MATCH_SEPARATOR)
}

/// Formats a successful lookup as context.
pub fn web_context(result: &LookupResult) -> String {
    format!("WolframAlpha answer:\n{}", result.content)
}

/// Fills the user message template.
pub fn user_message(question: &str, context: &str) -> String {
    format!(
        "Question:\n{}\n\nContext:\n{}\n\nIf context is relevant, use it to teach and adapt the solution steps; otherwise solve from first principles with numbered steps and Unicode math notation.",
        question, context
    )
}

/// Builds the full generation request for a question and its context.
pub fn build_request(question: &str, context: &str) -> GenerationRequest {
    GenerationRequest {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: user_message(question, context),
    }
}
