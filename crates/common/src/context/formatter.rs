//! Context formatting for answer synthesis

use crate::models::SearchHit;
use crate::providers::ChatMessage;

/// Context text when nothing was retrieved
pub const NO_CONTEXT: &str = "No relevant memories found.";

/// Separator between rendered hits
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// Persona used when neither the caller nor the configuration supplies one
pub const DEFAULT_PERSONA: &str = "You are a memory assistant for a software project. \
Answer the question using only the memories provided. Refer to memories by their [n] number. \
If the memories do not contain the answer, say so plainly instead of guessing. \
Answer in the language of the question and keep it short.";

/// Render hits as numbered blocks
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_CONTEXT.to_string();
    }

    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut block = format!("[{}]", i + 1);
            if !hit.title.trim().is_empty() {
                block.push_str(&format!(" Title: {}", hit.title));
            }
            if !hit.label.trim().is_empty() {
                block.push_str(&format!("\nCategory: {}", hit.label));
            }
            block.push_str(&format!("\nContent: {}", hit.snippet));
            block
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// System persona followed by one user message carrying context and question
pub fn build_messages(question: &str, hits: &[SearchHit], persona: Option<&str>) -> Vec<ChatMessage> {
    let persona = persona
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_PERSONA);

    let user = format!(
        "Memories:\n\n{}\n\nQuestion: {}",
        format_context(hits),
        question
    );

    vec![ChatMessage::system(persona), ChatMessage::user(user)]
}
