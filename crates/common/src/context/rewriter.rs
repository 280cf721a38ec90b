//! Query rewriting: ask a language model for alternative search terms
//!
//! Model output is parsed leniently; a failed call or unusable output is
//! reported as `None`, never as an error.

use crate::metrics;
use crate::models::{QueryRewriteResult, MAX_REWRITE_TERMS};
use crate::providers::{ChatMessage, LlmProvider};
use async_trait::async_trait;
use regex_lite::Regex;
use std::sync::{Arc, OnceLock};

const REWRITE_INSTRUCTIONS: &str = "You help a keyword search engine find stored project memories. \
The search for the user's question found nothing. \
Extract the key concepts of the question and add synonyms in both German and English, \
including technical spellings and product names. \
Return ONLY a JSON array of at most 8 short search terms, for example [\"postgresql\", \"datenbank\"]. \
No explanation, no markdown.";

/// Source of alternative search terms for the last fallback tier
#[async_trait]
pub trait TermRewriter: Send + Sync {
    /// Propose terms for `question`, excluding the keywords in `attempted`
    async fn rewrite(&self, question: &str, attempted: &[String]) -> Option<QueryRewriteResult>;
}

/// Rewriter backed by a configured language model
pub struct QueryRewriter {
    provider: Arc<dyn LlmProvider>,
    model_hint: Option<String>,
}

impl QueryRewriter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, model_hint: None }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_hint = model;
        self
    }
}

pub fn build_prompt(question: &str, attempted: &[String]) -> Vec<ChatMessage> {
    let tried = if attempted.is_empty() {
        "none".to_string()
    } else {
        attempted.join(", ")
    };

    vec![
        ChatMessage::system(REWRITE_INSTRUCTIONS),
        ChatMessage::user(format!(
            "Question: {}\nAlready tried without results: {}",
            question, tried
        )),
    ]
}

#[async_trait]
impl TermRewriter for QueryRewriter {
    async fn rewrite(&self, question: &str, attempted: &[String]) -> Option<QueryRewriteResult> {
        let messages = build_prompt(question, attempted);

        let generation = match self.provider.generate(&messages, self.model_hint.as_deref()).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!(provider = self.provider.name(), error = %e, "Query rewrite failed");
                metrics::record_rewrite(false);
                return None;
            }
        };

        let terms = finalize_terms(parse_terms(&generation.text), attempted);
        metrics::record_rewrite(!terms.is_empty());
        tracing::debug!(model = %generation.model, terms = ?terms, "Query rewrite produced terms");

        if terms.is_empty() {
            None
        } else {
            Some(QueryRewriteResult { terms, model: generation.model })
        }
    }
}

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").ok())
        .as_ref()
}

fn array_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[.*?\]").ok()).as_ref()
}

fn json_terms(text: &str) -> Option<Vec<String>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(text).ok()?;
    Some(
        values
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
    )
}

/// Parse model output into search terms.
///
/// Layers, first success wins: Markdown fences are stripped, then the text is
/// read as a JSON array, then the first `[...]` substring is read as one, and
/// finally the text is split on commas and newlines with brackets and quotes
/// removed. Terms are trimmed, lower-cased and deduplicated; empties dropped.
pub fn parse_terms(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let text = fence_regex()
        .and_then(|re| re.captures(trimmed))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let terms = json_terms(text)
        .or_else(|| {
            array_regex()
                .and_then(|re| re.find(text))
                .and_then(|m| json_terms(m.as_str()))
        })
        .unwrap_or_else(|| {
            text.split([',', '\n'])
                .map(|part| {
                    part.trim()
                        .trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'' | '`'))
                        .to_string()
                })
                .collect()
        });

    let mut out: Vec<String> = Vec::new();
    for term in terms {
        let term = term.trim().to_lowercase();
        if !term.is_empty() && !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

/// Drop terms already attempted (case-insensitive) and cap the list
pub fn finalize_terms(terms: Vec<String>, attempted: &[String]) -> Vec<String> {
    let attempted: Vec<String> = attempted.iter().map(|a| a.trim().to_lowercase()).collect();
    let mut out: Vec<String> = Vec::new();

    for term in terms {
        let term = term.trim().to_lowercase();
        if term.is_empty() || attempted.contains(&term) || out.contains(&term) {
            continue;
        }
        out.push(term);
        if out.len() == MAX_REWRITE_TERMS {
            break;
        }
    }
    out
}
