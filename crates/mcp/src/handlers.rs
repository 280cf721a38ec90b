//! Tool handlers
//!
//! Each tool returns text for the agent. Empty memory and zero hits are
//! informational results; only real failures set `isError`.

use crate::tools::{self, names, AskInput, SearchInput, StoreInput, TimelineInput};
use memvid_common::config::SearchConfig;
use memvid_common::context::{format_context, AnswerSynthesizer};
use memvid_common::db::{MemoryLocation, MemoryStore, TimelineOptions};
use memvid_common::errors::{AppError, Result};
use memvid_common::models::{AskResult, MemoryEntry, SearchHit, SearchResult};
use memvid_search::{SearchOptions, SearchOrchestrator};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use validator::Validate;

pub const EMPTY_MEMORY: &str =
    "The memory is empty. Store decisions and findings with memvid_store first.";

/// Text result of one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: false }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { text: text.into(), is_error: true }
    }

    /// MCP `tools/call` result body
    pub fn to_value(&self) -> serde_json::Value {
        json!({
            "content": [{ "type": "text", "text": self.text }],
            "isError": self.is_error
        })
    }
}

pub struct ToolHandlers {
    orchestrator: SearchOrchestrator,
    synthesizer: AnswerSynthesizer,
    search: SearchConfig,
    location: Option<MemoryLocation>,
}

impl ToolHandlers {
    pub fn new(
        orchestrator: SearchOrchestrator,
        synthesizer: AnswerSynthesizer,
        search: SearchConfig,
    ) -> Self {
        Self {
            orchestrator,
            synthesizer,
            search,
            location: None,
        }
    }

    /// Resolved memory file, reported by `memvid_stats`
    pub fn with_location(mut self, location: Option<MemoryLocation>) -> Self {
        self.location = location;
        self
    }

    fn store(&self) -> &Arc<dyn MemoryStore> {
        self.orchestrator.store()
    }

    /// Run one tool.
    ///
    /// Only an unknown tool name is returned as an error, so the transport
    /// can answer with invalid-params. Bad arguments and every other failure
    /// are rendered as an error output.
    pub async fn call(&self, name: &str, arguments: Option<serde_json::Value>) -> Result<ToolOutput> {
        let outcome = match name {
            names::STORE => with_input(arguments, |input| self.store_memory(input)).await,
            names::SEARCH => with_input(arguments, |input| self.search(input)).await,
            names::ASK => with_input(arguments, |input| self.ask(input)).await,
            names::TIMELINE => with_input(arguments, |input| self.timeline(input)).await,
            names::STATS => self.stats().await,
            other => {
                return Err(AppError::InvalidFormat {
                    message: format!("unknown tool '{}'", other),
                })
            }
        };

        match outcome {
            Ok(output) => Ok(output),
            Err(e @ (AppError::Validation { .. } | AppError::InvalidFormat { .. })) => {
                tracing::warn!(tool = name, error = %e, "Rejected tool arguments");
                Ok(ToolOutput::error(e.user_message()))
            }
            Err(e) => {
                tracing::error!(tool = name, error = %e, code = ?e.code(), "Tool call failed");
                Ok(ToolOutput::error(e.user_message()))
            }
        }
    }

    async fn store_memory(&self, input: StoreInput) -> Result<ToolOutput> {
        tools::require_text("title", &input.title)?;
        tools::require_text("content", &input.content)?;

        let mut entry = MemoryEntry::new(input.title, input.content).with_tags(input.tags);
        if let Some(label) = input.label {
            entry = entry.with_label(label);
        }
        let entry = entry.normalized()?;

        let id = self.store().put(entry.clone()).await?;
        tracing::info!(id = %id, label = %entry.label, "Memory stored");

        let mut text = format!(
            "Stored memory \"{}\"\nID: {}\nLabel: {}",
            entry.title, id, entry.label
        );
        if !entry.tags.is_empty() {
            text.push_str(&format!("\nTags: {}", entry.tags.join(", ")));
        }
        Ok(ToolOutput::text(text))
    }

    async fn search(&self, input: SearchInput) -> Result<ToolOutput> {
        tools::require_text("query", &input.query)?;

        let options = SearchOptions {
            limit: input.limit.unwrap_or(self.search.default_limit),
            label: input.label.filter(|l| !l.trim().is_empty()),
            mode: self.search.mode,
            snippet_chars: self.search.snippet_chars,
        };
        let result = self.orchestrator.search(&input.query, &options).await?;

        if result.is_empty() {
            let scope = match &options.label {
                Some(label) => format!(" with label \"{}\"", label),
                None => String::new(),
            };
            return Ok(ToolOutput::text(format!(
                "No memories found for \"{}\"{}. Try different keywords.",
                input.query, scope
            )));
        }

        Ok(ToolOutput::text(render_search(&input.query, &result)))
    }

    async fn ask(&self, input: AskInput) -> Result<ToolOutput> {
        tools::require_text("question", &input.question)?;

        if self.store().stats().await?.frame_count == 0 {
            return Ok(ToolOutput::text(EMPTY_MEMORY));
        }

        let options = SearchOptions {
            limit: input.context_limit.unwrap_or(self.search.ask_context_limit),
            label: None,
            mode: self.search.mode,
            snippet_chars: self.search.snippet_chars,
        };
        let result = self.orchestrator.search(&input.question, &options).await?;

        if result.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No relevant memories found for \"{}\". Try different keywords or store more context.",
                input.question
            )));
        }

        match self.synthesizer.synthesize(&input.question, &result.hits, None).await {
            Ok(Some(answer)) => Ok(ToolOutput::text(render_answer(&answer))),
            Ok(None) => Ok(ToolOutput::text(format!(
                "No language model is configured. Relevant memories:\n\n{}",
                format_context(&result.hits)
            ))),
            Err(e) => {
                tracing::warn!(error = %e, "Answer synthesis failed, returning context only");
                let fallback = AnswerSynthesizer::context_only(&result.hits);
                Ok(ToolOutput::text(format!(
                    "{} Relevant memories:\n\n{}",
                    e.user_message(),
                    fallback.answer
                )))
            }
        }
    }

    async fn timeline(&self, input: TimelineInput) -> Result<ToolOutput> {
        let options = TimelineOptions {
            limit: input.limit.unwrap_or(10),
            reverse: true,
        };
        let entries = self.store().timeline(&options).await?;

        if entries.is_empty() {
            return Ok(ToolOutput::text(EMPTY_MEMORY));
        }

        let lines: Vec<String> = entries
            .iter()
            .map(|stored| {
                format!(
                    "[{}] {} ({})\n    {}",
                    stored.created_at,
                    stored.entry.title,
                    stored.entry.label,
                    preview(&stored.entry.content, 120)
                )
            })
            .collect();

        Ok(ToolOutput::text(format!(
            "Last {} memories, newest first:\n\n{}",
            entries.len(),
            lines.join("\n")
        )))
    }

    async fn stats(&self) -> Result<ToolOutput> {
        let stats = self.store().stats().await?;

        let mut text = String::new();
        match &self.location {
            Some(location) => {
                text.push_str(&format!("Memory file: {}\n", location.path.display()));
                text.push_str(&format!(
                    "Location: {} ({})\n",
                    location.source.as_str(),
                    if location.existed { "existing" } else { "created" }
                ));
            }
            None => text.push_str("Memory file: in-memory\n"),
        }
        text.push_str(&format!("Entries: {}\n", stats.frame_count));
        text.push_str(&format!("Size: {}\n", human_size(stats.size_bytes)));

        match self.synthesizer.provider() {
            Some(provider) => text.push_str(&format!(
                "Language model: {} ({})",
                provider.name(),
                provider.default_model()
            )),
            None => text.push_str("Language model: none (ask returns raw context)"),
        }

        Ok(ToolOutput::text(text))
    }
}

/// Parse and validate the arguments, then run the tool on them
async fn with_input<T, F, Fut>(arguments: Option<serde_json::Value>, tool: F) -> Result<ToolOutput>
where
    T: DeserializeOwned + Validate,
    F: FnOnce(T) -> Fut,
    Fut: Future<Output = Result<ToolOutput>>,
{
    tool(tools::parse_input(arguments)?).await
}

fn render_search(query: &str, result: &SearchResult) -> String {
    let mut text = format!(
        "Found {} memories for \"{}\" in {} ms",
        result.total_hits, query, result.search_time_ms
    );
    if let Some(fallback) = result.strategy.describe() {
        text.push_str(&format!(" ({})", fallback));
    }
    text.push_str(":\n\n");
    text.push_str(&render_hits(&result.hits));
    text
}

fn render_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} ({}, score {:.2})\n    {}",
                i + 1,
                hit.title,
                hit.label,
                hit.score,
                hit.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_answer(answer: &AskResult) -> String {
    let mut text = answer.answer.clone();

    if let Some(context) = answer.context.as_deref().filter(|c| !c.is_empty()) {
        text.push_str("\n\nSources:");
        for (i, hit) in context.iter().enumerate() {
            text.push_str(&format!("\n[{}] {}", i + 1, hit.title));
        }
    }

    if let (Some(provider), Some(model)) = (&answer.provider, &answer.model) {
        text.push_str(&format!("\n\nModel: {}/{}", provider, model));
        if let Some(tokens) = answer.tokens_used {
            text.push_str(&format!(", {} tokens", tokens));
        }
    }
    text
}

fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{} B", bytes)
    } else if bytes_f < KIB * KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    }
}
