//! Tool names, schemas and validated inputs

use memvid_common::errors::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

pub mod names {
    pub const STORE: &str = "memvid_store";
    pub const SEARCH: &str = "memvid_search";
    pub const ASK: &str = "memvid_ask";
    pub const TIMELINE: &str = "memvid_timeline";
    pub const STATS: &str = "memvid_stats";
}

/// Upper bound for every `limit`-style argument
pub const MAX_LIMIT: usize = 100;

/// Entry of the `tools/list` response
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            names::STORE,
            "Store a memory (decision, convention, finding) in the project memory file.",
            json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Short title of the memory" },
                    "content": { "type": "string", "description": "Full text of the memory" },
                    "label": { "type": "string", "description": "Category, defaults to \"general\"" },
                    "tags": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Free-text tags"
                    }
                },
                "required": ["title", "content"]
            }),
        ),
        ToolDefinition::new(
            names::SEARCH,
            "Search stored memories. Falls back to keywords and related terms when the query finds nothing.",
            json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search text" },
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "default": 10,
                        "description": "Maximum number of results"
                    },
                    "label": { "type": "string", "description": "Only return memories with this category" }
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::new(
            names::ASK,
            "Answer a question from stored memories. Returns the relevant memories when no language model is available.",
            json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "Question about the project" },
                    "contextLimit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "default": 5,
                        "description": "Number of memories used as context"
                    }
                },
                "required": ["question"]
            }),
        ),
        ToolDefinition::new(
            names::TIMELINE,
            "List the most recently stored memories, newest first.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_LIMIT,
                        "default": 10,
                        "description": "Number of entries"
                    }
                },
                "required": []
            }),
        ),
        ToolDefinition::new(
            names::STATS,
            "Show the memory file location, entry count, size and configured language model.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        ),
    ]
}

#[derive(Debug, Deserialize, Validate)]
pub struct StoreInput {
    #[validate(length(min = 1, max = 500))]
    pub title: String,

    #[validate(length(min = 1))]
    pub content: String,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchInput {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,

    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AskInput {
    #[validate(length(min = 1, max = 1000))]
    pub question: String,

    #[validate(range(min = 1, max = 100))]
    #[serde(default, rename = "contextLimit")]
    pub context_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct TimelineInput {
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Decode and validate tool arguments. Missing arguments read as `{}`.
pub fn parse_input<T>(arguments: Option<serde_json::Value>) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let arguments = match arguments {
        None | Some(serde_json::Value::Null) => json!({}),
        Some(value) => value,
    };

    let input: T = serde_json::from_value(arguments).map_err(|e| AppError::InvalidFormat {
        message: format!("invalid arguments: {}", e),
    })?;

    input.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    Ok(input)
}

/// Reject text that is empty once trimmed
pub fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation {
            message: format!("{} must not be empty", field),
            field: Some(field.to_string()),
        });
    }
    Ok(())
}
