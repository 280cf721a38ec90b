//! Memory entries

use crate::errors::{AppError, Result};
use crate::DEFAULT_LABEL;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entry submitted by a caller. Immutable once handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub title: String,

    pub content: String,

    /// Category tag
    #[serde(default = "default_label")]
    pub label: String,

    /// Free-text tags; order is not significant
    #[serde(default)]
    pub tags: Vec<String>,

    /// Open key-value map
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl MemoryEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            label: default_label(),
            tags: Vec::new(),
            metadata: empty_object(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Trim fields, default an empty label and canonicalise tags as a sorted set.
    ///
    /// Fails when the title is empty after trimming or metadata is not an object.
    pub fn normalized(mut self) -> Result<Self> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(AppError::Validation {
                message: "title must not be empty".to_string(),
                field: Some("title".to_string()),
            });
        }

        self.label = self.label.trim().to_string();
        if self.label.is_empty() {
            self.label = default_label();
        }

        let tags: BTreeSet<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.tags = tags.into_iter().collect();

        if self.metadata.is_null() {
            self.metadata = empty_object();
        }
        if !self.metadata.is_object() {
            return Err(AppError::Validation {
                message: "metadata must be a JSON object".to_string(),
                field: Some("metadata".to_string()),
            });
        }

        Ok(self)
    }
}

/// Entry as persisted by the store, with its engine-assigned identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Opaque identifier, unique within one store and never reused
    pub id: String,

    #[serde(flatten)]
    pub entry: MemoryEntry,

    /// ISO-8601 creation timestamp
    pub created_at: String,
}
