//! Single-file memory store
//!
//! Provides:
//! - The `MemoryStore` engine trait consumed by the search pipeline
//! - A SQLite implementation (FTS5 keyword ranking, optional vectors)
//! - Memory file location resolution
//! - Query and snippet helpers

mod fusion;
mod location;
pub mod models;
mod query;
mod repository;

pub use fusion::RRFusion;
pub use location::{resolve_location, LocationSource, MemoryLocation, MEMORY_DIR, MEMORY_FILE};
pub use query::{make_snippet, FtsQuery};
pub use repository::SqliteStore;

use crate::errors::{AppError, Result};
use crate::models::{MemoryEntry, SearchHit, SearchMode, StoredEntry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options for a ranked search
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Maximum hits
    pub k: usize,

    pub mode: SearchMode,

    /// Snippet length in characters (0 keeps the whole content)
    pub snippet_chars: usize,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            k: crate::DEFAULT_SEARCH_LIMIT,
            mode: SearchMode::Lexical,
            snippet_chars: 200,
        }
    }
}

/// Options for the engine-level ask
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub k: usize,

    /// Model the engine should answer with, if it can
    pub model: Option<String>,

    /// Return the retrieved context instead of an answer
    pub context_only: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            k: 5,
            model: None,
            context_only: true,
        }
    }
}

/// Engine-level answer: text plus the hits it was built from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAnswer {
    pub text: String,
    pub context: Vec<SearchHit>,
}

/// Options for the chronological listing
#[derive(Debug, Clone)]
pub struct TimelineOptions {
    pub limit: usize,

    /// Newest first
    pub reverse: bool,
}

impl Default for TimelineOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            reverse: true,
        }
    }
}

/// Store size counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of stored entries
    pub frame_count: u64,

    pub size_bytes: u64,
}

/// Storage engine consumed by the search and answer pipeline.
///
/// Implementations own their own consistency; callers never lock around them.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist an entry and return its new identifier
    async fn put(&self, entry: MemoryEntry) -> Result<String>;

    /// Ranked search. Terms are ANDed; an uppercase `OR` between terms is a
    /// disjunction. A query without terms matches nothing.
    async fn find(&self, query: &str, options: &FindOptions) -> Result<Vec<SearchHit>>;

    /// Context retrieval for a question. The default engine has no model of
    /// its own, so only `context_only` requests succeed.
    async fn ask(&self, question: &str, options: &AskOptions) -> Result<EngineAnswer> {
        if !options.context_only {
            return Err(AppError::AskError {
                message: format!(
                    "engine-side synthesis is not supported (model: {})",
                    options.model.as_deref().unwrap_or("default")
                ),
            });
        }

        let find = FindOptions {
            k: options.k,
            mode: SearchMode::Lexical,
            snippet_chars: 400,
        };
        let context = self.find(question, &find).await?;
        let text = context
            .iter()
            .map(|hit| format!("{}: {}", hit.title, hit.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");

        Ok(EngineAnswer { text, context })
    }

    /// Entries in creation order
    async fn timeline(&self, options: &TimelineOptions) -> Result<Vec<StoredEntry>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Flush and close. Every later call fails with `NotInitialized`.
    async fn seal(&self) -> Result<()>;
}
