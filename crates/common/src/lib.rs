//! memvid-mcp Common Library
//!
//! Shared code for the memvid-mcp binaries including:
//! - Memory data model
//! - Single-file memory store and its engine trait
//! - Embedding client abstraction
//! - Language-model provider adapters
//! - Context pipeline (keywords, rewriting, formatting, synthesis)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod providers;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{MemoryStore, SqliteStore};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use providers::LlmProvider;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of hits returned by a search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Default label assigned to entries stored without one
pub const DEFAULT_LABEL: &str = "general";
