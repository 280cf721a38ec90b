//! memvid-mcp search pipeline
//!
//! Tiered retrieval over a `MemoryStore`: the raw query first, then extracted
//! keywords, then model-suggested terms. Used by the MCP tool handlers.

mod orchestrator;

pub use orchestrator::{SearchOptions, SearchOrchestrator};
