//! Memory data model
//!
//! Write-side entries, stored entries, and the per-query search and
//! answer types shared by the store, the orchestrator and the tool server.

mod memory;
mod search;

pub use memory::{MemoryEntry, StoredEntry};
pub use search::{
    AskResult, QueryRewriteResult, SearchHit, SearchMode, SearchResult, SearchStrategy,
    MAX_REWRITE_TERMS,
};
