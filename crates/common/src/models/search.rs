//! Search and answer types
//!
//! Everything here is ephemeral: built per query, discarded after the caller
//! consumes it.

use serde::{Deserialize, Serialize};

/// Upper bound on terms a query rewrite may produce
pub const MAX_REWRITE_TERMS: usize = 8;

/// Ranking mode passed through to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Keyword ranking only
    #[default]
    #[serde(rename = "lex", alias = "lexical")]
    Lexical,
    /// Vector similarity only
    #[serde(rename = "sem", alias = "semantic")]
    Semantic,
    /// Keyword and vector rankings fused
    #[serde(rename = "auto", alias = "hybrid")]
    Auto,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Lexical => "lex",
            SearchMode::Semantic => "sem",
            SearchMode::Auto => "auto",
        }
    }
}

/// One ranked match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Back-reference into the store
    pub id: String,

    pub title: String,

    /// Relevance, higher is better, never negative
    pub score: f32,

    /// Excerpt of the content around the match
    pub snippet: String,

    pub label: String,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl SearchHit {
    /// Clamp the score into the finite, non-negative range
    pub fn sanitize_score(mut self) -> Self {
        if !self.score.is_finite() || self.score < 0.0 {
            self.score = 0.0;
        }
        self
    }
}

/// Which fallback tier produced a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Tier 0: the query as given
    Direct,
    /// Tier 1: keywords joined with OR
    AnyKeyword { query: String },
    /// Tier 2: one keyword on its own
    SingleKeyword { keyword: String },
    /// Tier 3: a term proposed by a language model
    Rewritten { term: String, model: String },
    /// Every tier came back empty
    Exhausted,
}

impl SearchStrategy {
    pub fn tier(&self) -> u8 {
        match self {
            SearchStrategy::Direct => 0,
            SearchStrategy::AnyKeyword { .. } => 1,
            SearchStrategy::SingleKeyword { .. } => 2,
            SearchStrategy::Rewritten { .. } => 3,
            SearchStrategy::Exhausted => 4,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SearchStrategy::Direct => "direct",
            SearchStrategy::AnyKeyword { .. } => "any_keyword",
            SearchStrategy::SingleKeyword { .. } => "single_keyword",
            SearchStrategy::Rewritten { .. } => "rewritten",
            SearchStrategy::Exhausted => "exhausted",
        }
    }

    /// Human description of a fallback, `None` for a direct match
    pub fn describe(&self) -> Option<String> {
        match self {
            SearchStrategy::Direct | SearchStrategy::Exhausted => None,
            SearchStrategy::AnyKeyword { query } => Some(format!("matched any of the keywords: {}", query)),
            SearchStrategy::SingleKeyword { keyword } => Some(format!("matched the keyword \"{}\"", keyword)),
            SearchStrategy::Rewritten { term, model } => {
                Some(format!("matched \"{}\" suggested by {}", term, model))
            }
        }
    }
}

/// Ranked hits of one search call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,

    /// Hit count after label filtering
    pub total_hits: usize,

    /// Wall-clock time from the first tier to the end of filtering
    pub search_time_ms: u64,

    pub strategy: SearchStrategy,
}

impl SearchResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Synthesized answer for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResult {
    pub answer: String,

    /// Hits the answer was grounded on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<SearchHit>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

/// Alternative search terms proposed by a language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRewriteResult {
    /// At most eight lower-cased, distinct, non-empty terms
    pub terms: Vec<String>,

    pub model: String,
}
