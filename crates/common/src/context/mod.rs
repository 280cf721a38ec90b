//! Context pipeline
//!
//! The layer between the store and the language model:
//! - Keyword extraction for fallback searches
//! - Query rewriting when keyword searches come back empty
//! - Context formatting and prompt construction
//! - Answer synthesis

mod formatter;
mod rewriter;
mod stopwords;
mod synthesizer;

pub use formatter::{build_messages, format_context, BLOCK_SEPARATOR, DEFAULT_PERSONA, NO_CONTEXT};
pub use rewriter::{build_prompt, finalize_terms, parse_terms, QueryRewriter, TermRewriter};
pub use stopwords::{extract_keywords, is_stopword};
pub use synthesizer::AnswerSynthesizer;
