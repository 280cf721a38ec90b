//! Tiered search fallback
//!
//! Tiers run strictly in order and the first tier with hits wins:
//! 0. the query as given
//! 1. extracted keywords joined with OR
//! 2. each keyword on its own, in extraction order
//! 3. terms proposed by a rewriter, one at a time (only when one is configured)
//!
//! The label filter applies to the winning tier's hits only; an empty
//! filtered result is final.

use memvid_common::context::{extract_keywords, TermRewriter};
use memvid_common::db::{FindOptions, MemoryStore};
use memvid_common::errors::{AppError, Result};
use memvid_common::metrics;
use memvid_common::models::{SearchHit, SearchMode, SearchResult, SearchStrategy};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Per-call search options
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum hits
    pub limit: usize,

    /// Keep only hits with exactly this label
    pub label: Option<String>,

    pub mode: SearchMode,

    pub snippet_chars: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: memvid_common::DEFAULT_SEARCH_LIMIT,
            label: None,
            mode: SearchMode::Lexical,
            snippet_chars: 200,
        }
    }
}

/// Runs the fallback tiers against an injected store
#[derive(Clone)]
pub struct SearchOrchestrator {
    store: Arc<dyn MemoryStore>,
    rewriter: Option<Arc<dyn TermRewriter>>,
}

impl SearchOrchestrator {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store, rewriter: None }
    }

    /// Enable the rewrite tier
    pub fn with_rewriter(mut self, rewriter: Option<Arc<dyn TermRewriter>>) -> Self {
        self.rewriter = rewriter;
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn has_rewriter(&self) -> bool {
        self.rewriter.is_some()
    }

    /// Search with fallback. Store failures abort the call as `SearchError`.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResult> {
        let start = Instant::now();
        let find = FindOptions {
            k: options.limit.max(1),
            mode: options.mode,
            snippet_chars: options.snippet_chars,
        };

        let (hits, strategy) = self.run_tiers(query, &find).await?;

        let hits: Vec<SearchHit> = match options.label.as_deref() {
            Some(label) => hits.into_iter().filter(|h| h.label == label).collect(),
            None => hits,
        };

        let search_time_ms = start.elapsed().as_millis() as u64;
        metrics::record_search(start.elapsed().as_secs_f64(), strategy.name(), hits.len());
        tracing::info!(
            strategy = strategy.name(),
            tier = strategy.tier(),
            hits = hits.len(),
            label = options.label.as_deref().unwrap_or(""),
            search_time_ms,
            "Search completed"
        );

        Ok(SearchResult {
            total_hits: hits.len(),
            hits,
            search_time_ms,
            strategy,
        })
    }

    async fn run_tiers(&self, query: &str, find: &FindOptions) -> Result<(Vec<SearchHit>, SearchStrategy)> {
        let hits = self.find(query, find).await?;
        if !hits.is_empty() {
            return Ok((hits, SearchStrategy::Direct));
        }

        let keywords = extract_keywords(query);

        if !keywords.is_empty() {
            let any = keywords.join(" OR ");
            let hits = self.find(&any, find).await?;
            if !hits.is_empty() {
                return Ok((hits, SearchStrategy::AnyKeyword { query: any }));
            }
        }

        for keyword in &keywords {
            let hits = self.find(keyword, find).await?;
            if !hits.is_empty() {
                return Ok((hits, SearchStrategy::SingleKeyword { keyword: keyword.clone() }));
            }
        }

        if let Some(rewriter) = &self.rewriter {
            if let Some(rewrite) = rewriter.rewrite(query, &keywords).await {
                for term in rewrite.terms {
                    let hits = self.find(&term, find).await?;
                    if !hits.is_empty() {
                        return Ok((
                            hits,
                            SearchStrategy::Rewritten { term, model: rewrite.model },
                        ));
                    }
                }
            }
        }

        Ok((Vec::new(), SearchStrategy::Exhausted))
    }

    async fn find(&self, query: &str, find: &FindOptions) -> Result<Vec<SearchHit>> {
        tracing::debug!(query = %query, "Search tier query");

        let hits = self.store.find(query, find).await.map_err(|e| match e {
            AppError::SearchError { .. } => e,
            other => AppError::SearchError {
                message: other.to_string(),
            },
        })?;

        let mut hits: Vec<SearchHit> = hits.into_iter().map(SearchHit::sanitize_score).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(find.k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memvid_common::db::{StoreStats, TimelineOptions};
    use memvid_common::models::{MemoryEntry, QueryRewriteResult, StoredEntry};
    use memvid_common::SqliteStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    /// Store that answers from a fixed query → hits table and records queries
    #[derive(Default)]
    struct ScriptedStore {
        answers: HashMap<String, Vec<SearchHit>>,
        failing: Option<String>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn answer(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
            self.answers.insert(query.to_string(), hits);
            self
        }

        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MemoryStore for ScriptedStore {
        async fn put(&self, _: MemoryEntry) -> Result<String> {
            Ok("id".to_string())
        }

        async fn find(&self, query: &str, _: &FindOptions) -> Result<Vec<SearchHit>> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.failing.as_deref() == Some(query) {
                return Err(AppError::StoreError { message: "disk on fire".to_string() });
            }
            Ok(self.answers.get(query).cloned().unwrap_or_default())
        }

        async fn timeline(&self, _: &TimelineOptions) -> Result<Vec<StoredEntry>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats { frame_count: 0, size_bytes: 0 })
        }

        async fn seal(&self) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedRewriter {
        terms: Option<Vec<&'static str>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedRewriter {
        fn new(terms: Option<Vec<&'static str>>) -> Arc<Self> {
            Arc::new(Self { terms, seen: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl TermRewriter for ScriptedRewriter {
        async fn rewrite(&self, _: &str, attempted: &[String]) -> Option<QueryRewriteResult> {
            self.seen.lock().unwrap().extend_from_slice(attempted);
            self.terms.as_ref().map(|terms| QueryRewriteResult {
                terms: terms.iter().map(|t| t.to_string()).collect(),
                model: "rewrite-model".to_string(),
            })
        }
    }

    fn hit(id: &str, label: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: format!("Title {}", id),
            score: 1.0,
            snippet: "snippet".to_string(),
            label: label.to_string(),
            metadata: serde_json::json!({}),
        }
    }

    fn orchestrator(store: ScriptedStore) -> (SearchOrchestrator, Arc<ScriptedStore>) {
        let store = Arc::new(store);
        (SearchOrchestrator::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_direct_hits_do_not_escalate() {
        let (orch, store) = orchestrator(
            ScriptedStore::default().answer("docker container", vec![hit("1", "general")]),
        );

        let result = orch.search("docker container", &SearchOptions::default()).await.unwrap();

        assert_eq!(result.strategy, SearchStrategy::Direct);
        assert_eq!(result.total_hits, 1);
        assert_eq!(store.queries(), vec!["docker container"]);
    }

    #[tokio::test]
    async fn test_or_tier_stops_before_single_keywords() {
        let (orch, store) = orchestrator(
            ScriptedStore::default()
                .answer("docker OR container", vec![hit("1", "general")])
                .answer("docker", vec![hit("2", "general")]),
        );

        let result = orch.search("the Docker container?", &SearchOptions::default()).await.unwrap();

        assert_eq!(
            result.strategy,
            SearchStrategy::AnyKeyword { query: "docker OR container".to_string() }
        );
        assert_eq!(result.hits[0].id, "1");
        assert_eq!(store.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_single_keyword_sweep_in_order() {
        let (orch, store) = orchestrator(
            ScriptedStore::default()
                .answer("container", vec![hit("c", "general")])
                .answer("setup", vec![hit("s", "general")]),
        );

        let result = orch
            .search("docker container setup", &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(
            result.strategy,
            SearchStrategy::SingleKeyword { keyword: "container".to_string() }
        );
        assert_eq!(
            store.queries(),
            vec![
                "docker container setup",
                "docker OR container OR setup",
                "docker",
                "container",
            ]
        );
    }

    #[tokio::test]
    async fn test_rewrite_tier_receives_attempted_keywords() {
        let rewriter = ScriptedRewriter::new(Some(vec!["pg", "postgresql"]));
        let (orch, _) = orchestrator(
            ScriptedStore::default().answer("postgresql", vec![hit("1", "general")]),
        );
        let orch = orch.with_rewriter(Some(rewriter.clone()));

        let result = orch.search("database", &SearchOptions::default()).await.unwrap();

        assert_eq!(
            result.strategy,
            SearchStrategy::Rewritten {
                term: "postgresql".to_string(),
                model: "rewrite-model".to_string()
            }
        );
        assert_eq!(*rewriter.seen.lock().unwrap(), vec!["database".to_string()]);
    }

    #[tokio::test]
    async fn test_without_rewriter_exhausts() {
        let (orch, store) = orchestrator(ScriptedStore::default());
        let result = orch.search("database", &SearchOptions::default()).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.strategy, SearchStrategy::Exhausted);
        assert_eq!(store.queries().len(), 3);
    }

    #[tokio::test]
    async fn test_rewriter_without_terms_exhausts() {
        let (orch, _) = orchestrator(ScriptedStore::default());
        let orch = orch.with_rewriter(Some(ScriptedRewriter::new(None)));

        let result = orch.search("database", &SearchOptions::default()).await.unwrap();
        assert_eq!(result.strategy, SearchStrategy::Exhausted);
        assert_eq!(result.total_hits, 0);
    }

    #[tokio::test]
    async fn test_stopword_only_query_skips_keyword_tiers() {
        let (orch, store) = orchestrator(ScriptedStore::default());
        let result = orch.search("what is the?", &SearchOptions::default()).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(store.queries(), vec!["what is the?"]);
    }

    #[tokio::test]
    async fn test_label_filter_is_post_filter() {
        let hits = vec![
            hit("1", "decision"),
            hit("2", "general"),
            hit("3", "decision"),
            hit("4", "bug"),
            hit("5", "general"),
        ];
        let (orch, store) = orchestrator(ScriptedStore::default().answer("deploy", hits));
        let options = SearchOptions {
            label: Some("decision".to_string()),
            ..SearchOptions::default()
        };

        let result = orch.search("deploy", &options).await.unwrap();

        assert_eq!(result.total_hits, 2);
        assert!(result.hits.iter().all(|h| h.label == "decision"));
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_label_filtered_empty_is_final() {
        let (orch, store) = orchestrator(
            ScriptedStore::default()
                .answer("deploy pipeline", vec![hit("1", "general")])
                .answer("deploy", vec![hit("2", "decision")]),
        );
        let options = SearchOptions {
            label: Some("decision".to_string()),
            ..SearchOptions::default()
        };

        let result = orch.search("deploy pipeline", &options).await.unwrap();

        assert!(result.is_empty());
        assert_eq!(result.strategy, SearchStrategy::Direct);
        assert_eq!(store.queries().len(), 1);
    }

    #[tokio::test]
    async fn test_store_error_aborts_as_search_error() {
        let store = ScriptedStore {
            failing: Some("docker OR container".to_string()),
            ..ScriptedStore::default()
        };
        let (orch, _) = orchestrator(store);

        let err = orch.search("docker container", &SearchOptions::default()).await.unwrap_err();
        assert!(matches!(err, AppError::SearchError { .. }));
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let hits = (0..8).map(|i| hit(&i.to_string(), "general")).collect();
        let (orch, _) = orchestrator(ScriptedStore::default().answer("many", hits));
        let options = SearchOptions { limit: 3, ..SearchOptions::default() };

        let result = assert_ok!(orch.search("many", &options).await);
        assert_eq!(result.hits.len(), 3);
    }

    #[tokio::test]
    async fn test_hits_ordered_by_score_before_limit() {
        let scored = |id: &str, score: f32| SearchHit { score, ..hit(id, "general") };
        let hits = vec![scored("low", 0.1), scored("top", 5.0), scored("mid", 2.0), scored("nan", f32::NAN)];
        let (orch, _) = orchestrator(ScriptedStore::default().answer("mixed", hits));
        let options = SearchOptions { limit: 2, ..SearchOptions::default() };

        let result = assert_ok!(orch.search("mixed", &options).await);
        let ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["top", "mid"]);
        assert_eq!(result.hits[0].score, 5.0);
    }

    #[tokio::test]
    async fn test_rewrite_finds_entry_in_real_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put(MemoryEntry::new("DB choice", "Uses PostgreSQL"))
            .await
            .unwrap();

        let orch = SearchOrchestrator::new(Arc::new(store))
            .with_rewriter(Some(ScriptedRewriter::new(Some(vec!["postgresql"]))));

        let result = orch.search("database", &SearchOptions::default()).await.unwrap();

        assert_eq!(result.total_hits, 1);
        assert_eq!(result.hits[0].title, "DB choice");
        assert_eq!(result.strategy.tier(), 3);
    }
}
