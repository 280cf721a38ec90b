//! SQLite-backed memory store
//!
//! One file per store. Keyword ranking uses an external-content FTS5 index kept
//! in sync by an insert trigger; vectors live in a BLOB column and are ranked
//! in process.

use super::fusion::RRFusion;
use super::location::MemoryLocation;
use super::models::{MemoryActiveModel, MemoryColumn, MemoryEntity, MemoryRow};
use super::query::{fts_expression, make_snippet, FtsQuery};
use super::{FindOptions, MemoryStore, StoreStats, TimelineOptions};
use crate::embeddings::{cosine_similarity, decode_vector, encode_vector, Embedder};
use crate::errors::{AppError, Result};
use crate::models::{MemoryEntry, SearchHit, SearchMode, StoredEntry};
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlxSqliteConnector,
    Statement,
};
use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sea_orm::sqlx::ConnectOptions as _;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS memories (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        label TEXT NOT NULL,
        tags TEXT NOT NULL,
        metadata TEXT NOT NULL,
        embedding BLOB,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at)",
    "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
        title, content, tags,
        content='memories', content_rowid='seq',
        tokenize='unicode61 remove_diacritics 2'
    )",
    "CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
        INSERT INTO memories_fts(rowid, title, content, tags)
        VALUES (new.seq, new.title, new.content, new.tags);
    END",
];

// Column weights for title, content, tags
const KEYWORD_SQL: &str = "SELECT m.id, m.title, m.content, m.label, m.metadata, \
        bm25(memories_fts, 10.0, 1.0, 5.0) AS rank \
    FROM memories_fts JOIN memories m ON m.seq = memories_fts.rowid \
    WHERE memories_fts MATCH ? \
    ORDER BY rank \
    LIMIT ?";

const DEFAULT_MIN_SIMILARITY: f32 = 0.3;

async fn init_schema(conn: &DatabaseConnection) -> Result<()> {
    for ddl in SCHEMA {
        conn.execute_unprepared(ddl).await?;
    }
    Ok(())
}

/// Memory store over a single SQLite file
pub struct SqliteStore {
    conn: RwLock<Option<DatabaseConnection>>,
    location: Option<MemoryLocation>,
    embedder: Option<Arc<dyn Embedder>>,
    min_similarity: f32,
    fusion: RRFusion,
}

impl SqliteStore {
    /// Open (or create) the store at a resolved location
    pub async fn open(location: MemoryLocation) -> Result<Self> {
        if let Some(parent) = location.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&location.path)
            .create_if_missing(true)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::FileError {
                message: format!("{}: {}", location.path.display(), e),
            })?;
        let conn = SqlxSqliteConnector::from_sqlx_sqlite_pool(pool);
        init_schema(&conn).await?;

        tracing::info!(
            path = %location.path.display(),
            source = location.source.as_str(),
            existed = location.existed,
            "Memory store opened"
        );

        Ok(Self::from_connection(conn, Some(location)))
    }

    /// Private in-memory store, gone when dropped
    pub async fn in_memory() -> Result<Self> {
        let conn = Self::connect("sqlite::memory:").await?;
        Ok(Self::from_connection(conn, None))
    }

    async fn connect(url: &str) -> Result<DatabaseConnection> {
        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        init_schema(&conn).await?;
        Ok(conn)
    }

    fn from_connection(conn: DatabaseConnection, location: Option<MemoryLocation>) -> Self {
        Self {
            conn: RwLock::new(Some(conn)),
            location,
            embedder: None,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            fusion: RRFusion::default(),
        }
    }

    /// Enable vector ranking; entries stored from now on carry an embedding
    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// File location, `None` for in-memory stores
    pub fn location(&self) -> Option<&MemoryLocation> {
        self.location.as_ref()
    }

    async fn connection(&self) -> Result<DatabaseConnection> {
        self.conn.read().await.clone().ok_or(AppError::NotInitialized)
    }

    async fn keyword_hits(
        &self,
        conn: &DatabaseConnection,
        fts: &FtsQuery,
        k: usize,
        snippet_chars: usize,
    ) -> Result<Vec<SearchHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Sqlite,
            KEYWORD_SQL,
            vec![
                sea_orm::Value::from(fts.expression.clone()),
                sea_orm::Value::from(k as i64),
            ],
        );

        let rows = conn
            .query_all(stmt)
            .await
            .map_err(|e| AppError::SearchError {
                message: format!("Keyword query failed: {}", e),
            })?;

        let hits = rows
            .into_iter()
            .filter_map(|row| {
                let content: String = row.try_get_by_index(2).ok()?;
                let metadata: String = row.try_get_by_index(4).ok()?;
                let rank: f64 = row.try_get_by_index(5).ok()?;
                Some(
                    SearchHit {
                        id: row.try_get_by_index(0).ok()?,
                        title: row.try_get_by_index(1).ok()?,
                        score: (-rank) as f32,
                        snippet: make_snippet(&content, &fts.terms, snippet_chars),
                        label: row.try_get_by_index(3).ok()?,
                        metadata: parse_metadata(&metadata),
                    }
                    .sanitize_score(),
                )
            })
            .collect();

        Ok(hits)
    }

    async fn vector_hits(
        &self,
        conn: &DatabaseConnection,
        embedder: &dyn Embedder,
        query: &str,
        terms: &[String],
        k: usize,
        snippet_chars: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vector = embedder.embed(query).await?;

        let rows = MemoryEntity::find()
            .filter(MemoryColumn::Embedding.is_not_null())
            .all(conn)
            .await?;

        let mut scored: Vec<(f32, MemoryRow)> = rows
            .into_iter()
            .filter_map(|row| {
                let vector = decode_vector(row.embedding.as_deref()?);
                let similarity = cosine_similarity(&query_vector, &vector);
                (similarity >= self.min_similarity).then_some((similarity, row))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(similarity, row)| {
                SearchHit {
                    snippet: make_snippet(&row.content, terms, snippet_chars),
                    metadata: parse_metadata(&row.metadata),
                    id: row.id,
                    title: row.title,
                    score: similarity,
                    label: row.label,
                }
                .sanitize_score()
            })
            .collect())
    }
}

fn parse_metadata(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

fn to_stored(row: MemoryRow) -> StoredEntry {
    StoredEntry {
        id: row.id,
        entry: MemoryEntry {
            title: row.title,
            content: row.content,
            label: row.label,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            metadata: parse_metadata(&row.metadata),
        },
        created_at: row.created_at,
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn put(&self, entry: MemoryEntry) -> Result<String> {
        let entry = entry.normalized()?;
        let conn = self.connection().await?;

        let embedding = match &self.embedder {
            Some(embedder) => {
                let text = format!("{}\n{}", entry.title, entry.content);
                Some(encode_vector(&embedder.embed(&text).await?))
            }
            None => None,
        };

        let id = Uuid::now_v7().to_string();
        let row = MemoryActiveModel {
            id: Set(id.clone()),
            title: Set(entry.title),
            content: Set(entry.content),
            label: Set(entry.label),
            tags: Set(serde_json::to_string(&entry.tags)?),
            metadata: Set(serde_json::to_string(&entry.metadata)?),
            embedding: Set(embedding),
            created_at: Set(chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        };

        MemoryEntity::insert(row)
            .exec_without_returning(&conn)
            .await
            .map_err(|e| AppError::StoreError {
                message: format!("Insert failed: {}", e),
            })?;

        tracing::debug!(id = %id, "Memory stored");
        Ok(id)
    }

    async fn find(&self, query: &str, options: &FindOptions) -> Result<Vec<SearchHit>> {
        let conn = self.connection().await?;

        let Some(fts) = fts_expression(query) else {
            return Ok(Vec::new());
        };
        let k = options.k.max(1);

        let hits = match (options.mode, self.embedder.as_deref()) {
            (SearchMode::Semantic, Some(embedder)) => {
                self.vector_hits(&conn, embedder, query, &fts.terms, k, options.snippet_chars)
                    .await?
            }
            (SearchMode::Auto, Some(embedder)) => {
                let keyword = self.keyword_hits(&conn, &fts, k * 2, options.snippet_chars).await?;
                let vector = self
                    .vector_hits(&conn, embedder, query, &fts.terms, k * 2, options.snippet_chars)
                    .await?;
                self.fusion.fuse(keyword, vector, k)
            }
            _ => self.keyword_hits(&conn, &fts, k, options.snippet_chars).await?,
        };

        tracing::debug!(
            expression = %fts.expression,
            mode = options.mode.as_str(),
            hits = hits.len(),
            "Store search"
        );

        Ok(hits)
    }

    async fn timeline(&self, options: &TimelineOptions) -> Result<Vec<StoredEntry>> {
        let conn = self.connection().await?;

        let query = if options.reverse {
            MemoryEntity::find()
                .order_by_desc(MemoryColumn::CreatedAt)
                .order_by_desc(MemoryColumn::Id)
        } else {
            MemoryEntity::find()
                .order_by_asc(MemoryColumn::CreatedAt)
                .order_by_asc(MemoryColumn::Id)
        };

        let rows = query.limit(options.limit as u64).all(&conn).await?;
        Ok(rows.into_iter().map(to_stored).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.connection().await?;

        let frame_count = MemoryEntity::find().count(&conn).await?;

        let mut pragmas = [0i64; 2];
        for (slot, pragma) in pragmas.iter_mut().zip(["PRAGMA page_count", "PRAGMA page_size"]) {
            let row = conn
                .query_one(Statement::from_string(DbBackend::Sqlite, pragma))
                .await?;
            *slot = row
                .and_then(|r| r.try_get_by_index::<i64>(0).ok())
                .unwrap_or(0);
        }

        Ok(StoreStats {
            frame_count,
            size_bytes: (pragmas[0].max(0) * pragmas[1].max(0)) as u64,
        })
    }

    async fn seal(&self) -> Result<()> {
        let conn = self.conn.write().await.take().ok_or(AppError::NotInitialized)?;
        conn.close().await?;
        tracing::info!("Memory store sealed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AskOptions, LocationSource};
    use crate::embeddings::HashEmbedder;

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put(
                MemoryEntry::new("Database choice", "We use postgres for the billing service")
                    .with_label("decision")
                    .with_tags(["db"]),
            )
            .await
            .unwrap();
        store
            .put(MemoryEntry::new("Login flow", "Session tokens expire after one hour"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_and_find() {
        let store = seeded().await;
        let hits = store.find("postgres", &FindOptions::default()).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Database choice");
        assert_eq!(hits[0].label, "decision");
        assert!(hits[0].score >= 0.0);
    }

    #[tokio::test]
    async fn test_terms_are_anded() {
        let store = seeded().await;
        let hits = store.find("postgres session", &FindOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_or_query_matches_either() {
        let store = seeded().await;
        let hits = store.find("postgres OR session", &FindOptions::default()).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_title_outranks_content() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .put(MemoryEntry::new("Notes", "the deploy uses docker compose"))
            .await
            .unwrap();
        store
            .put(MemoryEntry::new("Docker setup", "compose file lives in ops"))
            .await
            .unwrap();

        let hits = store.find("docker", &FindOptions::default()).await.unwrap();
        assert_eq!(hits[0].title, "Docker setup");
    }

    #[tokio::test]
    async fn test_query_without_terms_is_empty() {
        let store = seeded().await;
        let hits = store.find(" ?! ", &FindOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_limit_respected() {
        let store = SqliteStore::in_memory().await.unwrap();
        for i in 0..5 {
            store
                .put(MemoryEntry::new(format!("Note {}", i), "shared keyword"))
                .await
                .unwrap();
        }
        let opts = FindOptions { k: 3, ..FindOptions::default() };
        assert_eq!(store.find("keyword", &opts).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_timeline_order() {
        let store = seeded().await;

        let newest_first = store.timeline(&TimelineOptions::default()).await.unwrap();
        assert_eq!(newest_first[0].entry.title, "Login flow");

        let oldest_first = store
            .timeline(&TimelineOptions { limit: 1, reverse: false })
            .await
            .unwrap();
        assert_eq!(oldest_first.len(), 1);
        assert_eq!(oldest_first[0].entry.title, "Database choice");
        assert_eq!(oldest_first[0].entry.tags, vec!["db".to_string()]);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = seeded().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.frame_count, 2);
        assert!(stats.size_bytes > 0);
    }

    #[tokio::test]
    async fn test_invalid_entry_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.put(MemoryEntry::new("  ", "body")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(store.stats().await.unwrap().frame_count, 0);
    }

    #[tokio::test]
    async fn test_sealed_store_rejects_calls() {
        let store = seeded().await;
        store.seal().await.unwrap();

        assert!(matches!(
            store.find("postgres", &FindOptions::default()).await,
            Err(AppError::NotInitialized)
        ));
        assert!(matches!(store.stats().await, Err(AppError::NotInitialized)));
        assert!(matches!(store.seal().await, Err(AppError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_engine_ask_is_context_only() {
        let store = seeded().await;

        let answer = store.ask("postgres", &AskOptions::default()).await.unwrap();
        assert_eq!(answer.context.len(), 1);
        assert!(answer.text.contains("Database choice"));

        let synth = AskOptions { context_only: false, ..AskOptions::default() };
        assert!(matches!(
            store.ask("postgres", &synth).await,
            Err(AppError::AskError { .. })
        ));
    }

    #[tokio::test]
    async fn test_semantic_mode_uses_embeddings() {
        let store = SqliteStore::in_memory()
            .await
            .unwrap()
            .with_embedder(Some(Arc::new(HashEmbedder::new(256))));
        store
            .put(MemoryEntry::new("Migration plan", "database migration steps"))
            .await
            .unwrap();
        store
            .put(MemoryEntry::new("Lunch", "banana smoothie"))
            .await
            .unwrap();

        let opts = FindOptions { mode: SearchMode::Semantic, ..FindOptions::default() };
        let hits = store.find("database migration", &opts).await.unwrap();
        assert_eq!(hits[0].title, "Migration plan");

        let opts = FindOptions { mode: SearchMode::Auto, ..FindOptions::default() };
        let hits = store.find("migration", &opts).await.unwrap();
        assert_eq!(hits[0].title, "Migration plan");
        assert!(hits[0].score <= 1.0);
    }

    #[tokio::test]
    async fn test_semantic_without_embedder_falls_back() {
        let store = seeded().await;
        let opts = FindOptions { mode: SearchMode::Semantic, ..FindOptions::default() };
        assert_eq!(store.find("postgres", &opts).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let location = MemoryLocation {
            path: dir.path().join(".memvid").join("memory.mv2"),
            source: LocationSource::Project,
            existed: false,
        };

        let store = SqliteStore::open(location.clone()).await.unwrap();
        store
            .put(MemoryEntry::new("Persisted", "survives a reopen"))
            .await
            .unwrap();
        store.seal().await.unwrap();
        assert!(location.path.is_file());

        let reopened = SqliteStore::open(location).await.unwrap();
        let hits = reopened.find("reopen", &FindOptions::default()).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Persisted");
    }

    #[tokio::test]
    async fn test_path_with_url_characters_opens_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let location = MemoryLocation {
            path: dir.path().join("odd ?mode=ro #1 %20").join("memory.mv2"),
            source: LocationSource::Project,
            existed: false,
        };

        let store = SqliteStore::open(location.clone()).await.unwrap();
        store
            .put(MemoryEntry::new("Odd path", "stored beside the question mark"))
            .await
            .unwrap();
        store.seal().await.unwrap();

        assert!(location.path.is_file());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let reopened = SqliteStore::open(location).await.unwrap();
        assert_eq!(reopened.stats().await.unwrap().frame_count, 1);
    }
}
