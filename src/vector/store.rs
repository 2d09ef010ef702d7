//! SQLite-backed vector store.
//!
//! Embeddings are stored as little-endian f32 blobs; search scans the
//! filtered candidate set and ranks by cosine similarity, which satisfies
//! the cosine-ranking contract without an external index server.

use std::path::PathBuf;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::errors::ApiError;

use super::{
    check_dimension, cosine_similarity, deserialize_embedding, serialize_embedding,
    CollectionKind, DocumentRecord, InsertOutcome, MetadataRecord, RankedResult, VisibilityFilter,
};

/// Public inserts whose nearest public neighbor scores above this are
/// treated as duplicates and skipped.
const DEDUP_SIMILARITY: f32 = 0.98;
const DEDUP_NEIGHBORS: usize = 5;

enum Scope<'a> {
    /// `chat_id == id OR (is_public AND bot_id == bot)`
    Visible(&'a VisibilityFilter),
    /// `is_public AND bot_id == bot`, used by the dedup gate.
    PublicOnly { bot_id: &'a str },
}

#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn connect(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::store)?;

        Ok(Self { pool })
    }

    /// Creates the collection and records its declared dimension if absent.
    /// Idempotent; an existing collection with a different dimension is a
    /// fatal misconfiguration.
    pub async fn ensure_collection(
        &self,
        kind: CollectionKind,
        dimension: usize,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        let schema = match kind {
            CollectionKind::Documents => {
                "CREATE TABLE IF NOT EXISTS documents (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    content TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    is_public INTEGER NOT NULL DEFAULT 0,
                    bot_id TEXT NOT NULL DEFAULT ''
                )"
            }
            CollectionKind::Metadata => {
                "CREATE TABLE IF NOT EXISTS metadata (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    chat_id TEXT NOT NULL,
                    cid TEXT NOT NULL,
                    description TEXT NOT NULL,
                    url TEXT NOT NULL,
                    embedding BLOB NOT NULL,
                    is_public INTEGER NOT NULL DEFAULT 0,
                    bot_id TEXT NOT NULL DEFAULT ''
                )"
            }
        };
        sqlx::query(schema)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        let index = match kind {
            CollectionKind::Documents => {
                "CREATE INDEX IF NOT EXISTS idx_documents_scope
                 ON documents(chat_id, is_public, bot_id)"
            }
            CollectionKind::Metadata => {
                "CREATE INDEX IF NOT EXISTS idx_metadata_key
                 ON metadata(chat_id, cid)"
            }
        };
        sqlx::query(index)
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(kind.name())
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::store)?;

        match existing {
            Some(declared) if declared as usize != dimension => {
                Err(ApiError::DimensionMismatch(format!(
                    "collection {} was created with dimension {declared}, configured provider needs {dimension}; re-indexing required",
                    kind.name()
                )))
            }
            Some(_) => Ok(()),
            None => {
                sqlx::query("INSERT INTO collections (name, dimension) VALUES (?1, ?2)")
                    .bind(kind.name())
                    .bind(dimension as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(ApiError::store)?;
                Ok(())
            }
        }
    }

    async fn declared_dimension(&self, kind: CollectionKind) -> Result<usize, ApiError> {
        let dim: Option<i64> =
            sqlx::query_scalar("SELECT dimension FROM collections WHERE name = ?1")
                .bind(kind.name())
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::store)?;

        dim.map(|d| d as usize).ok_or_else(|| {
            ApiError::Store(format!("collection {} has not been created", kind.name()))
        })
    }

    pub async fn search_documents(
        &self,
        query: &[f32],
        filter: &VisibilityFilter,
        limit: usize,
    ) -> Result<Vec<RankedResult<DocumentRecord>>, ApiError> {
        self.scan_documents(query, Scope::Visible(filter), limit)
            .await
    }

    pub async fn search_metadata(
        &self,
        query: &[f32],
        filter: &VisibilityFilter,
        limit: usize,
    ) -> Result<Vec<RankedResult<MetadataRecord>>, ApiError> {
        self.scan_metadata(query, Scope::Visible(filter), limit)
            .await
    }

    /// Inserts a document, subject to the public dedup gate.
    ///
    /// The gate's search-then-insert sequence is not atomic: two concurrent
    /// public inserts of near-duplicate content can both pass the check.
    /// Accepted as best-effort; duplicates admitted under that race are
    /// harmless.
    pub async fn insert_document(
        &self,
        record: DocumentRecord,
    ) -> Result<InsertOutcome, ApiError> {
        let declared = self.declared_dimension(CollectionKind::Documents).await?;
        check_dimension(CollectionKind::Documents, declared, record.embedding.len())?;

        if record.is_public
            && self
                .has_public_duplicate(CollectionKind::Documents, &record.embedding, &record.bot_id)
                .await?
        {
            tracing::info!("similar public document already stored, skipping: {}", record.title);
            return Ok(InsertOutcome::Duplicate);
        }

        sqlx::query(
            "INSERT INTO documents (chat_id, title, content, embedding, is_public, bot_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.chat_id)
        .bind(&record.title)
        .bind(&record.content)
        .bind(serialize_embedding(&record.embedding))
        .bind(record.is_public)
        .bind(&record.bot_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(InsertOutcome::Inserted)
    }

    /// Inserts a metadata record, subject to the same public dedup gate.
    pub async fn insert_metadata(
        &self,
        record: MetadataRecord,
    ) -> Result<InsertOutcome, ApiError> {
        let declared = self.declared_dimension(CollectionKind::Metadata).await?;
        check_dimension(CollectionKind::Metadata, declared, record.embedding.len())?;

        if record.is_public
            && self
                .has_public_duplicate(CollectionKind::Metadata, &record.embedding, &record.bot_id)
                .await?
        {
            tracing::info!("similar public metadata already stored, skipping: {}", record.url);
            return Ok(InsertOutcome::Duplicate);
        }

        sqlx::query(
            "INSERT INTO metadata (chat_id, cid, description, url, embedding, is_public, bot_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.chat_id)
        .bind(&record.cid)
        .bind(&record.description)
        .bind(&record.url)
        .bind(serialize_embedding(&record.embedding))
        .bind(record.is_public)
        .bind(&record.bot_id)
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(InsertOutcome::Inserted)
    }

    /// Exact-match existence check used for idempotent metadata ingestion,
    /// independent of the similarity dedup gate.
    pub async fn exists_by_key(&self, chat_id: &str, cid: &str) -> Result<bool, ApiError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM metadata WHERE chat_id = ?1 AND cid = ?2",
        )
        .bind(chat_id)
        .bind(cid)
        .fetch_one(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(count > 0)
    }

    async fn has_public_duplicate(
        &self,
        kind: CollectionKind,
        embedding: &[f32],
        bot_id: &str,
    ) -> Result<bool, ApiError> {
        let neighbors: Vec<f32> = match kind {
            CollectionKind::Documents => self
                .scan_documents(embedding, Scope::PublicOnly { bot_id }, DEDUP_NEIGHBORS)
                .await?
                .into_iter()
                .map(|r| r.similarity)
                .collect(),
            CollectionKind::Metadata => self
                .scan_metadata(embedding, Scope::PublicOnly { bot_id }, DEDUP_NEIGHBORS)
                .await?
                .into_iter()
                .map(|r| r.similarity)
                .collect(),
        };

        Ok(neighbors.iter().any(|&s| s > DEDUP_SIMILARITY))
    }

    async fn scan_documents(
        &self,
        query: &[f32],
        scope: Scope<'_>,
        limit: usize,
    ) -> Result<Vec<RankedResult<DocumentRecord>>, ApiError> {
        let declared = self.declared_dimension(CollectionKind::Documents).await?;
        check_dimension(CollectionKind::Documents, declared, query.len())?;

        let rows = match scope {
            Scope::Visible(filter) => {
                sqlx::query(
                    "SELECT chat_id, title, content, embedding, is_public, bot_id
                     FROM documents
                     WHERE chat_id = ?1 OR (is_public = 1 AND bot_id = ?2)",
                )
                .bind(&filter.chat_id)
                .bind(&filter.bot_id)
                .fetch_all(&self.pool)
                .await
            }
            Scope::PublicOnly { bot_id } => {
                sqlx::query(
                    "SELECT chat_id, title, content, embedding, is_public, bot_id
                     FROM documents
                     WHERE is_public = 1 AND bot_id = ?1",
                )
                .bind(bot_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(ApiError::store)?;

        let mut scored: Vec<RankedResult<DocumentRecord>> = rows
            .iter()
            .map(|row| {
                let embedding = deserialize_embedding(row.get("embedding"));
                let similarity = cosine_similarity(query, &embedding);
                RankedResult {
                    similarity,
                    record: DocumentRecord {
                        chat_id: row.get("chat_id"),
                        title: row.get("title"),
                        content: row.get("content"),
                        embedding,
                        is_public: row.get("is_public"),
                        bot_id: row.get("bot_id"),
                    },
                }
            })
            .collect();

        rank_and_truncate(&mut scored, limit);
        Ok(scored)
    }

    async fn scan_metadata(
        &self,
        query: &[f32],
        scope: Scope<'_>,
        limit: usize,
    ) -> Result<Vec<RankedResult<MetadataRecord>>, ApiError> {
        let declared = self.declared_dimension(CollectionKind::Metadata).await?;
        check_dimension(CollectionKind::Metadata, declared, query.len())?;

        let rows = match scope {
            Scope::Visible(filter) => {
                sqlx::query(
                    "SELECT chat_id, cid, description, url, embedding, is_public, bot_id
                     FROM metadata
                     WHERE chat_id = ?1 OR (is_public = 1 AND bot_id = ?2)",
                )
                .bind(&filter.chat_id)
                .bind(&filter.bot_id)
                .fetch_all(&self.pool)
                .await
            }
            Scope::PublicOnly { bot_id } => {
                sqlx::query(
                    "SELECT chat_id, cid, description, url, embedding, is_public, bot_id
                     FROM metadata
                     WHERE is_public = 1 AND bot_id = ?1",
                )
                .bind(bot_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(ApiError::store)?;

        let mut scored: Vec<RankedResult<MetadataRecord>> = rows
            .iter()
            .map(|row| {
                let embedding = deserialize_embedding(row.get("embedding"));
                let similarity = cosine_similarity(query, &embedding);
                RankedResult {
                    similarity,
                    record: MetadataRecord {
                        chat_id: row.get("chat_id"),
                        cid: row.get("cid"),
                        description: row.get("description"),
                        url: row.get("url"),
                        embedding,
                        is_public: row.get("is_public"),
                        bot_id: row.get("bot_id"),
                    },
                }
            })
            .collect();

        rank_and_truncate(&mut scored, limit);
        Ok(scored)
    }
}

fn rank_and_truncate<T>(scored: &mut Vec<RankedResult<T>>, limit: usize) {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store(dimension: usize) -> (tempfile::TempDir, SqliteVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::connect(dir.path().join("vectors.db"))
            .await
            .unwrap();
        store
            .ensure_collection(CollectionKind::Documents, dimension)
            .await
            .unwrap();
        store
            .ensure_collection(CollectionKind::Metadata, dimension)
            .await
            .unwrap();
        (dir, store)
    }

    fn doc(chat_id: &str, title: &str, embedding: Vec<f32>, is_public: bool) -> DocumentRecord {
        DocumentRecord {
            chat_id: chat_id.to_string(),
            title: title.to_string(),
            content: format!("content of {title}"),
            embedding,
            is_public,
            bot_id: "bot-1".to_string(),
        }
    }

    fn meta(chat_id: &str, cid: &str, embedding: Vec<f32>, is_public: bool) -> MetadataRecord {
        MetadataRecord {
            chat_id: chat_id.to_string(),
            cid: cid.to_string(),
            description: format!("description of {cid}"),
            embedding,
            url: format!("https://example.test/{cid}"),
            is_public,
            bot_id: "bot-1".to_string(),
        }
    }

    fn filter(chat_id: &str) -> VisibilityFilter {
        VisibilityFilter {
            chat_id: chat_id.to_string(),
            bot_id: "bot-1".to_string(),
        }
    }

    #[tokio::test]
    async fn ensure_collection_is_idempotent() {
        let (_dir, store) = test_store(3).await;
        store
            .ensure_collection(CollectionKind::Documents, 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_collection_rejects_changed_dimension() {
        let (_dir, store) = test_store(3).await;
        let err = store
            .ensure_collection(CollectionKind::Documents, 4)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DimensionMismatch(_)));
    }

    #[tokio::test]
    async fn insert_rejects_wrong_dimension() {
        let (_dir, store) = test_store(3).await;
        let err = store
            .insert_document(doc("c1", "short", vec![1.0, 0.0], false))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DimensionMismatch(_)));
    }

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_document(doc("c1", "near", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();
        store
            .insert_document(doc("c1", "far", vec![0.0, 1.0, 0.0], false))
            .await
            .unwrap();

        let results = store
            .search_documents(&[1.0, 0.0, 0.0], &filter("c1"), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record.title, "near");
        assert!(results[0].similarity > results[1].similarity);
    }

    #[tokio::test]
    async fn private_records_are_invisible_to_other_chats() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_document(doc("chat-b", "private", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();
        store
            .insert_document(doc("chat-b", "public", vec![1.0, 0.0, 0.0], true))
            .await
            .unwrap();

        let results = store
            .search_documents(&[1.0, 0.0, 0.0], &filter("chat-a"), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.title, "public");
    }

    #[tokio::test]
    async fn dedup_gate_skips_near_duplicate_public_inserts() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_document(doc("c1", "original", vec![1.0, 0.0, 0.0], true))
            .await
            .unwrap();

        // cosine with [1,0,0] is ~0.995, above the gate
        let outcome = store
            .insert_document(doc("c2", "duplicate", vec![0.995, 0.0999, 0.0], true))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate);

        // cosine is exactly 0.97, below the gate, so the insert proceeds
        let outcome = store
            .insert_document(doc("c2", "distinct", vec![0.97, 0.243_104_9, 0.0], true))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn private_inserts_bypass_the_dedup_gate() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_document(doc("c1", "original", vec![1.0, 0.0, 0.0], true))
            .await
            .unwrap();

        let outcome = store
            .insert_document(doc("c1", "mine", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn exists_by_key_matches_exact_pair() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_metadata(meta("c1", "cid-1", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();

        assert!(store.exists_by_key("c1", "cid-1").await.unwrap());
        assert!(!store.exists_by_key("c1", "cid-2").await.unwrap());
        assert!(!store.exists_by_key("c2", "cid-1").await.unwrap());
    }

    #[tokio::test]
    async fn metadata_search_respects_visibility() {
        let (_dir, store) = test_store(3).await;
        store
            .insert_metadata(meta("chat-b", "private-cid", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();
        store
            .insert_metadata(meta("chat-a", "own-cid", vec![1.0, 0.0, 0.0], false))
            .await
            .unwrap();

        let results = store
            .search_metadata(&[1.0, 0.0, 0.0], &filter("chat-a"), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.cid, "own-cid");
    }
}
