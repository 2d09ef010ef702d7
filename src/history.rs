//! Chat transcript storage.
//!
//! One SQLite table of conversation turns keyed by `chat_id`, ordered by
//! insertion. The retrieval/completion core reads turns and appends new
//! ones; retention is handled elsewhere.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::errors::ApiError;

pub const ROLE_USER: &str = "user";
pub const ROLE_AI: &str = "ai";

/// One conversation turn, time-ascending within a chat.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub role: String,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub async fn connect(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(ApiError::store)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'ai')),
                message TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id, id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::store)?;

        Ok(())
    }

    pub async fn add_message(
        &self,
        chat_id: &str,
        role: &str,
        message: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT INTO messages (chat_id, role, message, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(chat_id)
        .bind(role)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(ApiError::store)?;
        Ok(())
    }

    /// All turns for a chat, oldest first.
    pub async fn get_history(&self, chat_id: &str) -> Result<Vec<ChatTurn>, ApiError> {
        let rows = sqlx::query(
            "SELECT role, message, created_at FROM messages WHERE chat_id = ?1 ORDER BY id ASC",
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::store)?;

        Ok(rows
            .into_iter()
            .map(|row| ChatTurn {
                role: row.get("role"),
                message: row.get("message"),
                timestamp: row.get("created_at"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::connect(dir.path().join("history.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn turns_come_back_in_insertion_order() {
        let (_dir, store) = test_store().await;

        store.add_message("c1", ROLE_USER, "hello").await.unwrap();
        store.add_message("c1", ROLE_AI, "hi there").await.unwrap();
        store.add_message("c2", ROLE_USER, "other chat").await.unwrap();

        let turns = store.get_history("c1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, ROLE_USER);
        assert_eq!(turns[0].message, "hello");
        assert_eq!(turns[1].role, ROLE_AI);
    }

    #[tokio::test]
    async fn unknown_chat_is_empty() {
        let (_dir, store) = test_store().await;
        assert!(store.get_history("missing").await.unwrap().is_empty());
    }
}
