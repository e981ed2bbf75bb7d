use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};

use crate::core::errors::ApiError;

/// One logged chat message for a (doctor, patient) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub message: String,
    pub is_user: bool,
    pub created_at: String,
}

/// Legacy chat-history store: per-doctor patients plus an append-only
/// message log, kept in their own database file.
#[derive(Clone)]
pub struct ChatLogStore {
    pool: SqlitePool,
}

impl ChatLogStore {
    pub async fn new(db_path: PathBuf) -> Result<Self, ApiError> {
        let conn_str = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&conn_str)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to chat log db: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS patients (
                id TEXT NOT NULL,
                doctor_id TEXT NOT NULL,
                PRIMARY KEY (id, doctor_id)
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init patients table: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                doctor_id TEXT NOT NULL,
                patient_id TEXT NOT NULL,
                message TEXT NOT NULL,
                is_user INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to init chats table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chats_doctor_patient ON chats(doctor_id, patient_id)",
        )
        .execute(&pool)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    /// Idempotent: adding the same patient twice is a no-op.
    pub async fn add_patient(&self, doctor_id: &str, patient_id: &str) -> Result<(), ApiError> {
        sqlx::query("INSERT OR IGNORE INTO patients (id, doctor_id) VALUES (?, ?)")
            .bind(patient_id)
            .bind(doctor_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn list_patients(&self, doctor_id: &str) -> Result<Vec<String>, ApiError> {
        let rows = sqlx::query("SELECT id FROM patients WHERE doctor_id = ? ORDER BY id ASC")
            .bind(doctor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    pub async fn append_message(
        &self,
        doctor_id: &str,
        patient_id: &str,
        message: &str,
        is_user: bool,
    ) -> Result<i64, ApiError> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO chats (doctor_id, patient_id, message, is_user, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(doctor_id)
        .bind(patient_id)
        .bind(message)
        .bind(is_user as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(result.last_insert_rowid())
    }

    /// Messages for a (doctor, patient) pair in insertion order. A positive
    /// `limit` keeps only the most recent messages.
    pub async fn history(
        &self,
        doctor_id: &str,
        patient_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatLogEntry>, ApiError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT * FROM (SELECT * FROM chats WHERE doctor_id = ? AND patient_id = ? ORDER BY id DESC LIMIT ?) ORDER BY id ASC",
            )
            .bind(doctor_id)
            .bind(patient_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        } else {
            sqlx::query(
                "SELECT * FROM chats WHERE doctor_id = ? AND patient_id = ? ORDER BY id ASC",
            )
            .bind(doctor_id)
            .bind(patient_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?
        };

        let mut messages = Vec::new();
        for row in rows {
            messages.push(ChatLogEntry {
                message: row.get("message"),
                is_user: row.get::<i64, _>("is_user") != 0,
                created_at: row.try_get::<String, _>("created_at").unwrap_or_default(),
            });
        }

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> ChatLogStore {
        let tmp = std::env::temp_dir().join(format!(
            "homeo-chatlog-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        ChatLogStore::new(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn add_patient_is_idempotent() {
        let store = test_store().await;

        store.add_patient("doc@x.com", "patient-1").await.unwrap();
        store.add_patient("doc@x.com", "patient-1").await.unwrap();
        store.add_patient("doc@x.com", "patient-2").await.unwrap();
        store.add_patient("other@x.com", "patient-3").await.unwrap();

        let patients = store.list_patients("doc@x.com").await.unwrap();
        assert_eq!(patients, vec!["patient-1", "patient-2"]);
    }

    #[tokio::test]
    async fn history_preserves_insertion_order() {
        let store = test_store().await;

        store
            .append_message("doc@x.com", "p1", "headache after sunrise", true)
            .await
            .unwrap();
        store
            .append_message("doc@x.com", "p1", "Consider Glonoinum.", false)
            .await
            .unwrap();
        store
            .append_message("doc@x.com", "p2", "unrelated case", true)
            .await
            .unwrap();

        let history = store.history("doc@x.com", "p1", 0).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "headache after sunrise");
        assert!(history[0].is_user);
        assert_eq!(history[1].message, "Consider Glonoinum.");
        assert!(!history[1].is_user);
        assert!(!history[0].created_at.is_empty());
    }

    #[tokio::test]
    async fn history_limit_keeps_the_most_recent_messages() {
        let store = test_store().await;

        for i in 0..5 {
            store
                .append_message("doc@x.com", "p1", &format!("message {}", i), i % 2 == 0)
                .await
                .unwrap();
        }

        let history = store.history("doc@x.com", "p1", 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "message 3");
        assert_eq!(history[1].message, "message 4");
    }
}
