//! SQLite-backed vector index over the reference passages.
//!
//! Embeddings are stored as little-endian f32 blobs next to the passage
//! text; search is brute-force cosine over every stored embedding.

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::ApiError;

pub const META_EMBEDDING_MODEL: &str = "embedding_model";
pub const META_DOCUMENT_SHA256: &str = "document_sha256";

/// One indexed passage of the reference work.
#[derive(Debug, Clone)]
pub struct Passage {
    pub id: String,
    pub seq: i64,
    pub content: String,
    pub source: String,
    pub start_offset: i64,
}

#[derive(Debug, Clone)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub async fn open(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let index = Self { pool };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS passages (
                id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                start_offset INTEGER NOT NULL DEFAULT 0,
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    pub async fn insert_batch(&self, items: Vec<(Passage, Vec<f32>)>) -> Result<(), ApiError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for (passage, embedding) in &items {
            let blob = serialize_embedding(embedding);

            sqlx::query(
                "INSERT OR REPLACE INTO passages (id, seq, content, source, start_offset, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&passage.id)
            .bind(passage.seq)
            .bind(&passage.content)
            .bind(&passage.source)
            .bind(passage.start_offset)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Top passages by cosine similarity to the query embedding.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPassage>, ApiError> {
        let rows = sqlx::query(
            "SELECT id, seq, content, source, start_offset, embedding FROM passages",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        let mut scored: Vec<ScoredPassage> = rows
            .iter()
            .filter_map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                if embedding_bytes.is_empty() {
                    return None;
                }
                let stored = deserialize_embedding(&embedding_bytes);
                let score = cosine_similarity(query_embedding, &stored);

                Some(ScoredPassage {
                    passage: row_to_passage(row),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit.max(1));

        Ok(scored)
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM passages")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(count as usize)
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>, ApiError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(ApiError::internal)?;

        Ok(value)
    }

    /// Drop every passage and stamp the index with the embedding model and
    /// document fingerprint the next build will use.
    pub async fn reset(&self, embedding_model: &str, fingerprint: &str) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        sqlx::query("DELETE FROM passages")
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        for (key, value) in [
            (META_EMBEDDING_MODEL, embedding_model),
            (META_DOCUMENT_SHA256, fingerprint),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
                 VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;
        }

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }
}

/// SHA-256 of the source document, hex-encoded. A changed fingerprint
/// invalidates the persisted index.
pub fn document_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

fn row_to_passage(row: &sqlx::sqlite::SqliteRow) -> Passage {
    Passage {
        id: row.get("id"),
        seq: row.get("seq"),
        content: row.get("content"),
        source: row.get("source"),
        start_offset: row.get("start_offset"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_index() -> VectorIndex {
        let tmp = std::env::temp_dir().join(format!(
            "homeo-index-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        VectorIndex::open(tmp).await.unwrap()
    }

    fn make_passage(id: &str, seq: i64, content: &str) -> Passage {
        Passage {
            id: id.to_string(),
            seq,
            content: content.to_string(),
            source: "repertory".to_string(),
            start_offset: seq * 100,
        }
    }

    #[tokio::test]
    async fn insert_batch_and_search_orders_by_similarity() {
        let index = test_index().await;

        index
            .insert_batch(vec![
                (make_passage("p1", 0, "fear of thunderstorms"), vec![1.0, 0.0, 0.0]),
                (make_passage("p2", 1, "weeping, consolation amel."), vec![0.0, 1.0, 0.0]),
                (make_passage("p3", 2, "thirstless with fever"), vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 3);

        let results = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage.id, "p1");
        assert!(results[0].score > 0.99);
        assert_eq!(results[1].passage.id, "p3");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn search_on_an_empty_index_is_empty() {
        let index = test_index().await;
        let results = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn reset_clears_passages_and_stamps_meta() {
        let index = test_index().await;

        index
            .insert_batch(vec![(make_passage("p1", 0, "stale"), vec![1.0])])
            .await
            .unwrap();

        index.reset("nomic-embed-text", "abc123").await.unwrap();

        assert_eq!(index.count().await.unwrap(), 0);
        assert_eq!(
            index.get_meta(META_EMBEDDING_MODEL).await.unwrap().as_deref(),
            Some("nomic-embed-text")
        );
        assert_eq!(
            index.get_meta(META_DOCUMENT_SHA256).await.unwrap().as_deref(),
            Some("abc123")
        );
        assert!(index.get_meta("missing").await.unwrap().is_none());
    }

    #[test]
    fn embedding_blob_roundtrip() {
        let embedding = vec![0.25_f32, -1.5, 3.0];
        let blob = serialize_embedding(&embedding);
        assert_eq!(blob.len(), 12);
        assert_eq!(deserialize_embedding(&blob), embedding);
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let a = document_fingerprint(b"kent repertory");
        let b = document_fingerprint(b"kent repertory");
        let c = document_fingerprint(b"kent repertory, revised");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
