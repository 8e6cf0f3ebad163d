//! SQLite-backed vector index for knowledge passages.
//!
//! Ingestion writes through [`init_index`] and [`insert_passage`]; queries go
//! through [`SqliteIndex`], which opens its own read-only connection per
//! search on the blocking thread pool. SQLite's file locking keeps readers
//! consistent while an ingestion run appends; a reader that hits a write in
//! progress waits up to [`READ_BUSY_TIMEOUT`].

use crate::types::{Passage, ScoredPassage};
use crate::vector_index::{cosine_similarity, rank, VectorIndex};
use async_trait::async_trait;
use kbqa_core::{AppError, AppResult};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a search waits for a concurrent ingestion write to finish.
pub const READ_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize the SQLite index database for writing.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Knowledge(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS passages (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            source_identifier TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_passages_source ON passages(source_id);
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

/// Insert a passage with its embedding into the index.
pub fn insert_passage(
    conn: &Connection,
    source_id: &str,
    position: u32,
    passage: &Passage,
    embedding: &[f32],
) -> AppResult<()> {
    let metadata_json = serde_json::to_string(passage.metadata())
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO passages (id, source_id, position, content, source_identifier, embedding, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            uuid::Uuid::new_v4().to_string(),
            source_id,
            position as i64,
            passage.content(),
            passage.source_identifier(),
            embedding_to_bytes(embedding),
            metadata_json,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert passage: {}", e)))?;

    Ok(())
}

/// Query the index for the top-k most similar passages.
///
/// Any unreadable row, or a stored vector whose dimension differs from the
/// query's, fails the whole search: the index was written by a different
/// embedder or is damaged.
pub fn query_passages(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<ScoredPassage>> {
    let mut stmt = conn
        .prepare("SELECT content, source_identifier, embedding, metadata FROM passages")
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query passages: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let (content, source_identifier, embedding_bytes, metadata_json) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read passage row: {}", e)))?;

        let embedding = bytes_to_embedding(&embedding_bytes)?;
        if embedding.len() != query_embedding.len() {
            return Err(AppError::Knowledge(format!(
                "Index embedding dimension {} does not match query dimension {}",
                embedding.len(),
                query_embedding.len()
            )));
        }

        let metadata: serde_json::Value = serde_json::from_str(&metadata_json)
            .map_err(|e| AppError::Knowledge(format!("Corrupt passage metadata: {}", e)))?;
        let passage = Passage::new(content, source_identifier, metadata)?;

        let score = cosine_similarity(query_embedding, &embedding);
        results.push(ScoredPassage::new(passage, score));
    }

    let results = rank(results, top_k);

    tracing::debug!(
        "Retrieved {} passages (requested top-{})",
        results.len(),
        top_k
    );

    Ok(results)
}

/// Get statistics for the index.
///
/// Returns (sources_count, passages_count).
pub fn get_stats(conn: &Connection) -> AppResult<(u32, u32)> {
    let sources_count: u32 = conn
        .query_row("SELECT COUNT(DISTINCT source_id) FROM passages", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count sources: {}", e)))?;

    let passages_count: u32 = conn
        .query_row("SELECT COUNT(*) FROM passages", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count passages: {}", e)))?;

    Ok((sources_count, passages_count))
}

/// Reset the index (delete all data).
pub fn reset_index(conn: &Connection) -> AppResult<()> {
    conn.execute("DELETE FROM passages", [])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete passages: {}", e)))?;

    tracing::info!("Reset tier index");
    Ok(())
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// On-disk index for one tier.
pub struct SqliteIndex {
    path: PathBuf,
}

impl SqliteIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> AppResult<Vec<ScoredPassage>> {
        let path = self.path.clone();
        let query = query_embedding.to_vec();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to open index {:?}: {}", path, e)))?;

            conn.busy_timeout(READ_BUSY_TIMEOUT)
                .map_err(|e| AppError::Knowledge(format!("Failed to set busy timeout: {}", e)))?;

            query_passages(&conn, &query, top_k)
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("Index search task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn passage(text: &str) -> Passage {
        Passage::new(text, "notes.md", serde_json::json!({"title": "Notes"})).unwrap()
    }

    #[test]
    fn test_init_index() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("doc_index/index.sqlite")).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='passages'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 1);
    }

    #[test]
    fn test_insert_and_query() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_passage(&conn, "s1", 0, &passage("test text"), &[1.0, 0.0, 0.0]).unwrap();

        let results = query_passages(&conn, &[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.content(), "test text");
        assert_eq!(results[0].passage.title(), Some("Notes"));
        assert!((results[0].score - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();
        insert_passage(&conn, "s1", 0, &passage("text"), &[1.0, 0.0, 0.0]).unwrap();

        assert!(query_passages(&conn, &[1.0, 0.0], 5).is_err());
    }

    #[test]
    fn test_stats_and_reset() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();
        insert_passage(&conn, "s1", 0, &passage("one"), &[1.0]).unwrap();
        insert_passage(&conn, "s1", 1, &passage("two"), &[1.0]).unwrap();
        insert_passage(&conn, "s2", 0, &passage("three"), &[1.0]).unwrap();

        assert_eq!(get_stats(&conn).unwrap(), (2, 3));

        reset_index(&conn).unwrap();
        assert_eq!(get_stats(&conn).unwrap(), (0, 0));
    }

    #[tokio::test]
    async fn test_sqlite_index_absent_file() {
        let temp = TempDir::new().unwrap();
        let index = SqliteIndex::new(temp.path().join("missing/index.sqlite"));
        assert!(!index.exists().await);
    }

    #[tokio::test]
    async fn test_sqlite_index_search() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        {
            let conn = init_index(&path).unwrap();
            insert_passage(&conn, "s1", 0, &passage("match"), &[0.0, 1.0]).unwrap();
            insert_passage(&conn, "s1", 1, &passage("other"), &[1.0, 0.0]).unwrap();
        }

        let index = SqliteIndex::new(&path);
        assert!(index.exists().await);

        let results = index.search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].passage.content(), "match");
    }

    #[tokio::test]
    async fn test_garbage_file_fails_search() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        std::fs::write(&path, b"this is not a sqlite database at all").unwrap();

        let index = SqliteIndex::new(&path);
        assert!(index.exists().await);
        assert!(index.search(&[1.0], 5).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_search_sees_whole_batches_during_ingestion() {
        const BATCHES: usize = 20;
        const BATCH_SIZE: usize = 5;

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        {
            let conn = init_index(&path).unwrap();
            insert_passage(&conn, "seed", 0, &passage("seed passage"), &[1.0, 0.0]).unwrap();
        }

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            let conn = init_index(&writer_path).unwrap();
            for batch in 0..BATCHES {
                let tx = conn.unchecked_transaction().unwrap();
                for position in 0..BATCH_SIZE {
                    let text = format!("batch {} passage {}", batch, position);
                    let source_id = format!("source-{}", batch);
                    insert_passage(&tx, &source_id, position as u32, &passage(&text), &[1.0, 0.0])
                        .unwrap();
                }
                tx.commit().unwrap();
            }
        });

        let index = SqliteIndex::new(&path);
        let mut seen = Vec::new();
        while !writer.is_finished() {
            let results = index.search(&[1.0, 0.0], usize::MAX).await.unwrap();
            assert_eq!((results.len() - 1) % BATCH_SIZE, 0, "partial batch visible");
            assert!(results.iter().all(|r| {
                let content = r.passage.content();
                content == "seed passage" || content.starts_with("batch ")
            }));
            seen.push(results.len());
        }
        writer.join().unwrap();

        let results = index.search(&[1.0, 0.0], usize::MAX).await.unwrap();
        assert_eq!(results.len(), 1 + BATCHES * BATCH_SIZE);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
