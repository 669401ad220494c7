//! SQLite-backed vector store with brute-force cosine search.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{IndexInfo, VectorStore, cosine_similarity};
use crate::error::VectorStoreError;
use crate::models::{Chunk, IndexedVector, ScoredChunk};

/// Database file name inside the index directory.
pub const INDEX_FILE: &str = "index.sqlite3";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    chunk_id TEXT NOT NULL UNIQUE,
    source_path TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    start_offset INTEGER NOT NULL,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_path);
"#;

const META_MODEL: &str = "embedding_model";
const META_DIMENSION: &str = "dimension";
const META_CREATED_AT: &str = "created_at";

pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    location: PathBuf,
    embedding_model: String,
    dimension: usize,
}

impl SqliteVectorStore {
    /// Create a new index in `location`, creating the directory if needed.
    pub fn create(
        location: &Path,
        embedding_model: &str,
        dimension: usize,
    ) -> Result<Self, VectorStoreError> {
        std::fs::create_dir_all(location)?;
        let conn = Self::connect(&location.join(INDEX_FILE))?;

        let now = chrono::Utc::now().to_rfc3339();
        let tx = conn.unchecked_transaction()?;
        for (key, value) in [
            (META_MODEL, embedding_model.to_string()),
            (META_DIMENSION, dimension.to_string()),
            (META_CREATED_AT, now),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO index_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }
        tx.commit()?;

        tracing::info!(
            location = %location.display(),
            model = embedding_model,
            dimension,
            "created vector index"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.to_path_buf(),
            embedding_model: embedding_model.to_string(),
            dimension,
        })
    }

    /// Open an index previously written by `create`.
    pub fn open(location: &Path) -> Result<Self, VectorStoreError> {
        let path = location.join(INDEX_FILE);
        if !path.is_file() {
            return Err(VectorStoreError::NotAnIndex(location.to_path_buf()));
        }

        let conn = Self::connect(&path)?;
        let embedding_model = read_meta(&conn, META_MODEL)?
            .ok_or_else(|| VectorStoreError::NotAnIndex(location.to_path_buf()))?;
        let dimension = read_meta(&conn, META_DIMENSION)?
            .and_then(|d| d.parse::<usize>().ok())
            .ok_or_else(|| VectorStoreError::NotAnIndex(location.to_path_buf()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: location.to_path_buf(),
            embedding_model,
            dimension,
        })
    }

    fn connect(path: &Path) -> Result<Connection, VectorStoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorStoreError> {
        if actual != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Run blocking SQLite work off the async executor.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, VectorStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, VectorStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| VectorStoreError::Task("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| VectorStoreError::Task(e.to_string()))?
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>, VectorStoreError> {
    Ok(conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()?)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn info(&self) -> Result<IndexInfo, VectorStoreError> {
        let embedding_model = self.embedding_model.clone();
        let dimension = self.dimension;
        self.with_conn(move |conn| {
            let chunk_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            let created_at = read_meta(conn, META_CREATED_AT)?.unwrap_or_default();
            Ok(IndexInfo {
                chunk_count: chunk_count as u64,
                embedding_model,
                dimension,
                created_at,
            })
        })
        .await
    }

    async fn chunk_ids(&self) -> Result<HashSet<String>, VectorStoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT chunk_id FROM chunks")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    async fn append(&self, vectors: Vec<IndexedVector>) -> Result<usize, VectorStoreError> {
        for vector in &vectors {
            self.check_dimension(vector.embedding.len())?;
        }

        self.with_conn(move |conn| {
            let now = chrono::Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO chunks
                     (chunk_id, source_path, page_number, start_offset, content, embedding, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for vector in &vectors {
                    let chunk = &vector.chunk;
                    written += stmt.execute(params![
                        chunk.id,
                        chunk.source_path,
                        chunk.page_number,
                        chunk.start_offset as i64,
                        chunk.text,
                        encode_embedding(&vector.embedding),
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn search(
        &self,
        query: Vec<f32>,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        self.check_dimension(query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT chunk_id, source_path, page_number, start_offset, content, embedding
                 FROM chunks ORDER BY seq",
            )?;
            let rows = stmt.query_map([], |row| {
                let embedding: Vec<u8> = row.get(5)?;
                Ok((
                    Chunk {
                        id: row.get(0)?,
                        source_path: row.get(1)?,
                        page_number: row.get(2)?,
                        start_offset: row.get::<_, i64>(3)? as usize,
                        text: row.get(4)?,
                    },
                    embedding,
                ))
            })?;

            let mut scored = Vec::new();
            for row in rows {
                let (chunk, embedding) = row?;
                let score = cosine_similarity(&query, &decode_embedding(&embedding));
                scored.push(ScoredChunk { chunk, score });
            }

            // Stable sort: equal scores stay in insertion order
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            scored.truncate(k);
            Ok(scored)
        })
        .await
    }

    async fn retain_only(&self, keep: HashSet<String>) -> Result<usize, VectorStoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let stale: Vec<String> = {
                let mut stmt = tx.prepare("SELECT chunk_id FROM chunks")?;
                stmt.query_map([], |row| row.get::<_, String>(0))?
                    .filter_map(Result::ok)
                    .filter(|id| !keep.contains(id))
                    .collect()
            };
            for id in &stale {
                tx.execute("DELETE FROM chunks WHERE chunk_id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(stale.len())
        })
        .await
    }

    fn location(&self) -> &Path {
        &self.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(id: &str, text: &str, embedding: Vec<f32>) -> IndexedVector {
        IndexedVector {
            embedding,
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                start_offset: 0,
                source_path: "/docs/a.pdf".to_string(),
                page_number: 1,
            },
        }
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let values = vec![0.25_f32, -1.5, 3.0e-7];
        assert_eq!(decode_embedding(&encode_embedding(&values)), values);
    }

    #[tokio::test]
    async fn test_create_append_search() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "test-model", 2).unwrap();

        let written = store
            .append(vec![
                vector("a", "north", vec![0.0, 1.0]),
                vector("b", "east", vec![1.0, 0.0]),
                vector("c", "north-east", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let hits = store.search(vec![1.0, 0.1], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "test-model", 2).unwrap();
        store
            .append(vec![
                vector("first", "x", vec![1.0, 0.0]),
                vector("second", "y", vec![2.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.search(vec![1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].chunk.id, "first");
        assert_eq!(hits[1].chunk.id, "second");
    }

    #[tokio::test]
    async fn test_append_skips_existing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "test-model", 2).unwrap();
        store.append(vec![vector("a", "x", vec![1.0, 0.0])]).await.unwrap();

        let written = store
            .append(vec![
                vector("a", "x", vec![1.0, 0.0]),
                vector("b", "y", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.info().await.unwrap().chunk_count, 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "test-model", 3).unwrap();

        let err = store
            .append(vec![vector("a", "x", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(store.search(vec![1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_reopen_preserves_meta_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteVectorStore::create(dir.path(), "models/embedding-001", 2).unwrap();
            store.append(vec![vector("a", "x", vec![1.0, 0.0])]).await.unwrap();
        }

        let store = SqliteVectorStore::open(dir.path()).unwrap();
        let info = store.info().await.unwrap();
        assert_eq!(info.embedding_model, "models/embedding-001");
        assert_eq!(info.dimension, 2);
        assert_eq!(info.chunk_count, 1);
        assert_eq!(store.chunk_ids().await.unwrap(), HashSet::from(["a".to_string()]));
    }

    #[test]
    fn test_open_non_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "hello").unwrap();
        assert!(matches!(
            SqliteVectorStore::open(dir.path()),
            Err(VectorStoreError::NotAnIndex(_))
        ));
    }

    #[tokio::test]
    async fn test_retain_only_prunes_stale() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "test-model", 2).unwrap();
        store
            .append(vec![
                vector("keep", "x", vec![1.0, 0.0]),
                vector("stale", "y", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let removed = store
            .retain_only(HashSet::from(["keep".to_string()]))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.chunk_ids().await.unwrap(), HashSet::from(["keep".to_string()]));
    }
}
