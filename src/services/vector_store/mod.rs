//! Vector store abstraction layer.
//!
//! The ingestion side creates and appends; the query side only searches. The
//! SQLite backend keeps one database file inside the index directory.

mod sqlite;

pub use sqlite::{INDEX_FILE, SqliteVectorStore};

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::VectorStoreError;
use crate::models::{IndexedVector, ScoredChunk};

/// Summary of a persisted index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub chunk_count: u64,
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: String,
}

/// Abstract trait for vector store operations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn info(&self) -> Result<IndexInfo, VectorStoreError>;

    /// Ids of every chunk already stored.
    async fn chunk_ids(&self) -> Result<HashSet<String>, VectorStoreError>;

    /// Append vectors; chunks already present are left untouched.
    /// Returns the number of rows written.
    async fn append(&self, vectors: Vec<IndexedVector>) -> Result<usize, VectorStoreError>;

    /// The `k` chunks most similar to `query`, best first. Ties keep insertion order.
    async fn search(&self, query: Vec<f32>, k: usize)
    -> Result<Vec<ScoredChunk>, VectorStoreError>;

    /// Delete every chunk whose id is not in `keep`. Returns the number removed.
    async fn retain_only(&self, keep: HashSet<String>) -> Result<usize, VectorStoreError>;

    fn location(&self) -> &Path;
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
