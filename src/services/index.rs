//! Access to a persisted vector index.

use std::path::Path;
use std::sync::Arc;

use crate::error::{SearchError, VectorStoreError};
use crate::models::ScoredChunk;
use crate::services::embedding::Embedder;
use crate::services::vector_store::{IndexInfo, SqliteVectorStore, VectorStore};
use crate::utils::dir_has_entries;

/// A persisted index bound to the embedder that queries it.
///
/// Cloning is cheap; clones share the same store and can query concurrently.
#[derive(Clone)]
pub struct VectorIndexHandle {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndexHandle {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Open the index at `location`.
    ///
    /// Returns `Ok(None)` when the directory is missing or empty.
    pub fn open(
        location: &Path,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Option<Self>, VectorStoreError> {
        if !dir_has_entries(location) {
            tracing::debug!(location = %location.display(), "no index present");
            return Ok(None);
        }

        let store = SqliteVectorStore::open(location)?;
        if store.embedding_model() != embedder.model_id() {
            tracing::warn!(
                indexed_with = store.embedding_model(),
                querying_with = embedder.model_id(),
                "index was built with a different embedding model"
            );
        }

        Ok(Some(Self::new(Arc::new(store), embedder)))
    }

    /// The `k` chunks most similar to `question`, best first.
    pub async fn similar(&self, question: &str, k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SearchError::InvalidQuery("question is empty".to_string()));
        }

        let embedding = self.embedder.embed_query(question).await?;
        let hits = self.store.search(embedding, k).await?;
        tracing::debug!(k, hits = hits.len(), "similarity search");
        Ok(hits)
    }

    pub async fn info(&self) -> Result<IndexInfo, VectorStoreError> {
        self.store.info().await
    }

    pub fn location(&self) -> &Path {
        self.store.location()
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }
}

impl std::fmt::Debug for VectorIndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndexHandle")
            .field("location", &self.store.location())
            .field("embedder", &self.embedder.model_id())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic fakes shared by service tests.

    use async_trait::async_trait;

    use crate::error::EmbeddingError;
    use crate::services::embedding::Embedder;

    /// Embeds text as a bag of letter counts, so shared words mean similar vectors.
    pub struct LetterEmbedder;

    pub fn letter_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
            v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(letter_vector(text))
        }

        fn model_id(&self) -> &str {
            "letters"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{LetterEmbedder, letter_vector};
    use super::*;
    use crate::models::{Chunk, IndexedVector};

    fn indexed(id: &str, text: &str) -> IndexedVector {
        IndexedVector {
            embedding: letter_vector(text),
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                start_offset: 0,
                source_path: "a.pdf".to_string(),
                page_number: 1,
            },
        }
    }

    #[test]
    fn test_open_missing_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let result = VectorIndexHandle::open(&dir.path().join("nope"), Arc::new(LetterEmbedder));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_open_empty_directory_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let result = VectorIndexHandle::open(dir.path(), Arc::new(LetterEmbedder));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn test_open_foreign_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let result = VectorIndexHandle::open(dir.path(), Arc::new(LetterEmbedder));
        assert!(matches!(result, Err(VectorStoreError::NotAnIndex(_))));
    }

    #[tokio::test]
    async fn test_similar_returns_best_match_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "letters", 26).unwrap();
        store
            .append(vec![
                indexed("wheat", "wheat sowing in autumn"),
                indexed("pest", "aphids on potato leaves"),
            ])
            .await
            .unwrap();
        drop(store);

        let handle = VectorIndexHandle::open(dir.path(), Arc::new(LetterEmbedder))
            .unwrap()
            .unwrap();
        let hits = handle.similar("potato aphids", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, "pest");
    }

    #[tokio::test]
    async fn test_similar_rejects_blank_question() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::create(dir.path(), "letters", 26).unwrap();
        let handle = VectorIndexHandle::new(Arc::new(store), Arc::new(LetterEmbedder));
        assert!(matches!(
            handle.similar("   ", 3).await,
            Err(SearchError::InvalidQuery(_))
        ));
    }
}
