//! Embedding batch indexer: embeds chunks in fixed-size batches and persists them.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{BatchError, EmbeddingError, IndexError, VectorStoreError};
use crate::models::{Chunk, IndexConfig, IndexedVector};
use crate::services::embedding::Embedder;
use crate::services::index::VectorIndexHandle;
use crate::services::vector_store::{SqliteVectorStore, VectorStore};
use crate::utils::{
    RetryConfig, RetryResult, Sleeper, TokioSleeper, dir_has_entries, sleep_or_cancel, with_retry,
};

/// Batch sizing, pacing and retry policy.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub retry: RetryConfig,
}

impl IndexerSettings {
    pub fn from_config(config: &IndexConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            inter_batch_delay: config.inter_batch_delay(),
            retry: RetryConfig::fixed(config.max_attempts, config.retry_cooldown()),
        }
    }
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self::from_config(&IndexConfig::default())
    }
}

/// Progress events emitted while building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchProgress {
    Planned {
        batches: usize,
        pending: usize,
        skipped: usize,
    },
    Retrying {
        batch_index: usize,
        attempt: u32,
        delay: Duration,
    },
    Completed {
        batch_index: usize,
        batches: usize,
        chunks: usize,
    },
}

pub type ProgressCallback = Arc<dyn Fn(BatchProgress) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub total_chunks: usize,
    pub embedded: usize,
    /// Chunks already present in the index.
    pub skipped: usize,
    /// Stale chunks removed after a successful run.
    pub pruned: usize,
    pub batches: usize,
}

#[derive(Debug)]
pub struct BuildOutcome {
    pub handle: VectorIndexHandle,
    pub stats: BuildStats,
}

pub struct BatchIndexer {
    embedder: Arc<dyn Embedder>,
    settings: IndexerSettings,
    sleeper: Arc<dyn Sleeper>,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl BatchIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, settings: IndexerSettings) -> Self {
        Self {
            embedder,
            settings,
            sleeper: Arc::new(TokioSleeper),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, event: BatchProgress) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Embed and persist `chunks` into the index at `location`.
    ///
    /// Chunks already stored are skipped. Stale chunks are pruned only once
    /// every batch has succeeded; a failed run leaves its progress on disk.
    /// Empty input empties an existing index and is an error otherwise.
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
        location: &Path,
    ) -> Result<BuildOutcome, IndexError> {
        if chunks.is_empty() && !dir_has_entries(location) {
            return Err(IndexError::NothingToIndex);
        }

        let mut store: Option<Arc<dyn VectorStore>> = if dir_has_entries(location) {
            let existing = SqliteVectorStore::open(location)?;
            if existing.embedding_model() != self.embedder.model_id() {
                tracing::warn!(
                    indexed_with = existing.embedding_model(),
                    embedding_with = self.embedder.model_id(),
                    "resuming an index built with a different embedding model"
                );
            }
            Some(Arc::new(existing) as Arc<dyn VectorStore>)
        } else {
            None
        };

        let existing_ids = match &store {
            Some(store) => store.chunk_ids().await?,
            None => HashSet::new(),
        };

        let total_chunks = chunks.len();
        let keep: HashSet<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let mut seen = HashSet::new();
        let pending: Vec<Chunk> = chunks
            .into_iter()
            .filter(|c| !existing_ids.contains(&c.id) && seen.insert(c.id.clone()))
            .collect();

        let batches: Vec<&[Chunk]> = pending.chunks(self.settings.batch_size).collect();
        let mut stats = BuildStats {
            total_chunks,
            skipped: total_chunks - pending.len(),
            batches: batches.len(),
            ..Default::default()
        };

        tracing::info!(
            location = %location.display(),
            total = total_chunks,
            pending = pending.len(),
            skipped = stats.skipped,
            batches = batches.len(),
            "starting index build"
        );
        self.report(BatchProgress::Planned {
            batches: batches.len(),
            pending: pending.len(),
            skipped: stats.skipped,
        });

        for (batch_index, batch) in batches.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(completed = batch_index, "index build cancelled");
                return Err(IndexError::Cancelled {
                    completed_batches: batch_index,
                });
            }

            let start = batch_index * self.settings.batch_size;
            let result = with_retry(
                &self.settings.retry,
                self.sleeper.as_ref(),
                &self.cancel,
                |attempt, error: &BatchError, delay| match delay {
                    Some(delay) => {
                        tracing::warn!(
                            batch = batch_index,
                            attempt,
                            error = %error,
                            cooldown_secs = delay.as_secs(),
                            "batch failed, cooling down"
                        );
                        self.report(BatchProgress::Retrying {
                            batch_index,
                            attempt,
                            delay,
                        });
                    }
                    None => {
                        tracing::error!(
                            batch = batch_index,
                            attempt,
                            error = %error,
                            "batch failed"
                        );
                    }
                },
                |attempt| {
                    tracing::debug!(
                        batch = batch_index,
                        range = ?(start..start + batch.len()),
                        attempt,
                        "embedding batch"
                    );
                    self.embed_and_store(batch, store.clone(), location)
                },
            )
            .await;

            match result {
                RetryResult::Success { value, attempts } => {
                    tracing::info!(
                        batch = batch_index,
                        of = batches.len(),
                        chunks = batch.len(),
                        attempts,
                        "batch stored"
                    );
                    store = Some(value);
                    stats.embedded += batch.len();
                }
                RetryResult::Failed { last_error, attempts } => {
                    return Err(IndexError::BuildFailed {
                        batch_index,
                        attempts,
                        source: last_error,
                    });
                }
                RetryResult::Cancelled { .. } => {
                    return Err(IndexError::Cancelled {
                        completed_batches: batch_index,
                    });
                }
            }

            self.report(BatchProgress::Completed {
                batch_index,
                batches: batches.len(),
                chunks: batch.len(),
            });

            let is_last = batch_index + 1 == batches.len();
            if !is_last
                && !sleep_or_cancel(
                    self.sleeper.as_ref(),
                    self.settings.inter_batch_delay,
                    &self.cancel,
                )
                .await
            {
                return Err(IndexError::Cancelled {
                    completed_batches: batch_index + 1,
                });
            }
        }

        // Either an existing store or one created by the first batch
        let store = store.ok_or(IndexError::NothingToIndex)?;

        stats.pruned = store.retain_only(keep).await?;
        if stats.pruned > 0 {
            tracing::info!(pruned = stats.pruned, "removed stale chunks");
        }

        tracing::info!(
            embedded = stats.embedded,
            skipped = stats.skipped,
            pruned = stats.pruned,
            "index build complete"
        );

        Ok(BuildOutcome {
            handle: VectorIndexHandle::new(store, Arc::clone(&self.embedder)),
            stats,
        })
    }

    /// One attempt: embed the batch, create the store if needed, then append.
    async fn embed_and_store(
        &self,
        batch: &[Chunk],
        store: Option<Arc<dyn VectorStore>>,
        location: &Path,
    ) -> Result<Arc<dyn VectorStore>, BatchError> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                embeddings.len()
            ))
            .into());
        }

        let store = match store {
            Some(store) => store,
            None => {
                let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
                let location = location.to_path_buf();
                let model = self.embedder.model_id().to_string();
                let created = tokio::task::spawn_blocking(move || {
                    SqliteVectorStore::create(&location, &model, dimension)
                })
                .await
                .map_err(|e| VectorStoreError::Task(e.to_string()))??;
                Arc::new(created) as Arc<dyn VectorStore>
            }
        };

        let vectors = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedVector { embedding, chunk })
            .collect();
        store.append(vectors).await?;

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::models::PageUnit;
    use crate::services::index::testing::letter_vector;
    use crate::utils::RecordingSleeper;

    const COOLDOWN: Duration = Duration::from_secs(180);
    const PACING: Duration = Duration::from_secs(12);

    /// Fails the first `failures` calls with the given error, then embeds by letters.
    struct ScriptedEmbedder {
        failures: Mutex<u32>,
        make_error: fn() -> EmbeddingError,
        calls: AtomicUsize,
        embedded_texts: AtomicUsize,
    }

    impl ScriptedEmbedder {
        fn new(failures: u32, make_error: fn() -> EmbeddingError) -> Self {
            Self {
                failures: Mutex::new(failures),
                make_error,
                calls: AtomicUsize::new(0),
                embedded_texts: AtomicUsize::new(0),
            }
        }

        fn healthy() -> Self {
            Self::new(0, || EmbeddingError::Timeout)
        }
    }

    #[async_trait]
    impl Embedder for ScriptedEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut failures = self.failures.lock().unwrap();
                if *failures > 0 {
                    *failures -= 1;
                    return Err((self.make_error)());
                }
            }
            self.embedded_texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(letter_vector(text))
        }

        fn model_id(&self) -> &str {
            "letters"
        }
    }

    fn quota_error() -> EmbeddingError {
        EmbeddingError::ServerError("status 429: quota exceeded".to_string())
    }

    fn chunk(text: &str, page: u32) -> Chunk {
        Chunk::from_page(&PageUnit::new(text, "/docs/crops.pdf", page), text.to_string(), 0)
    }

    fn corpus(n: u32) -> Vec<Chunk> {
        (1..=n).map(|i| chunk(&format!("page {i} about irrigation"), i)).collect()
    }

    fn indexer(embedder: Arc<ScriptedEmbedder>, sleeper: Arc<RecordingSleeper>) -> BatchIndexer {
        BatchIndexer::new(embedder, IndexerSettings::default()).with_sleeper(sleeper)
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let indexer = indexer(
            Arc::new(ScriptedEmbedder::healthy()),
            Arc::new(RecordingSleeper::new()),
        );
        let err = indexer.build(Vec::new(), dir.path()).await.unwrap_err();
        assert!(matches!(err, IndexError::NothingToIndex));
    }

    #[tokio::test]
    async fn test_pacing_between_batches_only() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("index");
        let sleeper = Arc::new(RecordingSleeper::new());
        let embedder = Arc::new(ScriptedEmbedder::healthy());

        let outcome = indexer(embedder.clone(), sleeper.clone())
            .build(corpus(5), &location)
            .await
            .unwrap();

        assert_eq!(outcome.stats.batches, 5);
        assert_eq!(outcome.stats.embedded, 5);
        assert_eq!(sleeper.recorded(), vec![PACING; 4]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.handle.info().await.unwrap().chunk_count, 5);
    }

    #[tokio::test]
    async fn test_recovers_after_fourteen_failures() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let embedder = Arc::new(ScriptedEmbedder::new(14, quota_error));

        let outcome = indexer(embedder.clone(), sleeper.clone())
            .build(corpus(1), dir.path())
            .await
            .unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 15);
        assert_eq!(sleeper.count_of(COOLDOWN), 14);
        assert_eq!(outcome.stats.embedded, 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_fifteen_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let embedder = Arc::new(ScriptedEmbedder::new(u32::MAX, quota_error));

        let err = indexer(embedder.clone(), sleeper.clone())
            .build(corpus(3), dir.path())
            .await
            .unwrap_err();

        match err {
            IndexError::BuildFailed {
                batch_index,
                attempts,
                ..
            } => {
                assert_eq!(batch_index, 0);
                assert_eq!(attempts, 15);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 15);
        assert_eq!(sleeper.count_of(COOLDOWN), 14);
        assert_eq!(sleeper.count_of(PACING), 0);
    }

    #[tokio::test]
    async fn test_rejection_uses_full_attempt_budget() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let embedder = Arc::new(ScriptedEmbedder::new(u32::MAX, || {
            EmbeddingError::Rejected("status 403: API key invalid".to_string())
        }));

        let err = indexer(embedder.clone(), sleeper.clone())
            .build(corpus(2), dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::BuildFailed { attempts: 15, .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 15);
        assert_eq!(sleeper.recorded(), vec![COOLDOWN; 14]);
    }

    #[tokio::test]
    async fn test_malformed_responses_exhaust_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let embedder = Arc::new(ScriptedEmbedder::new(u32::MAX, || {
            EmbeddingError::InvalidResponse("garbled body from proxy".to_string())
        }));

        let err = indexer(embedder.clone(), sleeper.clone())
            .build(corpus(1), dir.path())
            .await
            .unwrap_err();

        match err {
            IndexError::BuildFailed {
                batch_index,
                attempts,
                source,
            } => {
                assert_eq!(batch_index, 0);
                assert_eq!(attempts, 15);
                assert!(source.to_string().contains("garbled"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 15);
        assert_eq!(sleeper.count_of(COOLDOWN), 14);
        assert!(!dir_has_entries(dir.path()));
    }

    #[tokio::test]
    async fn test_empty_input_empties_existing_index() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());

        indexer(Arc::new(ScriptedEmbedder::healthy()), sleeper.clone())
            .build(corpus(2), dir.path())
            .await
            .unwrap();

        let embedder = Arc::new(ScriptedEmbedder::healthy());
        let outcome = indexer(embedder.clone(), sleeper)
            .build(Vec::new(), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.stats.pruned, 2);
        assert_eq!(outcome.stats.batches, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.handle.info().await.unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn test_resume_skips_stored_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());

        indexer(Arc::new(ScriptedEmbedder::healthy()), sleeper.clone())
            .build(corpus(3), dir.path())
            .await
            .unwrap();

        let embedder = Arc::new(ScriptedEmbedder::healthy());
        let outcome = indexer(embedder.clone(), sleeper)
            .build(corpus(4), dir.path())
            .await
            .unwrap();

        assert_eq!(outcome.stats.skipped, 3);
        assert_eq!(outcome.stats.embedded, 1);
        assert_eq!(embedder.embedded_texts.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.handle.info().await.unwrap().chunk_count, 4);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_prune() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = Arc::new(RecordingSleeper::new());
        let old = corpus(2);

        indexer(Arc::new(ScriptedEmbedder::healthy()), sleeper.clone())
            .build(old.clone(), dir.path())
            .await
            .unwrap();

        // Drop the first chunk and add a new one; embedding keeps failing
        let next = vec![old[1].clone(), chunk("fresh notes on compost", 9)];
        let failing = Arc::new(ScriptedEmbedder::new(u32::MAX, || {
            EmbeddingError::InvalidResponse("garbage".to_string())
        }));
        assert!(
            indexer(failing, sleeper.clone())
                .build(next.clone(), dir.path())
                .await
                .is_err()
        );

        let store = SqliteVectorStore::open(dir.path()).unwrap();
        let ids = store.chunk_ids().await.unwrap();
        assert!(ids.contains(&old[0].id));
        assert_eq!(ids.len(), 2);

        let outcome = indexer(Arc::new(ScriptedEmbedder::healthy()), sleeper)
            .build(next.clone(), dir.path())
            .await
            .unwrap();
        assert_eq!(outcome.stats.pruned, 1);
        let ids = outcome.handle.store().chunk_ids().await.unwrap();
        let expected: HashSet<String> = next.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_batch() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let embedder = Arc::new(ScriptedEmbedder::healthy());

        let indexer = indexer(embedder.clone(), Arc::new(RecordingSleeper::new()))
            .with_cancellation(cancel)
            .with_progress(Arc::new(move |event: BatchProgress| {
                if matches!(event, BatchProgress::Completed { .. }) {
                    trigger.cancel();
                }
            }));

        let err = indexer.build(corpus(3), dir.path()).await.unwrap_err();

        assert!(matches!(
            err,
            IndexError::Cancelled {
                completed_batches: 1
            }
        ));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        // Completed batches stay on disk
        let store = SqliteVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.info().await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_progress_events() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        indexer(
            Arc::new(ScriptedEmbedder::new(1, quota_error)),
            Arc::new(RecordingSleeper::new()),
        )
        .with_progress(Arc::new(move |event: BatchProgress| sink.lock().unwrap().push(event)))
        .build(corpus(2), dir.path())
        .await
        .unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events[0],
            BatchProgress::Planned {
                batches: 2,
                pending: 2,
                skipped: 0
            }
        );
        assert_eq!(
            events[1],
            BatchProgress::Retrying {
                batch_index: 0,
                attempt: 1,
                delay: COOLDOWN
            }
        );
        assert_eq!(events.len(), 4);
    }
}
