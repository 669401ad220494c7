//! Load → chunk → index, as one ingestion run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::error::IndexError;
use crate::models::Chunk;
use crate::services::chunker::TextChunker;
use crate::services::index::VectorIndexHandle;
use crate::services::indexer::{BatchIndexer, BuildStats};
use crate::services::loader::{DocumentLoader, LoadReport};
use crate::utils::dir_has_entries;

/// What an ingestion run did, for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_loaded: usize,
    pub pages: usize,
    pub blank_pages: usize,
    pub failures: Vec<String>,
    pub chunks: usize,
    /// `None` when nothing was indexed (no pages, or a dry run).
    pub build: Option<BuildStats>,
}

impl IngestReport {
    fn from_load(report: &LoadReport, chunks: usize) -> Self {
        Self {
            files_scanned: report.files_scanned,
            files_loaded: report.files_loaded,
            pages: report.pages.len(),
            blank_pages: report.blank_pages,
            failures: report.failures.iter().map(ToString::to_string).collect(),
            chunks,
            build: None,
        }
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub report: IngestReport,
    pub handle: Option<VectorIndexHandle>,
}

pub struct IngestPipeline {
    loader: Arc<DocumentLoader>,
    chunker: TextChunker,
    indexer: BatchIndexer,
}

impl IngestPipeline {
    pub fn new(loader: DocumentLoader, chunker: TextChunker, indexer: BatchIndexer) -> Self {
        Self {
            loader: Arc::new(loader),
            chunker,
            indexer,
        }
    }

    /// Load and chunk without touching the index.
    pub async fn plan(&self, documents: &Path) -> Result<(IngestReport, Vec<Chunk>), IndexError> {
        let loader = Arc::clone(&self.loader);
        let directory = documents.to_path_buf();
        let load = tokio::task::spawn_blocking(move || loader.load(&directory))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?;

        let chunks = self.chunker.split(&load.pages);
        Ok((IngestReport::from_load(&load, chunks.len()), chunks))
    }

    /// Full run. A corpus with no extractable pages is reported, not an error,
    /// and empties an index left from earlier runs. A missing documents
    /// directory leaves the index alone.
    pub async fn run(
        &self,
        documents: &Path,
        location: &Path,
    ) -> Result<IngestOutcome, IndexError> {
        let (mut report, chunks) = self.plan(documents).await?;
        if chunks.is_empty() && (!documents.is_dir() || !dir_has_entries(location)) {
            tracing::warn!(documents = %documents.display(), "nothing to index");
            return Ok(IngestOutcome {
                report,
                handle: None,
            });
        }

        let outcome = self.indexer.build(chunks, location).await?;
        report.build = Some(outcome.stats);
        Ok(IngestOutcome {
            report,
            handle: Some(outcome.handle),
        })
    }

    /// Run on a background task; cancel through the indexer's token.
    pub fn spawn(
        self,
        documents: PathBuf,
        location: PathBuf,
    ) -> JoinHandle<Result<IngestOutcome, IndexError>> {
        tokio::spawn(async move { self.run(&documents, &location).await })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::LoadError;
    use crate::models::{DocumentsConfig, IndexConfig};
    use crate::services::index::testing::LetterEmbedder;
    use crate::services::indexer::IndexerSettings;
    use crate::services::loader::PageExtractor;
    use crate::services::vector_store::{SqliteVectorStore, VectorStore};
    use crate::utils::RecordingSleeper;

    struct MapExtractor(HashMap<String, Vec<String>>);

    impl PageExtractor for MapExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, LoadError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.0.get(&name).cloned().ok_or(LoadError::Parse {
                path: path.to_path_buf(),
                message: "corrupt".to_string(),
            })
        }
    }

    fn pipeline(pages: HashMap<String, Vec<String>>) -> IngestPipeline {
        let loader = DocumentLoader::with_extractor(
            &DocumentsConfig::default(),
            Box::new(MapExtractor(pages)),
        );
        let chunker = TextChunker::from_config(&IndexConfig::default()).unwrap();
        let indexer = BatchIndexer::new(Arc::new(LetterEmbedder), IndexerSettings::default())
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        IngestPipeline::new(loader, chunker, indexer)
    }

    #[tokio::test]
    async fn test_missing_documents_directory() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = pipeline(HashMap::new())
            .run(&dir.path().join("missing"), &dir.path().join("index"))
            .await
            .unwrap();

        assert!(outcome.handle.is_none());
        assert_eq!(outcome.report.failures.len(), 1);
        assert!(!dir.path().join("index").exists());
    }

    #[tokio::test]
    async fn test_spawned_run_indexes_and_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("good.pdf"), b"%PDF").unwrap();
        std::fs::write(docs.join("broken.pdf"), b"%PDF").unwrap();

        let pages = HashMap::from([(
            "good.pdf".to_string(),
            vec!["Rotate crops yearly.".to_string(), "   ".to_string()],
        )]);

        let outcome = pipeline(pages)
            .spawn(docs, dir.path().join("index"))
            .await
            .unwrap()
            .unwrap();

        let report = outcome.report;
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.files_loaded, 1);
        assert_eq!(report.pages, 2);
        assert_eq!(report.blank_pages, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.chunks, 1);
        assert_eq!(report.build.unwrap().embedded, 1);
        assert!(outcome.handle.is_some());
    }

    #[tokio::test]
    async fn test_emptied_corpus_empties_index() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        let index = dir.path().join("index");
        std::fs::create_dir(&docs).unwrap();
        std::fs::write(docs.join("a.pdf"), b"%PDF").unwrap();
        let pages = HashMap::from([("a.pdf".to_string(), vec!["Mulch in autumn.".to_string()])]);

        pipeline(pages.clone()).run(&docs, &index).await.unwrap();

        // A missing documents directory keeps the index
        let missing = pipeline(pages.clone())
            .run(&dir.path().join("elsewhere"), &index)
            .await
            .unwrap();
        assert!(missing.handle.is_none());
        let store = SqliteVectorStore::open(&index).unwrap();
        assert_eq!(store.chunk_ids().await.unwrap().len(), 1);

        std::fs::remove_file(docs.join("a.pdf")).unwrap();
        let outcome = pipeline(pages).run(&docs, &index).await.unwrap();

        assert_eq!(outcome.report.chunks, 0);
        assert_eq!(outcome.report.build.unwrap().pruned, 1);
        let handle = outcome.handle.unwrap();
        assert_eq!(handle.info().await.unwrap().chunk_count, 0);
    }
}
