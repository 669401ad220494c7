pub mod answerer;
pub mod chunker;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod indexer;
pub mod loader;
pub mod pipeline;
pub mod vector_store;

pub use answerer::Answerer;
pub use chunker::TextChunker;
pub use embedding::{Embedder, GeminiEmbeddingClient, HttpEmbeddingClient, create_embedder};
pub use generation::{GeminiGenerationClient, GenerationRequest, Generator};
pub use index::VectorIndexHandle;
pub use indexer::{
    BatchIndexer, BatchProgress, BuildOutcome, BuildStats, IndexerSettings, ProgressCallback,
};
pub use loader::{Discovery, DocumentLoader, LoadReport, LopdfExtractor, PageExtractor};
pub use pipeline::{IngestOutcome, IngestPipeline, IngestReport};
pub use vector_store::{INDEX_FILE, IndexInfo, SqliteVectorStore, VectorStore};
