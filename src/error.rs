//! Error types for the document question-answering pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while discovering and parsing PDF files.
///
/// None of these abort a load: they are collected in the load report.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("document directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("directory walk error: {0}")]
    Walk(String),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding service: {0}")]
    ConnectionError(String),

    #[error("embedding service error: {0}")]
    ServerError(String),

    #[error("embedding request rejected: {0}")]
    Rejected(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("missing API key for embedding service")]
    MissingApiKey,

    #[error("embedding timeout")]
    Timeout,
}

/// Errors related to the persisted vector index.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a vector index: {}", .0.display())]
    NotAnIndex(PathBuf),

    #[error("embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store task failed: {0}")]
    Task(String),
}

/// Errors from the text generation service.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation request rejected: {0}")]
    Rejected(String),

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    #[error("generation timeout")]
    Timeout,

    #[error("missing API key for generation service")]
    MissingApiKey,
}

/// A single embed-and-store attempt for one batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// Errors related to building the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no chunks to index")]
    NothingToIndex,

    #[error("batch {batch_index} failed after {attempts} attempt(s): {source}")]
    BuildFailed {
        batch_index: usize,
        attempts: u32,
        #[source]
        source: BatchError,
    },

    #[error("ingestion cancelled after {completed_batches} batch(es)")]
    Cancelled { completed_batches: usize },

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("ingestion task failed: {0}")]
    Task(String),
}

/// Errors raised while retrieving chunks for a question.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStoreError(#[from] VectorStoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}
