mod answer;
mod config;
mod document;
mod search;

pub use answer::{AnswerFailure, AnswerResult, AnswerStatus, FALLBACK_ANSWER};
pub use config::{
    API_KEY_ENV, Config, DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, DocumentsConfig,
    EmbeddingConfig, EmbeddingProvider, GenerationConfig, IndexConfig, RetrievalConfig,
};
pub use document::{Chunk, IndexedVector, PageUnit};
pub use search::{OutputFormat, ScoredChunk};
