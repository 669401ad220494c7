mod ask;
mod chat;
mod config;
mod ingest;
mod status;

pub use ask::AskArgs;
pub use chat::ChatArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;

pub use ask::handle_ask;
pub use chat::handle_chat;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use status::handle_status;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Config, GenerationConfig};
use crate::services::{
    Answerer, Embedder, GeminiGenerationClient, VectorIndexHandle, create_embedder,
};

/// Open the configured index, or `None` when it has not been built.
pub(crate) fn open_index(
    location: &Path,
    embedder: Arc<dyn Embedder>,
) -> Result<Option<VectorIndexHandle>> {
    VectorIndexHandle::open(location, embedder)
        .with_context(|| format!("failed to open index at {}", location.display()))
}

pub(crate) fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    create_embedder(&config.embedding).context("failed to create embedding client")
}

pub(crate) fn build_answerer(config: &GenerationConfig) -> Result<Answerer> {
    let generator =
        GeminiGenerationClient::new(config).context("failed to create generation client")?;
    Ok(Answerer::new(Arc::new(generator), config))
}

pub(crate) fn resolve_k(requested: Option<usize>, config: &Config) -> Result<usize> {
    let k = requested.unwrap_or(config.retrieval.k);
    if k == 0 {
        anyhow::bail!("k must be at least 1");
    }
    Ok(k)
}
