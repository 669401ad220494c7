use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{DocumentLoader, SqliteVectorStore, VectorStore};
use crate::utils::dir_has_entries;

pub async fn handle_status(config: &Config, format: OutputFormat, verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    let pdf_count = DocumentLoader::new(&config.documents)
        .discover(&config.documents.dir)
        .map_or(0, |found| found.files.len());

    // Read the store directly: status works without an API key
    let index = if dir_has_entries(&config.index.dir) {
        match SqliteVectorStore::open(&config.index.dir) {
            Ok(store) => Some(store.info().await?),
            Err(e) => {
                if verbose {
                    eprintln!("Index unreadable: {e}");
                }
                None
            }
        }
    } else {
        None
    };

    let status = StatusInfo {
        documents_dir: config.documents.dir.display().to_string(),
        pdf_count,
        index_dir: config.index.dir.display().to_string(),
        index,
        embedding_provider: config.embedding.provider.to_string(),
        embedding_model: config.embedding.model.clone(),
        generation_model: config.generation.model.clone(),
    };

    print!("{}", formatter.format_status(&status));

    match &status.index {
        None => {
            eprintln!();
            eprintln!("Hint: no index yet. Build it with: docqa ingest");
        }
        Some(info) if info.embedding_model != config.embedding.model => {
            eprintln!();
            eprintln!(
                "Warning: index was built with {}, config uses {}. Run: docqa ingest --rebuild",
                info.embedding_model, config.embedding.model
            );
        }
        Some(_) => {}
    }

    Ok(())
}
