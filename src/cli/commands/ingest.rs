//! Ingest command implementation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use super::build_embedder;
use crate::cli::output::get_formatter;
use crate::error::IndexError;
use crate::models::{Config, OutputFormat};
use crate::services::{
    BatchIndexer, BatchProgress, DocumentLoader, IndexerSettings, IngestOutcome, IngestPipeline,
    ProgressCallback, TextChunker,
};

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Directory containing the PDF files
    #[arg(long, short = 'd')]
    pub dir: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, short = 'i')]
    pub index: Option<PathBuf>,

    /// Also load PDFs in subdirectories
    #[arg(long, short = 'r')]
    pub recursive: bool,

    /// Delete the existing index and embed everything again
    #[arg(long)]
    pub rebuild: bool,

    /// Show what would be indexed without calling the embedding service
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_ingest(
    args: IngestArgs,
    config: &Config,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut config = config.clone();
    if let Some(dir) = args.dir {
        config.documents.dir = dir;
    }
    if let Some(index) = args.index {
        config.index.dir = index;
    }
    if args.recursive {
        config.documents.recursive = true;
    }

    let formatter = get_formatter(format);
    let start_time = Instant::now();

    if args.dry_run {
        let pipeline = build_pipeline(&config, cancel, None)?;
        let (report, _) = pipeline.plan(&config.documents.dir).await?;
        print!("{}", formatter.format_ingest_report(&report, true));
        return Ok(());
    }

    if args.rebuild && config.index.dir.exists() {
        std::fs::remove_dir_all(&config.index.dir).with_context(|| {
            format!("failed to remove index at {}", config.index.dir.display())
        })?;
        tracing::info!(location = %config.index.dir.display(), "removed existing index");
    }

    let outcome = ingest(&config, cancel, format == OutputFormat::Text).await?;
    print!("{}", formatter.format_ingest_report(&outcome.report, false));

    if outcome.handle.is_none() {
        println!(
            "{}",
            formatter.format_message(&format!(
                "No PDF content found in {}",
                config.documents.dir.display()
            ))
        );
    }
    if verbose {
        eprintln!("Finished in {}ms", start_time.elapsed().as_millis());
    }

    Ok(())
}

/// Run the full pipeline on a background task.
pub(crate) async fn ingest(
    config: &Config,
    cancel: CancellationToken,
    show_progress: bool,
) -> Result<IngestOutcome> {
    let bar = show_progress.then(progress_bar);
    let callback = bar.clone().map(progress_callback);

    let pipeline = build_pipeline(config, cancel, callback)?;
    let result = pipeline
        .spawn(config.documents.dir.clone(), config.index.dir.clone())
        .await
        .map_err(|e| IndexError::Task(e.to_string()));

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    match result.and_then(|r| r) {
        Ok(outcome) => Ok(outcome),
        Err(IndexError::Cancelled { completed_batches }) => {
            anyhow::bail!(
                "ingestion cancelled after {completed_batches} batch(es); run ingest again to resume"
            )
        }
        Err(e) => Err(e).context("ingestion failed; completed batches are kept"),
    }
}

fn build_pipeline(
    config: &Config,
    cancel: CancellationToken,
    progress: Option<ProgressCallback>,
) -> Result<IngestPipeline> {
    let loader = DocumentLoader::new(&config.documents);
    let chunker = TextChunker::from_config(&config.index)?;
    let embedder = build_embedder(config)?;

    let mut indexer = BatchIndexer::new(embedder, IndexerSettings::from_config(&config.index))
        .with_cancellation(cancel);
    if let Some(progress) = progress {
        indexer = indexer.with_progress(progress);
    }

    Ok(IngestPipeline::new(loader, chunker, indexer))
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn progress_callback(pb: ProgressBar) -> ProgressCallback {
    Arc::new(move |event: BatchProgress| match event {
        BatchProgress::Planned {
            batches, skipped, ..
        } => {
            pb.set_length(batches as u64);
            if skipped > 0 {
                pb.println(format!("{skipped} chunk(s) already indexed"));
            }
        }
        BatchProgress::Retrying {
            batch_index,
            attempt,
            delay,
        } => {
            pb.set_message(format!(
                "batch {} attempt {} failed, waiting {}s",
                batch_index + 1,
                attempt,
                delay.as_secs()
            ));
        }
        BatchProgress::Completed { .. } => {
            pb.set_message("");
            pb.inc(1);
        }
    })
}
