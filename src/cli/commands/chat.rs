//! Interactive question loop.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::ingest::ingest;
use super::{build_answerer, build_embedder, open_index, resolve_k};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Number of chunks to retrieve per question
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Build the index first when none exists
    #[arg(long)]
    pub ingest: bool,

    /// Hide the retrieved source chunks
    #[arg(long)]
    pub no_sources: bool,
}

fn is_exit_command(input: &str) -> bool {
    EXIT_WORDS.contains(&input.to_lowercase().as_str())
}

pub async fn handle_chat(
    args: ChatArgs,
    config: &Config,
    format: OutputFormat,
    _verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let formatter = get_formatter(format);
    let k = resolve_k(args.k, config)?;
    let embedder = build_embedder(config)?;

    let index = match open_index(&config.index.dir, embedder.clone())? {
        Some(index) => index,
        None if args.ingest => {
            println!(
                "{}",
                formatter.format_message("No index found; building it from the documents.")
            );
            let outcome = ingest(config, cancel.clone(), format == OutputFormat::Text).await?;
            print!("{}", formatter.format_ingest_report(&outcome.report, false));
            outcome.handle.ok_or_else(|| {
                anyhow::anyhow!(
                    "no PDF content found in {}",
                    config.documents.dir.display()
                )
            })?
        }
        None => anyhow::bail!(
            "no index found at {}; run `docqa ingest` or pass --ingest",
            config.index.dir.display()
        ),
    };

    let answerer = build_answerer(&config.generation)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{}",
        formatter.format_message("Ask a question about your documents (quit, exit or q to leave).")
    );

    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush().context("failed to flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = cancel.cancelled() => None,
        };
        let Some(line) = line else {
            break;
        };

        let question = line.trim();
        if is_exit_command(question) {
            break;
        }
        if question.is_empty() {
            eprint!("{}", formatter.format_error("Please enter a question."));
            continue;
        }

        let result = answerer.answer(&index, question, k).await;
        print!(
            "{}",
            formatter.format_answer(question, &result, !args.no_sources)
        );
    }

    println!();
    Ok(())
}
