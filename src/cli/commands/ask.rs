use anyhow::Result;
use clap::Args;

use super::{build_answerer, build_embedder, open_index, resolve_k};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question to answer
    #[arg(required = true)]
    pub question: String,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub k: Option<usize>,

    /// Sampling temperature for the generation model (0.0 to 2.0)
    #[arg(long, short = 't')]
    pub temperature: Option<f32>,

    /// Hide the retrieved source chunks
    #[arg(long)]
    pub no_sources: bool,
}

pub async fn handle_ask(
    args: AskArgs,
    config: &Config,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let k = resolve_k(args.k, config)?;

    let embedder = build_embedder(config)?;
    let Some(index) = open_index(&config.index.dir, embedder)? else {
        anyhow::bail!(
            "no index found at {}; run `docqa ingest` first",
            config.index.dir.display()
        );
    };

    let mut answerer = build_answerer(&config.generation)?;
    if let Some(temperature) = args.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        answerer = answerer.with_temperature(temperature);
    }

    let result = answerer.answer(&index, &args.question, k).await;
    print!(
        "{}",
        formatter.format_answer(&args.question, &result, !args.no_sources)
    );

    Ok(())
}
