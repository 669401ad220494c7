//! CLI module for docqa.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Ask questions about a folder of PDF documents.
#[derive(Debug, Parser)]
#[command(name = "docqa")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        short = 'c',
        global = true,
        env = "DOCQA_CONFIG",
        help = "Path to a config file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load PDFs, chunk them and build or update the vector index
    Ingest(commands::IngestArgs),

    /// Answer a single question from the indexed documents
    Ask(commands::AskArgs),

    /// Interactive question loop
    Chat(commands::ChatArgs),

    /// Show documents, index and model status
    Status,

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
