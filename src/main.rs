use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use docqa::cli::commands::{handle_ask, handle_chat, handle_config, handle_ingest, handle_status};
use docqa::cli::output::get_formatter;
use docqa::cli::{Cli, Commands};
use docqa::models::{Config, OutputFormat};

fn init_tracing(verbose: bool) {
    let default = if verbose { "docqa=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format.unwrap_or_default();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        eprintln!("\nReceived shutdown signal, stopping...");
        trigger.cancel();
    });

    if let Err(e) = run_command(cli, format, cancel).await {
        eprint!("{}", get_formatter(format).format_error(&format!("{e:#}")));
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(cli: Cli, format: OutputFormat, cancel: CancellationToken) -> Result<()> {
    let verbose = cli.verbose;
    let explicit = cli.config.as_deref();

    // `config init` and `config path` must work when the current file is invalid
    let load = || Config::load(explicit);

    match cli.command {
        Commands::Ingest(args) => handle_ingest(args, &load()?, format, verbose, cancel).await?,
        Commands::Ask(args) => handle_ask(args, &load()?, format, verbose).await?,
        Commands::Chat(args) => handle_chat(args, &load()?, format, verbose, cancel).await?,
        Commands::Status => handle_status(&load()?, format, verbose).await?,
        Commands::Config(cmd) => handle_config(cmd, explicit, format, verbose).await?,
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
