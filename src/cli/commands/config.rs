use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{API_KEY_ENV, Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file")]
    Init {
        #[arg(
            long,
            short = 'g',
            help = "Create global config instead of project config"
        )]
        global: bool,
        #[arg(long, short = 'f', help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file paths")]
    Path,
}

pub async fn handle_config(
    cmd: ConfigCommand,
    explicit: Option<&Path>,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => {
            handle_init(explicit, global, force, formatter.as_ref())
        }
        ConfigCommand::Show => handle_show(explicit, format),
        ConfigCommand::Path => handle_path(explicit),
    }
}

fn init_target(explicit: Option<&Path>, global: bool) -> Result<PathBuf> {
    if global {
        return Config::global_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"));
    }
    Ok(explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::project_path))
}

fn handle_init(
    explicit: Option<&Path>,
    global: bool,
    force: bool,
    formatter: &dyn Formatter,
) -> Result<()> {
    let path = init_target(explicit, global)?;

    if path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("failed to write config to {}", path.display()))?;
    println!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", path.display()))
    );

    Ok(())
}

/// Copy of the config safe to print.
fn redacted(mut config: Config) -> Config {
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some("********".to_string());
    }
    if config.generation.api_key.is_some() {
        config.generation.api_key = Some("********".to_string());
    }
    config
}

fn handle_show(explicit: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = redacted(Config::load(explicit)?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    match Config::resolve_path(explicit) {
        Some(path) => println!("# Loaded from: {}", path.display()),
        None => println!("# Built-in defaults"),
    }
    if config.embedding.api_key.is_none() {
        let state = if std::env::var(API_KEY_ENV).is_ok() {
            "set"
        } else {
            "not set"
        };
        println!("# {API_KEY_ENV}: {state}");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}

fn handle_path(explicit: Option<&Path>) -> Result<()> {
    println!("Configuration paths:");
    println!();

    match Config::resolve_path(explicit) {
        Some(path) => println!("Active config: {}", path.display()),
        None => println!("Active config: (defaults)"),
    }
    println!("Project config: {}", Config::project_path().display());
    if let Some(path) = Config::global_path() {
        println!("Global config:  {}", path.display());
    }

    if let Ok(cwd) = std::env::current_dir() {
        let env_path = cwd.join(".env");
        let state = if env_path.exists() { "active" } else { "absent" };
        println!(".env file ({state}): {}", env_path.display());
    }

    Ok(())
}
