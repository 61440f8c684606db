//! StepForge CLI — the main entry point.
//!
//! Commands:
//! - `templates` — List the effective agent templates and where they came from
//! - `parse`     — Feed a file through the tag parser in chunks and print events
//! - `run`       — Run an agent turn against a replayed model transcript

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stepforge_config::AppConfig;

mod commands;
mod local_client;
mod replay;

#[derive(Parser)]
#[command(
    name = "stepforge",
    about = "StepForge — streaming tool-call agent runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs and command output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to ~/.stepforge/config.toml)
    #[arg(long, global = true, env = "STEPFORGE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the effective agent templates
    Templates,

    /// Parse a file as a model stream and print the tag events
    Parse {
        /// File to parse
        file: PathBuf,

        /// Fragment size in characters
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
    },

    /// Run an agent turn
    Run {
        /// Template id of the root agent
        #[arg(short, long, default_value = "base")]
        template: String,

        /// Prompt for the root agent
        #[arg(short, long)]
        prompt: Option<String>,

        /// Params for the root agent, as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Model responses to replay, separated by `---` lines
        #[arg(long)]
        replay: PathBuf,

        /// Fragment size in characters for replayed responses
        #[arg(long, default_value_t = 16)]
        chunk_size: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Templates => commands::templates::run(&config, cli.json)?,
        Commands::Parse { file, chunk_size } => {
            commands::parse::run(&file, chunk_size, config.runtime.max_tag_len, cli.json).await?
        }
        Commands::Run {
            template,
            prompt,
            params,
            replay,
            chunk_size,
        } => {
            let args = commands::run::RunArgs {
                template,
                prompt,
                params,
                replay,
                chunk_size,
                json: cli.json,
            };
            commands::run::run(config, args).await?
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return AppConfig::load().context("Failed to load config");
    };
    let mut config =
        AppConfig::load_from(path).with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}
