//! Tolk CLI entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tolk::cli::{commands, Cli, Commands};
use tolk::config::{load_dotenv, Settings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // .env values win over the inherited environment
    let dotenv = load_dotenv();

    let cli = Cli::parse();

    // Load configuration
    let config_path = cli.config.as_ref().map(PathBuf::from);
    let settings = Settings::load_from(config_path.as_ref())?;

    // Initialize logging
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tolk={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Some(path) = dotenv {
        tracing::debug!("Loaded environment from {:?}", path);
    }

    // Ensure data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match cli.command {
        Commands::Chat { thread, model } => {
            commands::run_chat(thread, model, settings).await?;
        }

        Commands::Ask {
            message,
            thread,
            model,
        } => {
            commands::run_ask(&message, thread, model, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host, port, settings).await?;
        }

        Commands::Tools { json } => {
            commands::run_tools(&settings, json)?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(&action, settings, config_path)?;
        }
    }

    Ok(())
}
