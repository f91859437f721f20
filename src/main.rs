//! Lydbok CLI entry point.

use anyhow::Result;
use clap::Parser;
use lydbok::cli::{commands, Cli, Commands};
use lydbok::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("lydbok={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    // Execute command
    match &cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Run => {
            commands::run_run(settings).await?;
        }

        Commands::Add {
            book_id,
            title,
            manifest,
            duration_ms,
        } => {
            commands::run_add(book_id, title, manifest, *duration_ms, settings).await?;
        }

        Commands::Setup {
            book_id,
            model,
            stage,
            force,
            priority,
        } => {
            commands::run_setup(book_id, model, stage, *force, *priority, settings).await?;
        }

        Commands::Books => {
            commands::run_books(settings).await?;
        }

        Commands::Status { book_id } => {
            commands::run_status(book_id, settings).await?;
        }

        Commands::Jobs { action } => {
            commands::run_jobs(action, settings).await?;
        }

        Commands::Search {
            book_id,
            query,
            limit,
            no_expand,
        } => {
            commands::run_search(book_id, query, *limit, *no_expand, settings).await?;
        }

        Commands::Cache { action } => {
            commands::run_cache(action, settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings)?;
        }
    }

    Ok(())
}
