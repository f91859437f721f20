//! Init command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::db::Database;
use anyhow::Result;

/// Run the init command.
pub fn run_init(settings: &Settings) -> Result<()> {
    Output::header("Initializing Lydbok");

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Config already exists at {}", config_path.display()));
    } else {
        settings.save()?;
        Output::success(&format!("Created config at {}", config_path.display()));
    }

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;
    std::fs::create_dir_all(settings.transcription_cache_dir())?;
    Output::success(&format!("Data directory: {}", settings.data_dir().display()));

    // Opening the database creates the schema.
    Database::open(&settings.database_path())?;
    Output::success(&format!("Database: {}", settings.database_path().display()));

    Output::info("Run 'lydbok add' to register a book, then 'lydbok setup' and 'lydbok run'.");
    Ok(())
}
