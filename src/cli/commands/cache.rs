//! Cache command implementation.

use crate::cache::TranscriptionCache;
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use anyhow::Result;
use chrono::{TimeZone, Utc};

/// Run a cache subcommand.
pub fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    let cache = TranscriptionCache::new(settings.transcription_cache_dir());

    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            Output::header("Transcription cache");
            Output::kv("entries", &stats.entries.to_string());
            Output::kv("size", &format!("{:.1} KiB", stats.total_bytes as f64 / 1024.0));
            if let Some(timestamp) = stats.oldest_timestamp {
                Output::kv("oldest entry", &format_entry_time(timestamp));
            }
            if let Some(timestamp) = stats.newest_timestamp {
                Output::kv("newest entry", &format_entry_time(timestamp));
            }
        }

        CacheAction::Clear { max_age_days } => {
            let max_age = max_age_days.unwrap_or(settings.cache.max_age_days);
            let removed = cache.clear_old(max_age)?;
            Output::success(&format!(
                "Removed {} cache entr{} older than {} day(s)",
                removed,
                if removed == 1 { "y" } else { "ies" },
                max_age
            ));
        }
    }

    Ok(())
}

fn format_entry_time(timestamp: i64) -> String {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
