//! File-based cache for transcription results.
//!
//! Transcription is by far the most expensive stage, so results are cached
//! on disk keyed by the exact request. The cache is strictly best-effort:
//! a read or write failure is treated as a miss and never fails the caller.

use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Identity of one transcription request.
///
/// Any field change produces a different cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub provider_type: String,
    pub provider_model: String,
    pub audio_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

/// One cache file: the result plus enough context to audit it.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    result: serde_json::Value,
    /// Unix milliseconds when the entry was written.
    timestamp: i64,
    request: TranscriptionRequest,
}

/// Summary of cache contents.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    /// Unix milliseconds of the oldest entry, if any.
    pub oldest_timestamp: Option<i64>,
    /// Unix milliseconds of the newest entry, if any.
    pub newest_timestamp: Option<i64>,
}

/// File-based transcription cache.
pub struct TranscriptionCache {
    dir: PathBuf,
}

impl TranscriptionCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Cache key for a request: the sha256 of its sorted components.
    ///
    /// Components are sorted so the key does not depend on field order.
    pub fn generate_cache_key(request: &TranscriptionRequest) -> String {
        let mut components = vec![
            format!("provider_type:{}", request.provider_type),
            format!("provider_model:{}", request.provider_model),
            format!("audio_url:{}", request.audio_url),
        ];
        if let Some(start_time) = request.start_time {
            components.push(format!("start_time:{}", start_time));
        }
        if let Some(duration) = request.duration {
            components.push(format!("duration:{}", duration));
        }
        if let Some(offset) = request.offset {
            components.push(format!("offset:{}", offset));
        }

        components.sort();
        let mut hasher = Sha256::new();
        hasher.update(components.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Look up a cached result. Any error reading or parsing the entry is
    /// a miss.
    #[instrument(skip(self, request))]
    pub fn get(&self, request: &TranscriptionRequest) -> Option<serde_json::Value> {
        let key = Self::generate_cache_key(request);
        let path = self.entry_path(&key);

        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => {
                debug!("Cache hit for {}", key);
                Some(entry.result)
            }
            Err(e) => {
                warn!("Discarding malformed cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store a result. Failures are logged and swallowed, never propagated.
    #[instrument(skip(self, request, result))]
    pub fn store(&self, request: &TranscriptionRequest, result: &serde_json::Value) {
        let key = Self::generate_cache_key(request);
        let entry = CacheEntry {
            result: result.clone(),
            timestamp: Utc::now().timestamp_millis(),
            request: request.clone(),
        };

        if let Err(e) = self.write_entry(&key, &entry) {
            warn!("Failed to write cache entry {}: {}", key, e);
        }
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string(entry)?;
        std::fs::write(self.entry_path(key), content)?;
        debug!("Cached transcription result as {}", key);
        Ok(())
    }

    /// Remove entries older than the given age. Unreadable entries are
    /// removed too. Returns the number of files deleted.
    #[instrument(skip(self))]
    pub fn clear_old(&self, max_age_days: u32) -> Result<usize> {
        let cutoff = Utc::now().timestamp_millis() - i64::from(max_age_days) * 86_400_000;
        let mut removed = 0;

        for path in self.entry_files()? {
            let stale = match read_timestamp(&path) {
                Some(timestamp) => timestamp < cutoff,
                None => true,
            };
            if stale && std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }

        Ok(removed)
    }

    /// Summarize cache contents.
    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            entries: 0,
            total_bytes: 0,
            oldest_timestamp: None,
            newest_timestamp: None,
        };

        for path in self.entry_files()? {
            stats.entries += 1;
            if let Ok(meta) = std::fs::metadata(&path) {
                stats.total_bytes += meta.len();
            }
            if let Some(timestamp) = read_timestamp(&path) {
                stats.oldest_timestamp = Some(match stats.oldest_timestamp {
                    Some(oldest) => oldest.min(timestamp),
                    None => timestamp,
                });
                stats.newest_timestamp = Some(match stats.newest_timestamp {
                    Some(newest) => newest.max(timestamp),
                    None => timestamp,
                });
            }
        }

        Ok(stats)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

fn read_timestamp(path: &Path) -> Option<i64> {
    let content = std::fs::read_to_string(path).ok()?;
    let entry: CacheEntry = serde_json::from_str(&content).ok()?;
    Some(entry.timestamp)
}
