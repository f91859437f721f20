//! Configuration settings for Lydbok.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub database: DatabaseSettings,
    pub queue: QueueSettings,
    pub workers: WorkerSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data (books, audio, transcripts).
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.lydbok".to_string(),
            temp_dir: "/tmp/lydbok".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database file.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "~/.lydbok/lydbok.db".to_string(),
        }
    }
}

/// Job queue and runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Poll interval for the job runner, in milliseconds.
    pub poll_interval_ms: u64,
    /// Default maximum attempts before a job is failed permanently.
    pub max_attempts: u32,
    /// Default delay before a failed attempt is retried, in seconds.
    pub retry_delay_seconds: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_attempts: 3,
            retry_delay_seconds: 30,
        }
    }
}

/// External worker process settings.
///
/// The transcription and audio-filter engines are opaque external tools
/// invoked as child processes; only their command lines are configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Runtime used to launch worker scripts (e.g. "node").
    pub runtime: String,
    /// Directory containing the worker scripts.
    pub script_dir: String,
    /// Script that runs speech-to-text over a processed audio file.
    pub transcribe_script: String,
    /// Script that normalizes the downloaded audio into a single WAV.
    pub process_audio_script: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            runtime: "node".to_string(),
            script_dir: "workers".to_string(),
            transcribe_script: "transcribe.js".to_string(),
            process_audio_script: "process-audio.js".to_string(),
        }
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk duration in seconds.
    pub max_chunk_seconds: u32,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_seconds: 180,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Similarity search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Default number of results returned by a similarity search.
    pub default_results: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { default_results: 5 }
    }
}

/// Transcription cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entries older than this many days are removed by `cache clear`.
    pub max_age_days: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::LydbokError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lydbok")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.database.path)
    }

    /// Root directory for a book's on-disk data.
    pub fn book_dir(&self, book_id: &str) -> PathBuf {
        self.data_dir().join("books").join(book_id)
    }

    /// Directory holding a book's downloaded source files.
    pub fn downloads_dir(&self, book_id: &str) -> PathBuf {
        self.book_dir(book_id).join("downloads")
    }

    /// Directory holding a book's processed audio.
    pub fn audio_dir(&self, book_id: &str) -> PathBuf {
        self.book_dir(book_id).join("audio")
    }

    /// Directory holding cached transcription results.
    pub fn transcription_cache_dir(&self) -> PathBuf {
        self.data_dir().join("transcripts")
    }

    /// Full path to a worker script.
    pub fn worker_script(&self, script: &str) -> PathBuf {
        Self::expand_path(&self.workers.script_dir).join(script)
    }
}
