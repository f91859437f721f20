//! Error types for Lydbok.

use thiserror::Error;

/// Library-level error type for Lydbok operations.
#[derive(Error, Debug)]
pub enum LydbokError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job queue error: {0}")]
    Queue(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Book not found: {0}")]
    BookNotFound(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LydbokError {
    /// A job that fails with a permanent error is never worth retrying:
    /// missing parameters will be missing on every attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, LydbokError::Config(_) | LydbokError::InvalidInput(_))
    }
}

/// Result type alias for Lydbok operations.
pub type Result<T> = std::result::Result<T, LydbokError>;
