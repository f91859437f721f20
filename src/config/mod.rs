//! Configuration management for Lydbok.

mod settings;

pub use settings::{
    CacheSettings, ChunkingSettings, DatabaseSettings, EmbeddingSettings, GeneralSettings,
    QueueSettings, RetrievalSettings, Settings, WorkerSettings,
};
