//! Lydbok - Audiobook setup pipeline and retrieval
//!
//! A local-first tool that takes audiobooks through a durable setup
//! pipeline and serves semantic search over the resulting transcripts.
//!
//! The name "Lydbok" is Norwegian for "audiobook."
//!
//! # Overview
//!
//! Lydbok allows you to:
//! - Register audiobooks and download their source files
//! - Run a crash-safe job queue driving download, audio processing,
//!   transcription and vectorization stages
//! - Track per-stage progress, including live transcription progress
//!   parsed from the worker's output
//! - Search a book's transcript semantically, with keyword expansion
//!   when the direct query comes back weak
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `db` - Shared SQLite database handle
//! - `jobs` - Durable job queue and polling runner
//! - `library` - Book records and stage flags
//! - `pipeline` - Setup stages and progress tracking
//! - `worker` - External worker process management
//! - `transcription` - Transcript segments and output parsing
//! - `chunking` - Sentence-aware transcript chunking
//! - `embedding` - Embedding generation
//! - `vector_index` - Vector storage and retrieval
//! - `cache` - Transcription result cache
//!
//! # Example
//!
//! ```rust,no_run
//! use lydbok::config::Settings;
//! use lydbok::context::AppContext;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let ctx = AppContext::new(settings)?;
//!
//!     let results = ctx
//!         .index
//!         .search_similar_with_expansion("book-1", "the lighthouse keeper", 5)
//!         .await?;
//!     for chunk in results {
//!         println!("{:.2} {}", chunk.similarity, chunk.document);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod jobs;
pub mod library;
pub mod pipeline;
pub mod transcription;
pub mod vector_index;
pub mod worker;

pub use error::{LydbokError, Result};
