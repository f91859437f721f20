//! CLI module for Lydbok.

pub mod commands;
mod output;

pub use output::{format_timestamp, Output};

use clap::{Parser, Subcommand};

/// Lydbok - Audiobook setup pipeline and retrieval
///
/// Registers audiobooks, runs them through a durable setup pipeline
/// (download, audio processing, transcription, vectorization) and serves
/// similarity search over the indexed transcripts. The name "Lydbok" is
/// Norwegian for "audiobook."
#[derive(Parser, Debug)]
#[command(name = "lydbok")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Lydbok configuration and data directories
    Init,

    /// Run the job runner until interrupted
    Run,

    /// Register a book from a manifest file
    Add {
        /// Book ID
        book_id: String,

        /// Book title
        #[arg(short, long)]
        title: String,

        /// Path to a JSON manifest listing the book's source files
        #[arg(short, long)]
        manifest: String,

        /// Total audio duration in milliseconds (used for progress)
        #[arg(short, long, default_value = "0")]
        duration_ms: i64,
    },

    /// Enqueue a setup job for a registered book
    Setup {
        /// Book ID
        book_id: String,

        /// Transcription model to use
        #[arg(short, long, default_value = "whisper-base")]
        model: String,

        /// Stages to run (download, process_audio, transcribe, vectorize);
        /// omit to run all of them
        #[arg(short, long)]
        stage: Vec<String>,

        /// Re-run stages whose completion flag is already set
        #[arg(short, long)]
        force: bool,

        /// Job priority (higher runs first)
        #[arg(short, long, default_value = "0")]
        priority: i64,
    },

    /// List registered books
    Books,

    /// Show a book's setup state and stage progress
    Status {
        /// Book ID
        book_id: String,
    },

    /// Inspect and manage the job queue
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Search a book's transcript
    Search {
        /// Book ID
        book_id: String,

        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Disable keyword expansion for weak matches
        #[arg(long)]
        no_expand: bool,
    },

    /// Manage the transcription cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum JobsAction {
    /// List jobs
    List {
        /// Filter by status (pending, running, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show per-status job counts
    Stats,

    /// Retry a failed job
    Retry {
        /// Job ID
        job_id: String,
    },

    /// Cancel a running job's worker process
    Cancel {
        /// Job ID
        job_id: String,
    },

    /// Delete all completed jobs
    ClearCompleted,

    /// Delete all failed jobs
    ClearFailed,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Remove cache entries older than the configured age
    Clear {
        /// Override the configured maximum age in days
        #[arg(long)]
        max_age_days: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
