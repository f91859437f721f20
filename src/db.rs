//! Shared SQLite database handle.
//!
//! All durable state (books, jobs, stage progress, transcript segments,
//! vector chunks) lives in a single SQLite file. The handle is created once
//! at process start and passed into each component, so tests can substitute
//! an in-memory database.

use crate::error::{LydbokError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

/// Shared database handle.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::init_schema(&conn)?;

        info!("Initialized database at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                model TEXT,
                duration_ms INTEGER NOT NULL DEFAULT 0,
                files_json TEXT NOT NULL DEFAULT '[]',
                downloaded INTEGER NOT NULL DEFAULT 0,
                audio_processed INTEGER NOT NULL DEFAULT 0,
                transcribed INTEGER NOT NULL DEFAULT 0,
                vectorized INTEGER NOT NULL DEFAULT 0,
                setup INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 3,
                priority INTEGER NOT NULL DEFAULT 0,
                delay_seconds INTEGER NOT NULL DEFAULT 0,
                process_at INTEGER NOT NULL,
                pid INTEGER,
                result TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                completed_at INTEGER,
                failed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status_process_at
                ON jobs(status, process_at);

            CREATE TABLE IF NOT EXISTS stage_progress (
                book_id TEXT NOT NULL,
                stage TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                progress REAL NOT NULL DEFAULT 0,
                error TEXT,
                started_at TEXT,
                completed_at TEXT,
                UNIQUE(book_id, stage)
            );

            CREATE TABLE IF NOT EXISTS transcript_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                model TEXT NOT NULL,
                text TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_segments_book_start
                ON transcript_segments(book_id, start_time);

            CREATE TABLE IF NOT EXISTS vector_chunks (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                document TEXT NOT NULL,
                embedding BLOB NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_vector_chunks_collection
                ON vector_chunks(collection);
            "#,
        )?;

        Ok(())
    }

    /// Acquire the connection lock.
    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LydbokError::Store(format!("Failed to acquire database lock: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creates() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN
                 ('books', 'jobs', 'stage_progress', 'transcript_segments', 'vector_chunks')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 5);
    }
}
