//! Per-stage progress tracking.
//!
//! Each (book, stage) pair has at most one progress row. Starting a stage
//! resets that row and clears the book's completion flag for the stage, so
//! a re-run always begins from a clean slate.

use crate::db::Database;
use crate::error::Result;
use crate::library::{BookStore, Stage};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Status of one stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::Running => "running",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "running" => Ok(StageStatus::Running),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            _ => Err(format!("Unknown stage status: {}", s)),
        }
    }
}

/// Progress of one stage run for a book.
#[derive(Debug, Clone, Serialize)]
pub struct StageProgress {
    pub book_id: String,
    pub stage: Stage,
    pub status: StageStatus,
    /// Percentage in [0, 100].
    pub progress: f64,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Tracks stage progress rows and keeps the book flags in sync.
pub struct StageTracker {
    db: Arc<Database>,
    books: BookStore,
}

impl StageTracker {
    pub fn new(db: Arc<Database>) -> Self {
        let books = BookStore::new(db.clone());
        Self { db, books }
    }

    /// Begin a stage run: clear the book's completion flag, drop any prior
    /// progress row, and insert a fresh `running` row at 0%.
    #[instrument(skip(self))]
    pub fn reset(&self, book_id: &str, stage: Stage) -> Result<()> {
        self.books.set_stage_flag(book_id, stage, false)?;

        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn()?;
        conn.execute(
            "DELETE FROM stage_progress WHERE book_id = ?1 AND stage = ?2",
            rusqlite::params![book_id, stage.as_str()],
        )?;
        conn.execute(
            "INSERT INTO stage_progress (book_id, stage, status, progress, started_at)
             VALUES (?1, ?2, 'running', 0, ?3)",
            rusqlite::params![book_id, stage.as_str(), now],
        )?;
        Ok(())
    }

    /// Update the progress percentage of a running stage. Values outside
    /// [0, 100] are clamped.
    pub fn update(&self, book_id: &str, stage: Stage, progress: f64) -> Result<()> {
        let progress = progress.clamp(0.0, 100.0);
        debug!("Stage {} for {} at {:.2}%", stage, book_id, progress);
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE stage_progress SET progress = ?3, status = 'running'
             WHERE book_id = ?1 AND stage = ?2",
            rusqlite::params![book_id, stage.as_str(), progress],
        )?;
        Ok(())
    }

    /// Mark a stage completed at 100% and set the book's completion flag.
    #[instrument(skip(self))]
    pub fn complete(&self, book_id: &str, stage: Stage) -> Result<()> {
        self.books.set_stage_flag(book_id, stage, true)?;

        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO stage_progress (book_id, stage, status, progress, completed_at)
             VALUES (?1, ?2, 'completed', 100, ?3)
             ON CONFLICT(book_id, stage) DO UPDATE SET
                 status = 'completed',
                 progress = 100,
                 error = NULL,
                 completed_at = excluded.completed_at",
            rusqlite::params![book_id, stage.as_str(), now],
        )?;
        Ok(())
    }

    /// Mark a stage failed. The book's completion flag stays cleared.
    #[instrument(skip(self, error))]
    pub fn fail(&self, book_id: &str, stage: Stage, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO stage_progress (book_id, stage, status, error, completed_at)
             VALUES (?1, ?2, 'failed', ?3, ?4)
             ON CONFLICT(book_id, stage) DO UPDATE SET
                 status = 'failed',
                 error = excluded.error,
                 completed_at = excluded.completed_at",
            rusqlite::params![book_id, stage.as_str(), error, now],
        )?;
        Ok(())
    }

    /// Fetch the progress row for one stage of a book.
    pub fn get(&self, book_id: &str, stage: Stage) -> Result<Option<StageProgress>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT book_id, stage, status, progress, error, started_at, completed_at
             FROM stage_progress WHERE book_id = ?1 AND stage = ?2",
        )?;
        let row = stmt
            .query_row(rusqlite::params![book_id, stage.as_str()], row_to_progress)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// List all progress rows for a book.
    pub fn list(&self, book_id: &str) -> Result<Vec<StageProgress>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT book_id, stage, status, progress, error, started_at, completed_at
             FROM stage_progress WHERE book_id = ?1",
        )?;
        let rows = stmt
            .query_map([book_id], row_to_progress)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_progress(row: &rusqlite::Row<'_>) -> rusqlite::Result<StageProgress> {
    let stage_str: String = row.get(1)?;
    let status_str: String = row.get(2)?;
    Ok(StageProgress {
        book_id: row.get(0)?,
        stage: stage_str.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "stage".into(), rusqlite::types::Type::Text)
        })?,
        status: status_str.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(2, "status".into(), rusqlite::types::Type::Text)
        })?,
        progress: row.get(3)?,
        error: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (StageTracker, BookStore, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        let books = BookStore::new(db.clone());
        books.register("book-1", "Test", 1000, &[]).unwrap();
        (StageTracker::new(db.clone()), books, db)
    }

    #[test]
    fn test_reset_starts_running_at_zero() {
        let (tracker, books, _db) = tracker();
        books.set_stage_flag("book-1", Stage::Download, true).unwrap();

        tracker.reset("book-1", Stage::Download).unwrap();

        let p = tracker.get("book-1", Stage::Download).unwrap().unwrap();
        assert_eq!(p.status, StageStatus::Running);
        assert_eq!(p.progress, 0.0);
        assert!(p.started_at.is_some());

        // Reset must also clear the completion flag.
        let book = books.get("book-1").unwrap().unwrap();
        assert!(!book.downloaded);
    }

    #[test]
    fn test_complete_sets_flag_and_full_progress() {
        let (tracker, books, _db) = tracker();
        tracker.reset("book-1", Stage::Transcribe).unwrap();
        tracker.update("book-1", Stage::Transcribe, 42.5).unwrap();
        tracker.complete("book-1", Stage::Transcribe).unwrap();

        let p = tracker.get("book-1", Stage::Transcribe).unwrap().unwrap();
        assert_eq!(p.status, StageStatus::Completed);
        assert_eq!(p.progress, 100.0);
        assert!(p.completed_at.is_some());

        let book = books.get("book-1").unwrap().unwrap();
        assert!(book.transcribed);
    }

    #[test]
    fn test_update_clamps_to_valid_range() {
        let (tracker, _books, _db) = tracker();
        tracker.reset("book-1", Stage::Transcribe).unwrap();

        tracker.update("book-1", Stage::Transcribe, 104.2).unwrap();
        let p = tracker.get("book-1", Stage::Transcribe).unwrap().unwrap();
        assert_eq!(p.progress, 100.0);

        tracker.update("book-1", Stage::Transcribe, -3.0).unwrap();
        let p = tracker.get("book-1", Stage::Transcribe).unwrap().unwrap();
        assert_eq!(p.progress, 0.0);
    }

    #[test]
    fn test_fail_records_error_and_leaves_flag_clear() {
        let (tracker, books, _db) = tracker();
        tracker.reset("book-1", Stage::Vectorize).unwrap();
        tracker.fail("book-1", Stage::Vectorize, "boom").unwrap();

        let p = tracker.get("book-1", Stage::Vectorize).unwrap().unwrap();
        assert_eq!(p.status, StageStatus::Failed);
        assert_eq!(p.error.as_deref(), Some("boom"));

        let book = books.get("book-1").unwrap().unwrap();
        assert!(!book.vectorized);
    }

    #[test]
    fn test_rerun_after_failure() {
        let (tracker, _books, _db) = tracker();
        tracker.reset("book-1", Stage::Download).unwrap();
        tracker.fail("book-1", Stage::Download, "network").unwrap();

        tracker.reset("book-1", Stage::Download).unwrap();

        let p = tracker.get("book-1", Stage::Download).unwrap().unwrap();
        assert_eq!(p.status, StageStatus::Running);
        assert_eq!(p.progress, 0.0);
        assert!(p.error.is_none());
    }

    #[test]
    fn test_list_covers_all_stages() {
        let (tracker, _books, _db) = tracker();
        tracker.reset("book-1", Stage::Download).unwrap();
        tracker.complete("book-1", Stage::Download).unwrap();
        tracker.reset("book-1", Stage::Transcribe).unwrap();

        let rows = tracker.list("book-1").unwrap();
        assert_eq!(rows.len(), 2);
    }
}
