//! Book records and setup-stage flags.
//!
//! A book row carries per-stage completion flags plus an overall `setup`
//! flag. The flags are the skip conditions for the setup pipeline: a stage
//! whose flag is already set is not re-run unless forced.

use crate::db::Database;
use crate::error::{LydbokError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A setup pipeline stage, in canonical execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    ProcessAudio,
    Transcribe,
    Vectorize,
}

impl Stage {
    /// All stages in canonical execution order.
    pub const ALL: [Stage; 4] = [
        Stage::Download,
        Stage::ProcessAudio,
        Stage::Transcribe,
        Stage::Vectorize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::ProcessAudio => "process_audio",
            Stage::Transcribe => "transcribe",
            Stage::Vectorize => "vectorize",
        }
    }

    /// Column on the books table holding this stage's completion flag.
    pub(crate) fn flag_column(&self) -> &'static str {
        match self {
            Stage::Download => "downloaded",
            Stage::ProcessAudio => "audio_processed",
            Stage::Transcribe => "transcribed",
            Stage::Vectorize => "vectorized",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = LydbokError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "download" => Ok(Stage::Download),
            "process_audio" | "process-audio" => Ok(Stage::ProcessAudio),
            "transcribe" => Ok(Stage::Transcribe),
            "vectorize" => Ok(Stage::Vectorize),
            _ => Err(LydbokError::InvalidInput(format!("Unknown stage: {}", s))),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One source file of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFile {
    /// File name relative to the book's downloads directory.
    pub path: String,
    /// URL the file is fetched from during the download stage.
    pub download_url: String,
}

/// A registered book and its setup state.
#[derive(Debug, Clone)]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Transcription model the book was (or will be) transcribed with.
    pub model: Option<String>,
    /// Total audio duration in milliseconds, used for progress reporting.
    pub duration_ms: i64,
    pub files: Vec<BookFile>,
    pub downloaded: bool,
    pub audio_processed: bool,
    pub transcribed: bool,
    pub vectorized: bool,
    pub setup: bool,
}

impl Book {
    /// Whether the given stage has already completed for this book.
    pub fn stage_done(&self, stage: Stage) -> bool {
        match stage {
            Stage::Download => self.downloaded,
            Stage::ProcessAudio => self.audio_processed,
            Stage::Transcribe => self.transcribed,
            Stage::Vectorize => self.vectorized,
        }
    }
}

/// Persistence for book rows.
pub struct BookStore {
    db: Arc<Database>,
}

impl BookStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Register a book, replacing any existing row with the same id.
    #[instrument(skip(self, files))]
    pub fn register(
        &self,
        id: &str,
        title: &str,
        duration_ms: i64,
        files: &[BookFile],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let files_json = serde_json::to_string(files)?;
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO books (id, title, duration_ms, files_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 duration_ms = excluded.duration_ms,
                 files_json = excluded.files_json,
                 updated_at = excluded.updated_at",
            rusqlite::params![id, title, duration_ms, files_json, now],
        )?;
        debug!("Registered book {}", id);
        Ok(())
    }

    /// Prepare a book for a setup run: record the transcription model and
    /// clear the overall setup flag. The per-stage flags are left alone so
    /// completed stages can still be skipped.
    pub fn begin_setup(&self, id: &str, model: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE books SET model = ?2, setup = 0, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, model, now],
        )?;
        if updated == 0 {
            return Err(LydbokError::BookNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, model, duration_ms, files_json,
                    downloaded, audio_processed, transcribed, vectorized, setup
             FROM books WHERE id = ?1",
        )?;

        let book = stmt
            .query_row([id], |row| {
                let files_json: String = row.get(4)?;
                Ok((
                    Book {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        model: row.get(2)?,
                        duration_ms: row.get(3)?,
                        files: Vec::new(),
                        downloaded: row.get::<_, i64>(5)? != 0,
                        audio_processed: row.get::<_, i64>(6)? != 0,
                        transcribed: row.get::<_, i64>(7)? != 0,
                        vectorized: row.get::<_, i64>(8)? != 0,
                        setup: row.get::<_, i64>(9)? != 0,
                    },
                    files_json,
                ))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match book {
            Some((mut book, files_json)) => {
                book.files = serde_json::from_str(&files_json)?;
                Ok(Some(book))
            }
            None => Ok(None),
        }
    }

    /// Fetch a book or fail with `BookNotFound`.
    pub fn require(&self, id: &str) -> Result<Book> {
        self.get(id)?
            .ok_or_else(|| LydbokError::BookNotFound(id.to_string()))
    }

    /// List all registered books.
    pub fn list(&self) -> Result<Vec<Book>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM books ORDER BY created_at DESC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(book) = self.get(&id)? {
                books.push(book);
            }
        }
        Ok(books)
    }

    /// Set or clear a stage's completion flag.
    pub fn set_stage_flag(&self, id: &str, stage: Stage, value: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "UPDATE books SET {} = ?2, updated_at = ?3 WHERE id = ?1",
            stage.flag_column()
        );
        let conn = self.db.conn()?;
        let updated = conn.execute(&sql, rusqlite::params![id, value as i64, now])?;
        if updated == 0 {
            return Err(LydbokError::BookNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Set the overall setup flag.
    pub fn set_setup(&self, id: &str, value: bool) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE books SET setup = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, value as i64, now],
        )?;
        if updated == 0 {
            return Err(LydbokError::BookNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BookStore {
        BookStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn sample_files() -> Vec<BookFile> {
        vec![BookFile {
            path: "part1.mp3".into(),
            download_url: "https://example.com/part1.mp3".into(),
        }]
    }

    #[test]
    fn test_register_and_get() {
        let store = store();
        store
            .register("book-1", "Test Book", 3_600_000, &sample_files())
            .unwrap();

        let book = store.get("book-1").unwrap().unwrap();
        assert_eq!(book.title, "Test Book");
        assert_eq!(book.duration_ms, 3_600_000);
        assert_eq!(book.files.len(), 1);
        assert!(!book.setup);
        assert!(!book.stage_done(Stage::Download));
    }

    #[test]
    fn test_register_is_upsert() {
        let store = store();
        store.register("book-1", "First", 100, &[]).unwrap();
        store.register("book-1", "Second", 200, &[]).unwrap();

        let book = store.get("book-1").unwrap().unwrap();
        assert_eq!(book.title, "Second");
        assert_eq!(book.duration_ms, 200);
    }

    #[test]
    fn test_begin_setup_clears_setup_flag_keeps_stage_flags() {
        let store = store();
        store.register("book-1", "Test", 100, &[]).unwrap();
        store.set_stage_flag("book-1", Stage::Download, true).unwrap();
        store.set_setup("book-1", true).unwrap();

        store.begin_setup("book-1", "whisper-base").unwrap();

        let book = store.get("book-1").unwrap().unwrap();
        assert!(!book.setup);
        assert!(book.downloaded);
        assert_eq!(book.model.as_deref(), Some("whisper-base"));
    }

    #[test]
    fn test_missing_book_errors() {
        let store = store();
        assert!(matches!(
            store.begin_setup("nope", "m"),
            Err(LydbokError::BookNotFound(_))
        ));
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("process-audio".parse::<Stage>().unwrap(), Stage::ProcessAudio);
        assert!("bogus".parse::<Stage>().is_err());
    }
}
