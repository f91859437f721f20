//! Persistence for transcript segments.

use super::TranscriptSegment;
use crate::db::Database;
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, instrument};

/// SQLite-backed segment store.
pub struct SegmentStore {
    db: Arc<Database>,
}

impl SegmentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replace all segments of a book atomically.
    ///
    /// Transcription always reproduces the full transcript, so partial
    /// updates are never needed.
    #[instrument(skip(self, segments), fields(count = segments.len()))]
    pub fn replace_segments(&self, book_id: &str, segments: &[TranscriptSegment]) -> Result<()> {
        let mut conn = self.db.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM transcript_segments WHERE book_id = ?1",
            [book_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO transcript_segments
                     (book_id, file_id, model, text, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for seg in segments {
                stmt.execute(rusqlite::params![
                    seg.book_id,
                    seg.file_id,
                    seg.model,
                    seg.text,
                    seg.start_time,
                    seg.end_time,
                ])?;
            }
        }

        tx.commit()?;
        info!("Stored {} segments for book {}", segments.len(), book_id);
        Ok(())
    }

    /// All segments of a book, ordered by start time.
    pub fn get_segments(&self, book_id: &str) -> Result<Vec<TranscriptSegment>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(
            "SELECT book_id, file_id, model, text, start_time, end_time
             FROM transcript_segments
             WHERE book_id = ?1
             ORDER BY start_time ASC",
        )?;

        let segments = stmt
            .query_map([book_id], |row| {
                Ok(TranscriptSegment {
                    book_id: row.get(0)?,
                    file_id: row.get(1)?,
                    model: row.get(2)?,
                    text: row.get(3)?,
                    start_time: row.get(4)?,
                    end_time: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(segments)
    }

    pub fn delete_segments(&self, book_id: &str) -> Result<usize> {
        let conn = self.db.conn()?;
        let deleted = conn.execute(
            "DELETE FROM transcript_segments WHERE book_id = ?1",
            [book_id],
        )?;
        Ok(deleted)
    }

    pub fn count(&self, book_id: &str) -> Result<u64> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transcript_segments WHERE book_id = ?1",
            [book_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
