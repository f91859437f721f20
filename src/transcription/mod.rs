//! Transcript segments and transcription output parsing.

mod store;
mod whisper;

pub use store::SegmentStore;
pub use whisper::{segments_from_output, WhisperOutput, WhisperSegment};

use serde::{Deserialize, Serialize};

/// One timed segment of a book's transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub book_id: String,
    /// Source file the segment came from.
    pub file_id: String,
    /// Transcription model that produced the segment.
    pub model: String,
    pub text: String,
    /// Start offset into the whole book, in milliseconds.
    pub start_time: i64,
    /// End offset into the whole book, in milliseconds.
    pub end_time: i64,
}
