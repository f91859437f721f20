//! Parsing of whisper.cpp JSON output.
//!
//! The transcription worker writes a `<audio>.json` file next to the input
//! with a `transcription` array of timed segments. Offsets are relative to
//! the start of the transcribed file; `segments_from_output` shifts them by
//! the file's position in the whole book.

use super::TranscriptSegment;
use serde::Deserialize;

/// Top-level whisper.cpp output file.
#[derive(Debug, Deserialize)]
pub struct WhisperOutput {
    pub transcription: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
pub struct WhisperSegment {
    pub offsets: WhisperOffsets,
    pub text: String,
}

/// Segment offsets in milliseconds, relative to the transcribed file.
#[derive(Debug, Deserialize)]
pub struct WhisperOffsets {
    pub from: i64,
    pub to: i64,
}

/// Convert a whisper output file into transcript segments.
///
/// Empty segments are dropped; whisper emits leading-space text, so each
/// segment is trimmed.
pub fn segments_from_output(
    output: &WhisperOutput,
    book_id: &str,
    file_id: &str,
    model: &str,
    offset_ms: i64,
) -> Vec<TranscriptSegment> {
    output
        .transcription
        .iter()
        .filter_map(|seg| {
            let text = seg.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment {
                book_id: book_id.to_string(),
                file_id: file_id.to_string(),
                model: model.to_string(),
                text: text.to_string(),
                start_time: seg.offsets.from + offset_ms,
                end_time: seg.offsets.to + offset_ms,
            })
        })
        .collect()
}
