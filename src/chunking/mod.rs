//! Sentence-aware transcript chunking.
//!
//! Retrieval works over multi-minute chunks rather than individual
//! segments. A chunk closes once it spans at least the configured duration,
//! preferring to break after the last segment that ends a sentence so chunk
//! boundaries fall on natural pauses.

use crate::transcription::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// A chunk of transcript text covering a contiguous time range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub text: String,
    /// Start of the chunk in milliseconds.
    pub start_time: i64,
    /// End of the chunk in milliseconds.
    pub end_time: i64,
}

/// Options for `chunk_transcript`.
#[derive(Debug, Clone)]
pub struct ChunkOptions {
    /// Minimum duration a chunk must span before it is closed, in seconds.
    pub max_chunk_seconds: u32,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chunk_seconds: 180,
        }
    }
}

/// Split ordered segments into sentence-aligned chunks.
///
/// Every segment lands in exactly one chunk and order is preserved, so the
/// concatenation of all chunk texts equals the concatenation of all segment
/// texts.
pub fn chunk_transcript(
    segments: &[TranscriptSegment],
    options: &ChunkOptions,
) -> Vec<TranscriptChunk> {
    let max_span_ms = i64::from(options.max_chunk_seconds) * 1000;
    let mut chunks = Vec::new();
    let mut buffer: Vec<&TranscriptSegment> = Vec::new();

    for segment in segments {
        if segment.text.trim().is_empty() {
            continue;
        }
        buffer.push(segment);

        let span = segment.end_time - buffer[0].start_time;
        if span < max_span_ms {
            continue;
        }

        // Break after the last sentence-ending segment; without one, keep
        // the newest segment so the buffer always shrinks.
        let split_at = match find_sentence_break(&buffer) {
            Some(idx) => idx + 1,
            None => buffer.len() - 1,
        };

        if split_at > 0 {
            chunks.push(build_chunk(&buffer[..split_at]));
            buffer.drain(..split_at);
        }
    }

    if !buffer.is_empty() {
        chunks.push(build_chunk(&buffer));
    }

    chunks
}

/// Index of the last buffered segment whose text ends a sentence.
fn find_sentence_break(buffer: &[&TranscriptSegment]) -> Option<usize> {
    buffer
        .iter()
        .rposition(|seg| matches!(seg.text.trim_end().chars().last(), Some('.' | '!' | '?')))
}

fn build_chunk(segments: &[&TranscriptSegment]) -> TranscriptChunk {
    let text = segments
        .iter()
        .map(|seg| seg.text.trim())
        .collect::<Vec<_>>()
        .join(" ");

    TranscriptChunk {
        text,
        start_time: segments[0].start_time,
        end_time: segments[segments.len() - 1].end_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: &str, start_s: i64, end_s: i64) -> TranscriptSegment {
        TranscriptSegment {
            book_id: "book-1".into(),
            file_id: "file-1".into(),
            model: "whisper-base".into(),
            text: text.into(),
            start_time: start_s * 1000,
            end_time: end_s * 1000,
        }
    }

    fn opts(seconds: u32) -> ChunkOptions {
        ChunkOptions {
            max_chunk_seconds: seconds,
        }
    }

    #[test]
    fn test_short_transcript_single_chunk() {
        let segments = vec![seg("Hello there.", 0, 5), seg("A short one.", 5, 9)];
        let chunks = chunk_transcript(&segments, &opts(180));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello there. A short one.");
        assert_eq!(chunks[0].start_time, 0);
        assert_eq!(chunks[0].end_time, 9000);
    }

    #[test]
    fn test_breaks_on_sentence_boundary() {
        let segments = vec![
            seg("It was a dark night.", 0, 6),
            seg("The wind was howling", 6, 11),
            seg("through the trees.", 11, 16),
            seg("Then a knock", 16, 21),
            seg("at the door.", 21, 26),
        ];
        // 15s max: the first chunk closes at the 16s mark; the break lands
        // after "through the trees." (the last sentence end).
        let chunks = chunk_transcript(&segments, &opts(15));

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].text,
            "It was a dark night. The wind was howling through the trees."
        );
        assert_eq!(chunks[0].end_time, 16_000);
        assert_eq!(chunks[1].text, "Then a knock at the door.");
        assert_eq!(chunks[1].start_time, 16_000);
    }

    #[test]
    fn test_no_sentence_boundary_still_progresses() {
        let segments = vec![
            seg("and then", 0, 10),
            seg("and also", 10, 20),
            seg("and more", 20, 30),
            seg("finally done.", 30, 40),
        ];
        let chunks = chunk_transcript(&segments, &opts(15));

        // No chunk should be empty and all text must survive in order.
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        let joined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(joined, "and then and also and more finally done.");
    }

    #[test]
    fn test_concatenation_invariant() {
        let segments: Vec<_> = (0..50)
            .map(|i| {
                let text = if i % 3 == 2 {
                    format!("sentence {} ends.", i)
                } else {
                    format!("part {}", i)
                };
                seg(&text, i * 10, (i + 1) * 10)
            })
            .collect();

        let chunks = chunk_transcript(&segments, &opts(60));

        let chunked = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let original = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(chunked, original);

        // Chunks tile the timeline without gaps.
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_transcript(&[], &opts(180)).is_empty());
    }

    #[test]
    fn test_blank_segments_are_skipped() {
        let segments = vec![
            seg("First part.", 0, 5),
            seg("   ", 5, 10),
            seg("Second part.", 10, 15),
        ];
        let chunks = chunk_transcript(&segments, &opts(180));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "First part. Second part.");
    }
}
