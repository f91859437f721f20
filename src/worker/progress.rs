//! Progress extraction from transcription worker output.
//!
//! The transcription engine prints subtitle-style timestamp ranges as it
//! works, e.g. `[00:01:23.450 --> 00:01:27.120]  some text`. The end of the
//! last range seen so far is how far into the audio the engine has gotten.

use regex::Regex;
use std::sync::OnceLock;

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{2}:\d{2}:\d{2}\.\d{3}) --> (\d{2}:\d{2}:\d{2}\.\d{3})")
            .expect("invalid timestamp regex")
    })
}

/// Parse a `HH:MM:SS.mmm` timestamp into milliseconds.
pub fn timestamp_to_ms(ts: &str) -> Option<i64> {
    let (hms, millis) = ts.split_once('.')?;
    let mut parts = hms.split(':');
    let hours: i64 = parts.next()?.parse().ok()?;
    let minutes: i64 = parts.next()?.parse().ok()?;
    let seconds: i64 = parts.next()?.parse().ok()?;
    let millis: i64 = millis.parse().ok()?;
    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

/// Extract the end timestamp of the last range in a chunk of worker output,
/// in milliseconds. Returns None when the chunk has no timestamp ranges.
pub fn parse_last_timestamp(output: &str) -> Option<i64> {
    let caps = timestamp_re().captures_iter(output).last()?;
    timestamp_to_ms(caps.get(2)?.as_str())
}

/// Progress percentage, rounded to two decimal places and capped at 100.
/// None when the total duration is unknown or zero.
pub fn progress_percent(processed_ms: i64, total_ms: i64) -> Option<f64> {
    if total_ms <= 0 {
        return None;
    }
    // The engine can emit ranges past the nominal duration when the
    // stored duration_ms is a rough estimate.
    let pct = (processed_ms as f64 / total_ms as f64 * 100.0).min(100.0);
    Some((pct * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_to_ms() {
        assert_eq!(timestamp_to_ms("00:00:00.000"), Some(0));
        assert_eq!(timestamp_to_ms("00:01:23.450"), Some(83_450));
        assert_eq!(timestamp_to_ms("01:00:00.001"), Some(3_600_001));
        assert_eq!(timestamp_to_ms("bogus"), None);
    }

    #[test]
    fn test_parse_last_timestamp_picks_final_range() {
        let output = "\
[00:00:01.000 --> 00:00:04.500]  hello there
[00:00:04.500 --> 00:00:09.120]  general remarks
";
        assert_eq!(parse_last_timestamp(output), Some(9_120));
    }

    #[test]
    fn test_parse_no_timestamps() {
        assert_eq!(parse_last_timestamp("loading model...\n"), None);
    }

    #[test]
    fn test_progress_percent_rounding() {
        assert_eq!(progress_percent(9_120, 3_600_000), Some(0.25));
        assert_eq!(progress_percent(1_800_000, 3_600_000), Some(50.0));
        assert_eq!(progress_percent(3_600_000, 3_600_000), Some(100.0));
    }

    #[test]
    fn test_progress_percent_caps_at_100() {
        assert_eq!(progress_percent(4_000_000, 3_600_000), Some(100.0));
    }

    #[test]
    fn test_progress_percent_unknown_total() {
        assert_eq!(progress_percent(1000, 0), None);
        assert_eq!(progress_percent(1000, -5), None);
    }
}
