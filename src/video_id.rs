//! Video identifier extraction from user-supplied URLs.

use std::sync::OnceLock;

use mp3relay_core::Error;
use regex::Regex;

/// Length of a YouTube video identifier.
pub const VIDEO_ID_LEN: usize = 11;

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Matches `watch?v=ID`, `/embed/ID`, `/shorts/ID` and `youtu.be/ID`.
    RE.get_or_init(|| {
        Regex::new(r"(?:v=|/|youtu\.be/)([0-9A-Za-z_-]{11})").expect("video id regex is valid")
    })
}

/// Extract the 11-character video identifier from `url`.
///
/// Returns [`Error::InvalidInput`] when no known URL shape matches.
pub fn extract_video_id(url: &str) -> Result<String, Error> {
    video_id_regex()
        .captures(url.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| Error::invalid_input("Invalid YouTube URL"))
}
