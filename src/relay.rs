//! Streaming relay of the converted audio file.
//!
//! The relay has two phases separated by a single commit point. Before the
//! response headers are handed to the client, any failure becomes a normal
//! error response. After the commit, the upstream body is forwarded chunk by
//! chunk and a failure can only abort the connection.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use mp3relay_core::Error;
use regex::Regex;

use crate::upstream::{UpstreamError, DEFAULT_TITLE};

pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_\s]").expect("title regex is valid"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"))
}

/// Turn a display title into a filesystem- and header-safe file stem.
///
/// Everything except ASCII word characters and whitespace is dropped, then
/// each whitespace run becomes a single `_`.
pub fn sanitize_title(title: &str) -> String {
    let stripped = unsafe_chars().replace_all(title, "");
    let safe = whitespace_runs().replace_all(&stripped, "_").into_owned();
    if safe.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        safe
    }
}

/// `Content-Disposition` value for an MP3 named after `title`.
pub fn content_disposition(title: &str) -> String {
    format!("attachment; filename=\"{}.mp3\"", sanitize_title(title))
}

/// Phase one: open the upstream file.
///
/// Only the status line and headers are awaited here, bounded by `timeout`;
/// the body is left unread on the returned response. The body itself is
/// bounded only by the client's read timeout between chunks.
pub async fn open(
    http: &reqwest::Client,
    url: &reqwest::Url,
    timeout: Duration,
) -> Result<reqwest::Response, Error> {
    let request = http
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "*/*")
        .send();

    let response = tokio::time::timeout(timeout, request)
        .await
        .map_err(|_| {
            Error::upstream(
                None,
                format!(
                    "Error fetching file: no response within {}s",
                    timeout.as_secs_f32()
                ),
            )
        })?
        .map_err(|e| fetch_error(UpstreamError::from_transport(e)))?;

    if !response.status().is_success() {
        return Err(fetch_error(UpstreamError::from_response(response).await));
    }
    Ok(response)
}

fn fetch_error(err: UpstreamError) -> Error {
    Error::upstream(err.status(), format!("Error fetching file: {err}"))
}

/// Phase two: commit headers and forward the body without buffering it.
///
/// If the client disconnects, the body stream is dropped, which drops the
/// upstream response and releases its connection.
pub fn into_response(upstream: reqwest::Response, title: &str) -> Response {
    let safe_title = sanitize_title(title);
    let content_length = upstream.content_length();
    let guard = RelayGuard::new(upstream.url().as_str(), &safe_title);

    tracing::info!(title = %safe_title, ?content_length, "Starting relay");

    let stream = async_stream::stream! {
        let mut guard = guard;
        let mut chunks = upstream.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    guard.bytes += bytes.len() as u64;
                    yield Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream stream failed mid-transfer");
                    yield Err(e);
                    return;
                }
            }
        }
        guard.completed = true;
    };

    let mut response = Body::from_stream(stream).into_response();
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(AUDIO_CONTENT_TYPE),
    );
    if let Ok(value) = HeaderValue::from_str(&content_disposition(title)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    response
}

/// Logs how a relay ended, on every exit path.
struct RelayGuard {
    source: String,
    title: String,
    started: Instant,
    bytes: u64,
    completed: bool,
}

impl RelayGuard {
    fn new(source: &str, title: &str) -> Self {
        Self {
            source: source.to_string(),
            title: title.to_string(),
            started: Instant::now(),
            bytes: 0,
            completed: false,
        }
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.completed {
            tracing::info!(
                title = %self.title,
                bytes = self.bytes,
                elapsed_ms,
                "Relay completed"
            );
        } else {
            tracing::warn!(
                source = %self.source,
                title = %self.title,
                bytes = self.bytes,
                elapsed_ms,
                "Relay aborted before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_example_title() {
        assert_eq!(
            sanitize_title("Rick Astley - Never Gonna Give You Up!"),
            "Rick_Astley_Never_Gonna_Give_You_Up"
        );
    }

    #[test]
    fn sanitize_keeps_word_characters() {
        assert_eq!(sanitize_title("track_01 final"), "track_01_final");
    }

    #[test]
    fn sanitize_collapses_whitespace_runs() {
        assert_eq!(sanitize_title("a \t\n b"), "a_b");
        assert_eq!(sanitize_title(" lead and trail "), "_lead_and_trail_");
    }

    #[test]
    fn sanitize_strips_quotes_and_path_separators() {
        assert_eq!(sanitize_title(r#"a"b/c\d"#), "abcd");
    }

    #[test]
    fn sanitize_drops_non_ascii() {
        assert_eq!(sanitize_title("Café déjà vu"), "Caf_dj_vu");
    }

    #[test]
    fn sanitize_empty_result_falls_back() {
        assert_eq!(sanitize_title(""), "audio");
        assert_eq!(sanitize_title("?!."), "audio");
    }

    #[test]
    fn disposition_header_value() {
        assert_eq!(
            content_disposition("My Song"),
            "attachment; filename=\"My_Song.mp3\""
        );
    }
}
