//! Failures of a single upstream call, and their rotation classification.

use reqwest::StatusCode;

/// Longest upstream body excerpt carried in an error message.
const MAX_MESSAGE_LEN: usize = 300;

/// Most bytes read from an error body; the rest is left on the wire.
const MAX_ERROR_BODY: usize = MAX_MESSAGE_LEN * 4;

/// Error returned by the rotating executor and the conversion client.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// 429: the credential is being throttled; the next one may work.
    #[error("Request failed with status code 429: {message}")]
    RateLimited { message: String },

    /// 403: the credential's quota is spent or it was revoked.
    #[error("Request failed with status code 403: {message}")]
    QuotaExceeded { message: String },

    /// Any other non-2xx answer.
    #[error("Request failed with status code {status}: {message}")]
    Status { status: u16, message: String },

    /// The per-call timeout elapsed.
    #[error("upstream request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Connection, DNS, TLS or redirect failure.
    #[error("upstream request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// A 2xx answer whose body lacked what the caller needs.
    #[error("malformed upstream response: {0}")]
    Payload(String),

    /// The upstream answered but reported that the conversion failed.
    #[error("conversion rejected by upstream: {0}")]
    Rejected(String),

    /// The credential pool is empty.
    #[error("no upstream credentials configured")]
    NoCredentials,
}

impl UpstreamError {
    /// Whether the executor should move on to the next credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::QuotaExceeded { .. })
    }

    /// The upstream HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::QuotaExceeded { .. } => Some(403),
            Self::Status { status, .. } => Some(*status),
            Self::Timeout(e) | Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Payload(_) | Self::Rejected(_) | Self::NoCredentials => None,
        }
    }

    /// Classify a status code and the body that came with it.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = summarize_body(body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("no reason").to_string());
        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { message },
            StatusCode::FORBIDDEN => Self::QuotaExceeded { message },
            other => Self::Status {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Consume a non-2xx response, reading a bounded prefix of its body for
    /// the error message.
    pub async fn from_response(mut response: reqwest::Response) -> Self {
        let status = response.status();

        let mut body = Vec::new();
        while body.len() < MAX_ERROR_BODY {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) | Err(_) => break,
            }
        }
        body.truncate(MAX_ERROR_BODY);

        Self::from_status(status, &String::from_utf8_lossy(&body))
    }

    /// Wrap a transport-level `reqwest` failure.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Transport(err)
        }
    }
}

impl From<UpstreamError> for mp3relay_core::Error {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NoCredentials => {
                mp3relay_core::Error::Config(UpstreamError::NoCredentials.to_string())
            }
            other => mp3relay_core::Error::upstream(other.status(), other.to_string()),
        }
    }
}

/// Pull a human-readable message out of an upstream error body.
///
/// RapidAPI answers `{"message": "..."}`; the conversion API itself uses
/// `{"msg": "..."}`. Anything else is passed through, truncated.
fn summarize_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "msg", "error"] {
            if let Some(serde_json::Value::String(msg)) = map.get(key) {
                return Some(truncate(msg));
            }
        }
    }

    Some(truncate(body))
}

fn truncate(s: &str) -> String {
    match s.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
