//! Typed client for the conversion API.
//!
//! Knows the endpoint layout and payload shapes of the upstream; all traffic
//! goes through the [`RotatingExecutor`].

use std::time::Duration;

use mp3relay_core::config::{UpstreamConfig, UpstreamContract};
use serde::Deserialize;

use super::error::UpstreamError;
use super::executor::{RotatingExecutor, UpstreamRequestSpec};

/// Title used when the upstream does not provide one.
pub const DEFAULT_TITLE: &str = "audio";

/// Result of a successful conversion start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversion {
    /// Key the caller polls with: the video id, or the upstream progress token.
    pub job_id: String,
    pub title: String,
    /// Resolved file location, if the upstream already provided one.
    pub download_url: Option<String>,
}

/// Body of `GET {api_url}/dl?id=...`.
#[derive(Debug, Default, Deserialize)]
struct ConversionPayload {
    link: Option<String>,
    title: Option<String>,
    status: Option<String>,
    #[serde(alias = "message")]
    msg: Option<String>,
    #[serde(alias = "progressId", alias = "id")]
    progress_id: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct ConversionClient {
    executor: RotatingExecutor,
    api_url: String,
    progress_url: Option<String>,
    contract: UpstreamContract,
    timeout: Duration,
}

impl ConversionClient {
    pub fn new(executor: RotatingExecutor, config: &UpstreamConfig) -> Self {
        Self {
            executor,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            progress_url: config.progress_url.clone(),
            contract: config.contract,
            timeout: config.metadata_timeout(),
        }
    }

    pub fn contract(&self) -> UpstreamContract {
        self.contract
    }

    /// Ask the upstream to convert `video_id`.
    pub async fn start(&self, video_id: &str) -> Result<Conversion, UpstreamError> {
        let spec = UpstreamRequestSpec::get(format!("{}/dl", self.api_url), self.timeout)
            .query("id", video_id);

        let response = self.executor.execute(&spec).await?;
        let payload: ConversionPayload = response
            .json()
            .await
            .map_err(|e| UpstreamError::Payload(format!("conversion response is not JSON: {e}")))?;

        interpret(payload, video_id, self.contract)
    }

    /// Fetch the upstream's progress document for `token`, verbatim.
    pub async fn progress(&self, token: &str) -> Result<serde_json::Value, UpstreamError> {
        let url = self
            .progress_url
            .as_deref()
            .ok_or_else(|| UpstreamError::Payload("no progress endpoint configured".into()))?;
        let spec = UpstreamRequestSpec::get(url, self.timeout).query("id", token);

        let response = self.executor.execute(&spec).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::Payload(format!("progress response is not JSON: {e}")))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Progress tokens arrive as strings or bare numbers depending on the API.
fn token_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => non_empty(Some(s)),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn interpret(
    payload: ConversionPayload,
    video_id: &str,
    contract: UpstreamContract,
) -> Result<Conversion, UpstreamError> {
    if payload
        .status
        .as_deref()
        .is_some_and(|s| s.eq_ignore_ascii_case("fail"))
    {
        let reason = non_empty(payload.msg).unwrap_or_else(|| "no reason given".into());
        return Err(UpstreamError::Rejected(reason));
    }

    let title = non_empty(payload.title).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let download_url = non_empty(payload.link);

    match contract {
        UpstreamContract::Direct => {
            let download_url = download_url.ok_or_else(|| {
                UpstreamError::Payload(match non_empty(payload.msg) {
                    Some(msg) => format!("missing download link ({msg})"),
                    None => "missing download link".into(),
                })
            })?;
            Ok(Conversion {
                job_id: video_id.to_string(),
                title,
                download_url: Some(download_url),
            })
        }
        UpstreamContract::Progress => {
            let job_id = payload
                .progress_id
                .and_then(token_string)
                .ok_or_else(|| UpstreamError::Payload("missing progress id".into()))?;
            Ok(Conversion {
                job_id,
                title,
                download_url,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ConversionPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn direct_payload_with_link_and_title() {
        let conv = interpret(
            payload(r#"{"link":"https://cdn.test/a.mp3","title":"Song","status":"ok"}"#),
            "dQw4w9WgXcQ",
            UpstreamContract::Direct,
        )
        .unwrap();
        assert_eq!(conv.job_id, "dQw4w9WgXcQ");
        assert_eq!(conv.title, "Song");
        assert_eq!(conv.download_url.as_deref(), Some("https://cdn.test/a.mp3"));
    }

    #[test]
    fn missing_or_blank_title_defaults() {
        for json in [
            r#"{"link":"https://cdn.test/a.mp3"}"#,
            r#"{"link":"https://cdn.test/a.mp3","title":""}"#,
            r#"{"link":"https://cdn.test/a.mp3","title":null}"#,
        ] {
            let conv = interpret(payload(json), "id", UpstreamContract::Direct).unwrap();
            assert_eq!(conv.title, DEFAULT_TITLE, "{json}");
        }
    }

    #[test]
    fn direct_payload_without_link_is_malformed() {
        let err = interpret(
            payload(r#"{"title":"Song","msg":"in queue"}"#),
            "id",
            UpstreamContract::Direct,
        )
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Payload(_)));
        assert!(err.to_string().contains("in queue"));
    }

    #[test]
    fn failed_status_is_rejected_with_upstream_reason() {
        let err = interpret(
            payload(r#"{"status":"fail","msg":"Video too long"}"#),
            "id",
            UpstreamContract::Direct,
        )
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Rejected(ref m) if m == "Video too long"));
    }

    #[test]
    fn progress_payload_uses_upstream_token() {
        let conv = interpret(
            payload(r#"{"progressId":"tok-1","title":"Song"}"#),
            "dQw4w9WgXcQ",
            UpstreamContract::Progress,
        )
        .unwrap();
        assert_eq!(conv.job_id, "tok-1");
        assert_eq!(conv.download_url, None);
    }

    #[test]
    fn numeric_progress_token_is_accepted() {
        let conv = interpret(
            payload(r#"{"id":42,"link":"https://cdn.test/a.mp3"}"#),
            "dQw4w9WgXcQ",
            UpstreamContract::Progress,
        )
        .unwrap();
        assert_eq!(conv.job_id, "42");
        assert_eq!(conv.title, DEFAULT_TITLE);
        assert!(conv.download_url.is_some());
    }

    #[test]
    fn progress_payload_without_token_is_malformed() {
        let err = interpret(
            payload(r#"{"title":"Song"}"#),
            "id",
            UpstreamContract::Progress,
        )
        .unwrap_err();
        assert!(matches!(err, UpstreamError::Payload(_)));
    }
}
