//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`mp3relay_core::Error`] so that route
//! handlers can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::upstream::UpstreamError;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: mp3relay_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: mp3relay_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn inner(&self) -> &mp3relay_core::Error {
        &self.inner
    }
}

impl From<mp3relay_core::Error> for AppError {
    fn from(e: mp3relay_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<UpstreamError> for AppError {
    fn from(e: UpstreamError) -> Self {
        Self::new(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            let upstream_status = match &self.inner {
                mp3relay_core::Error::Upstream { status, .. } => *status,
                _ => None,
            };
            tracing::error!(
                status = %status,
                upstream_status = ?upstream_status,
                error = %self.inner,
                "Server error in API handler"
            );
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Rejected request");
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}
