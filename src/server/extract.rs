//! Body extractor accepting either JSON or an urlencoded form.

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use serde::de::DeserializeOwned;

use super::error::AppError;
use super::request_id::RequestId;

/// Deserializes the body as a form when the request says so, as JSON
/// otherwise. Rejections become 400 responses tagged with the request id.
#[derive(Debug)]
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req.extensions().get::<RequestId>().map(|id| id.0.clone());
        let reject = |reason: String| {
            let err = invalid_body(reason);
            match request_id {
                Some(ref id) => err.with_request_id(id.clone()),
                None => err,
            }
        };

        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        let value = if is_form {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(v)| v)
                .map_err(|e| reject(e.body_text()))?
        } else {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(v)| v)
                .map_err(|e| reject(e.body_text()))?
        };

        Ok(Self(value))
    }
}

fn invalid_body(reason: String) -> AppError {
    mp3relay_core::Error::invalid_input(format!("Invalid request body: {reason}")).into()
}
