//! Conversion, status and stream route handlers.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use mp3relay_core::{Error, UpstreamContract};
use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::extract::JsonOrForm;
use super::request_id::RequestId;
use super::AppContext;
use crate::jobs::Job;
use crate::relay;
use crate::video_id::extract_video_id;

/// Progress reported for a job whose link is ready.
pub const PROGRESS_READY: u32 = 1000;
/// Progress reported for a job that is unknown or still running.
pub const PROGRESS_WAITING: u32 = 0;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub success: bool,
    pub pid: String,
    pub title: String,
    #[serde(rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub progress: u32,
    pub status: &'static str,
    #[serde(rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(rename = "downloadUrl", alias = "download_url")]
    pub download_url: Option<String>,
    pub title: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/start
pub async fn start(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    JsonOrForm(req): JsonOrForm<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    let result = async {
        let url = non_blank(req.url).ok_or_else(|| Error::invalid_input("URL required"))?;
        let video_id = extract_video_id(&url)?;

        let conversion = ctx.upstream.start(&video_id).await?;

        if let Some(ref download_url) = conversion.download_url {
            ctx.jobs.insert(
                conversion.job_id.clone(),
                Job {
                    download_url: download_url.clone(),
                    title: conversion.title.clone(),
                },
            );
        }

        tracing::info!(
            video_id = %video_id,
            job_id = %conversion.job_id,
            title = %conversion.title,
            "Conversion started"
        );

        Ok::<_, AppError>(StartResponse {
            success: true,
            pid: conversion.job_id,
            title: conversion.title,
            download_url: conversion.download_url,
        })
    }
    .await;

    result
        .map(Json)
        .map_err(|e| e.with_request_id(request_id.0))
}

/// GET /api/status?id=<id>
///
/// Unknown ids report `waiting`, exactly like jobs that are not ready yet.
pub async fn status(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, AppError> {
    let id = non_blank(query.id);

    match ctx.upstream.contract() {
        UpstreamContract::Direct => {
            let job = id.as_deref().and_then(|id| ctx.jobs.get(id));
            let body = match job {
                Some(job) => StatusResponse {
                    progress: PROGRESS_READY,
                    status: "ready",
                    download_url: Some(job.download_url),
                },
                None => StatusResponse {
                    progress: PROGRESS_WAITING,
                    status: "waiting",
                    download_url: None,
                },
            };
            Ok(Json(body).into_response())
        }
        UpstreamContract::Progress => {
            let result = async {
                let id = id.ok_or_else(|| Error::invalid_input("id required"))?;
                let progress = ctx.upstream.progress(&id).await?;
                Ok::<_, AppError>(Json(progress).into_response())
            }
            .await;
            result.map_err(|e| e.with_request_id(request_id.0))
        }
    }
}

/// POST /api/stream
///
/// Relays the audio file at `downloadUrl` back to the caller as an MP3
/// attachment named after `title`.
pub async fn stream(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    JsonOrForm(req): JsonOrForm<StreamRequest>,
) -> Result<Response, AppError> {
    let result = async {
        let raw = non_blank(req.download_url)
            .ok_or_else(|| Error::invalid_input("downloadUrl required"))?;
        let url = reqwest::Url::parse(&raw)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| Error::invalid_input("downloadUrl must be an absolute http(s) URL"))?;
        let title = req.title.unwrap_or_default();

        tracing::info!(host = url.host_str().unwrap_or(""), "Streaming from upstream");

        let upstream = relay::open(&ctx.http, &url, ctx.config.upstream.stream_timeout()).await?;
        Ok::<_, AppError>(relay::into_response(upstream, &title))
    }
    .await;

    result.map_err(|e| e.with_request_id(request_id.0))
}

/// GET /health
pub async fn health_check() -> &'static str {
    "ok"
}
