//! REST handlers for the remote download manager.
//!
//! Pause/resume/delete responses report only whether the signal was
//! accepted; the transfer outcome itself arrives asynchronously through
//! the live channel and the persisted record.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use super::super::AppState;
use crate::models::DownloadStatus;
use crate::services::download::DownloadError;

#[derive(Debug, Deserialize)]
pub struct CreateDownloadRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadResponse {
    pub id: Uuid,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn error_response(err: DownloadError) -> Response {
    let status = match &err {
        DownloadError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        DownloadError::NotFound => StatusCode::NOT_FOUND,
        DownloadError::InvalidState { .. } | DownloadError::AlreadyActive => StatusCode::CONFLICT,
        DownloadError::Unreachable { .. } | DownloadError::Client(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// POST /downloads: create a download and start transferring.
pub async fn create_download(
    State(state): State<AppState>,
    Json(request): Json<CreateDownloadRequest>,
) -> Response {
    match state.downloads.create(&request.url).await {
        Ok((record, warning)) => Json(CreateDownloadResponse {
            id: record.id,
            filename: record.filename,
            total_size: warning.is_none().then_some(record.total_size),
            warning,
        })
        .into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /downloads: snapshots of all records.
pub async fn list_downloads(State(state): State<AppState>) -> Response {
    match state.downloads.list().await {
        Ok(records) => Json(records).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /downloads/:id/pause
pub async fn pause_download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.downloads.pause(id).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(err),
    }
}

/// POST /downloads/:id/resume
pub async fn resume_download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.downloads.resume(id).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(err),
    }
}

/// DELETE /downloads/:id: cancel if active, drop record and local file.
pub async fn delete_download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.downloads.delete(id).await {
        Ok(_) => Json(json!({ "success": true })).into_response(),
        Err(err) => error_response(err),
    }
}

/// GET /downloads/:id/file: stream a completed download back to the client.
pub async fn download_file(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    let record = match state.downloads.get(id).await {
        Ok(Some(record)) => record,
        Ok(None) => return (StatusCode::NOT_FOUND, "Download not found").into_response(),
        Err(err) => return error_response(err),
    };

    if record.status != DownloadStatus::Completed {
        return (StatusCode::NOT_FOUND, "Download not completed").into_response();
    }

    let file = match tokio::fs::File::open(&record.local_path).await {
        Ok(file) => file,
        Err(_) => return (StatusCode::NOT_FOUND, "File missing on disk").into_response(),
    };

    let mime = mime_guess::from_path(&record.local_path)
        .first_or_octet_stream()
        .to_string();
    let disposition = format!("attachment; filename=\"{}\"", record.filename.replace('"', "_"));

    (
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// GET /api/status: per-status record counts.
pub async fn api_status(State(state): State<AppState>) -> Response {
    match state.downloads.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => error_response(err),
    }
}
