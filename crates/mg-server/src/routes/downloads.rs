//! Download job handlers: start a job, stream its artifact, follow it over SSE.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Stream, StreamExt};
use mg_core::{Error, FormatType, JobId};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::channel::observe;
use crate::context::AppContext;
use crate::error::AppError;

/// Request body for starting a download.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct DownloadRequest {
    #[serde(default)]
    pub url: String,
    /// `mp3` or `video`.
    #[serde(default)]
    pub format_type: String,
    /// `best` (default) or a height label such as `720p`.
    pub quality: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct DownloadResponse {
    pub task_id: JobId,
}

/// POST /api/download
#[utoipa::path(
    post,
    path = "/api/download",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Job created", body = DownloadResponse),
        (status = 400, description = "Empty url or unknown format type")
    )
)]
pub async fn start_download(
    State(ctx): State<AppContext>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<DownloadResponse>, AppError> {
    let url = req.url.trim();
    if url.is_empty() {
        return Err(Error::Validation("url must not be empty".into()).into());
    }
    let format_type: FormatType = req.format_type.parse()?;
    let quality = req
        .quality
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());

    let task_id = ctx.registry.create_job(url, format_type, quality);
    Ok(Json(DownloadResponse { task_id }))
}

/// GET /api/download/{task_id}
#[utoipa::path(
    get,
    path = "/api/download/{task_id}",
    params(("task_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "The artifact", content_type = "application/octet-stream"),
        (status = 400, description = "Job has not completed"),
        (status = 404, description = "Unknown job or missing file")
    )
)]
pub async fn fetch_download(
    State(ctx): State<AppContext>,
    Path(task_id): Path<String>,
) -> Result<Response, AppError> {
    let artifact = ctx.registry.fetch_artifact(&task_id).await?;
    tracing::info!(task_id = %task_id, filename = %artifact.filename, size = artifact.size, "Serving artifact");

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(artifact.size));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&artifact.filename)) {
        headers.insert(CONTENT_DISPOSITION, value);
    }

    let body = Body::from_stream(ReaderStream::new(artifact.file));
    Ok((headers, body).into_response())
}

/// GET /api/download/{task_id}/events
#[utoipa::path(
    get,
    path = "/api/download/{task_id}/events",
    params(("task_id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "SSE stream of job snapshots until the job is terminal")
    )
)]
pub async fn download_events(
    State(ctx): State<AppContext>,
    Path(task_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = observe(
        ctx.registry.clone(),
        task_id,
        ctx.config.workers.progress_interval(),
    );

    let stream = updates.filter_map(|message| async move {
        serde_json::to_string(&message)
            .ok()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data)))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `attachment` disposition with an ASCII fallback name plus the exact name
/// in RFC 5987 form.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len() * 3);
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_name_is_kept() {
        assert_eq!(
            content_disposition("Song Title.mp3"),
            "attachment; filename=\"Song Title.mp3\"; filename*=UTF-8''Song%20Title.mp3"
        );
    }

    #[test]
    fn non_ascii_name_gets_fallback_and_encoding() {
        let value = content_disposition("Canción \"live\".mp3");
        assert!(value.starts_with("attachment; filename=\"Canci_n _live_.mp3\""));
        assert!(value.ends_with("filename*=UTF-8''Canci%C3%B3n%20%22live%22.mp3"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }
}
