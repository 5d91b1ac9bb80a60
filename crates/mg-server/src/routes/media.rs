//! Search and inspection handlers.
//!
//! Both run the engine on the worker pool under the inspection timeout; a
//! slow engine surfaces as 408 and never holds the request past the bound.

use axum::extract::State;
use axum::Json;
use mg_core::Error;
use mg_engine::catalog::{media_info, search_results};
use mg_engine::{MediaInfo, SearchResult};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;
use crate::sweeper;

/// Request body for a search. Older clients send the terms as `url`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SearchRequest {
    #[serde(default, alias = "url")]
    pub query: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// Request body for an inspection.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

/// POST /api/search
#[utoipa::path(
    post,
    path = "/api/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Search results", body = SearchResponse),
        (status = 400, description = "Empty query"),
        (status = 408, description = "Search timed out"),
        (status = 500, description = "Search failed")
    )
)]
pub async fn search(
    State(ctx): State<AppContext>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(Error::Validation("query must not be empty".into()).into());
    }

    let limit = ctx.config.workers.search_limit;
    let engine = ctx.engine.clone();
    let entries = ctx
        .pool
        .run_with_timeout("search", ctx.config.workers.inspect_timeout(), {
            let query = query.clone();
            move || engine.search(&query, limit)
        })
        .await?
        .map_err(|e| {
            tracing::error!(query = %query, error = %e, "Search failed");
            Error::Internal(format!("search failed: {e}"))
        })?;

    tracing::debug!(query = %query, results = entries.len(), "Search finished");
    Ok(Json(SearchResponse {
        results: search_results(entries),
    }))
}

/// POST /api/info
#[utoipa::path(
    post,
    path = "/api/info",
    request_body = InfoRequest,
    responses(
        (status = 200, description = "Media metadata and available formats", body = MediaInfo),
        (status = 400, description = "Empty URL or engine rejected it"),
        (status = 408, description = "Inspection timed out"),
        (status = 500, description = "Unexpected failure")
    )
)]
pub async fn info(
    State(ctx): State<AppContext>,
    Json(req): Json<InfoRequest>,
) -> Result<Json<MediaInfo>, AppError> {
    let url = req.url.trim().to_string();
    if url.is_empty() {
        return Err(Error::Validation("url must not be empty".into()).into());
    }

    // Opportunistic cleanup; the request does not wait for it.
    sweeper::spawn_sweep(
        ctx.config.downloads.dir.clone(),
        ctx.config.downloads.max_age(),
    );

    let engine = ctx.engine.clone();
    let metadata = ctx
        .pool
        .run_with_timeout("inspection", ctx.config.workers.inspect_timeout(), {
            let url = url.clone();
            move || engine.inspect(&url)
        })
        .await??;

    let info = media_info(metadata);
    tracing::info!(url = %url, title = %info.title, formats = info.video_formats.len(), "Inspected media");
    Ok(Json(info))
}
