//! Axum router construction.
//!
//! Builds the full application router with all route groups, middleware
//! layers, and static file serving.

use std::path::PathBuf;

use axum::middleware;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::media::search,
        routes::media::info,
        routes::downloads::start_download,
        routes::downloads::fetch_download,
        routes::downloads::download_events,
        routes::jobs::list_jobs,
        routes::jobs::get_job,
        routes::tools::tools,
        routes::events::events_handler,
    ),
    components(schemas(
        routes::media::SearchRequest,
        routes::media::SearchResponse,
        routes::media::InfoRequest,
        routes::downloads::DownloadRequest,
        routes::downloads::DownloadResponse,
        routes::health::HealthResponse,
        routes::health::WorkerStats,
        crate::registry::JobCounts,
        mg_core::JobSnapshot,
        mg_core::JobSummary,
        mg_core::JobStatus,
        mg_core::FormatType,
        mg_engine::MediaInfo,
        mg_engine::FormatOption,
        mg_engine::SearchResult,
        mg_engine::ToolInfo,
    ))
)]
pub struct ApiDoc;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/search", post(routes::media::search))
        .route("/info", post(routes::media::info))
        .route("/download", post(routes::downloads::start_download))
        .route("/download/{task_id}", get(routes::downloads::fetch_download))
        .route(
            "/download/{task_id}/events",
            get(routes::downloads::download_events),
        )
        .route("/jobs", get(routes::jobs::list_jobs))
        .route("/jobs/{id}", get(routes::jobs::get_job))
        .route("/tools", get(routes::tools::tools))
        .route("/events", get(routes::events::events_handler));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/ws/{task_id}", get(routes::ws::ws_handler))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest("/api", api)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    // Static file serving for the web UI.
    if let Some(dir) = static_dir {
        if dir.exists() {
            tracing::info!("Serving static files from {:?}", dir);
            let index_path = dir.join("index.html");
            app = app.fallback_service(
                tower_http::services::ServeDir::new(&dir)
                    .append_index_html_on_directories(true)
                    .not_found_service(tower_http::services::ServeFile::new(index_path)),
            );
        }
    }

    app
}
