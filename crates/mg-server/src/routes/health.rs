//! Liveness and load summary.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::context::AppContext;
use crate::registry::JobCounts;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub jobs: JobCounts,
    pub workers: WorkerStats,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct WorkerStats {
    pub capacity: usize,
    pub in_flight: usize,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        jobs: ctx.registry.counts(),
        workers: WorkerStats {
            capacity: ctx.pool.capacity(),
            in_flight: ctx.pool.in_flight(),
        },
    })
}
