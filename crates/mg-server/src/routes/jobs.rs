//! Job listing handlers.

use axum::extract::{Path, State};
use axum::Json;
use mg_core::{Error, JobSnapshot, JobSummary};

use crate::context::AppContext;
use crate::error::AppError;

/// GET /api/jobs
#[utoipa::path(
    get,
    path = "/api/jobs",
    responses(
        (status = 200, description = "All jobs, newest first", body = Vec<JobSummary>)
    )
)]
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<JobSummary>> {
    Json(ctx.registry.list_jobs())
}

/// GET /api/jobs/{id}
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = String, Path, description = "Job id")),
    responses(
        (status = 200, description = "Current snapshot", body = JobSnapshot),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobSnapshot>, AppError> {
    let cell = ctx
        .registry
        .cell(&id)
        .ok_or_else(|| Error::not_found("job", &id))?;
    Ok(Json(cell.snapshot()))
}
