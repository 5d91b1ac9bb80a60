//! External tool availability.

use axum::extract::State;
use axum::Json;
use mg_core::Error;
use mg_engine::ToolInfo;

use crate::context::AppContext;
use crate::error::AppError;

/// GET /api/tools
#[utoipa::path(
    get,
    path = "/api/tools",
    responses(
        (status = 200, description = "List external tool availability", body = Vec<ToolInfo>)
    )
)]
pub async fn tools(State(ctx): State<AppContext>) -> Result<Json<Vec<ToolInfo>>, AppError> {
    // Version probes spawn processes.
    let tools = ctx.tools.clone();
    let infos = tokio::task::spawn_blocking(move || tools.check_all())
        .await
        .map_err(|e| Error::Internal(format!("tool check failed: {e}")))?;
    Ok(Json(infos))
}
