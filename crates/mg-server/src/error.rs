//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; both [`mg_core::Error`] and
//! [`mg_engine::EngineError`] convert into it with `?`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use mg_engine::EngineError;
use serde_json::json;

use crate::middleware::request_id::current_request_id;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: mg_core::Error,
    request_id: Option<String>,
}

impl AppError {
    /// Wrap `inner`, picking up the id of the request in progress.
    pub fn new(inner: mg_core::Error) -> Self {
        Self {
            inner,
            request_id: current_request_id(),
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &mg_core::Error {
        &self.inner
    }
}

impl From<mg_core::Error> for AppError {
    fn from(e: mg_core::Error) -> Self {
        Self::new(e)
    }
}

impl From<EngineError> for AppError {
    fn from(e: EngineError) -> Self {
        Self::new(e.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Request rejected");
        }

        let body = json!({
            "detail": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}
