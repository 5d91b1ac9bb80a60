//! Unified error type for mediagrab.
//!
//! Synchronous request paths (search, info, artifact fetch) return [`Error`]
//! directly and the HTTP layer derives a status code via
//! [`Error::http_status`]. Failures inside background jobs never surface here;
//! they are recorded into the job itself.

use std::fmt;

/// Unified error type covering all failure modes in mediagrab.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A bounded operation exceeded its wall-clock limit.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// What was being waited on (e.g. "inspection").
        operation: String,
        /// The bound that was exceeded.
        seconds: u64,
    },

    /// The media engine failed (network, geo-restriction, unsupported source).
    #[error("Engine error: {0}")]
    Engine(String),

    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "artifact").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The job exists but has not reached `completed` yet.
    #[error("Job {0} has not finished yet")]
    NotReady(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Timeout { .. } => 408,
            Error::Engine(_) => 400,
            Error::NotFound { .. } => 404,
            Error::NotReady(_) => 400,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Timeout { .. } => "timeout",
            Error::Engine(_) => "engine_error",
            Error::NotFound { .. } => "not_found",
            Error::NotReady(_) => "not_ready",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Timeout`].
    pub fn timeout(operation: impl Into<String>, limit: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            seconds: limit.as_secs(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
