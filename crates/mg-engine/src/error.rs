//! Engine adapter errors.

use std::path::PathBuf;

/// Failure modes of a [`MediaEngine`](crate::MediaEngine) call.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A required external tool was not discovered.
    #[error("{tool} not found; is it installed and in PATH?")]
    ToolNotFound { tool: String },

    /// The tool exists but could not be started.
    #[error("failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine ran and reported failure.
    #[error("{message}")]
    Failed { message: String },

    /// The engine's output could not be understood.
    #[error("unexpected engine output: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn failed(message: impl Into<String>) -> Self {
        EngineError::Failed {
            message: message.into(),
        }
    }
}

impl From<EngineError> for mg_core::Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ToolNotFound { .. } | EngineError::Spawn { .. } => {
                mg_core::Error::Internal(err.to_string())
            }
            EngineError::Failed { message } => mg_core::Error::Engine(message),
            EngineError::Parse(_) => mg_core::Error::Engine(err.to_string()),
            EngineError::Io(source) => mg_core::Error::Io { source },
        }
    }
}
