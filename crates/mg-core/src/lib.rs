//! mg-core: shared types, errors, configuration, and the event bus.
//!
//! This crate is the foundational dependency for the other mg-* crates. It
//! holds the job record and its state machine, the human-readable formatting
//! helpers used by both the engine adapter and the progress bridge, the
//! unified error type, and the application configuration.

pub mod config;
pub mod error;
pub mod events;
pub mod format;
pub mod ids;
pub mod job;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::JobId;
pub use job::{FormatType, Job, JobSnapshot, JobStatus, JobSummary};
