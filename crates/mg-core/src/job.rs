//! Retrieval job record and its state machine.
//!
//! ```text
//! Pending -> Downloading -> Processing -> Completed
//!    \            \             \
//!     `------------`-------------`-----> Error
//! ```
//!
//! Every transition method returns `true` when it changed the status and
//! `false` when the move is illegal from the current state. Refused moves
//! leave the record untouched, so the status trajectory of a job is always a
//! prefix of the chain above, optionally ending in `Error`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::JobId;
use crate::Error;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    /// `Completed` and `Error` never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of artifact a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    /// Audio only, transcoded to mp3.
    Mp3,
    /// Video plus audio, remuxed to mp4.
    Video,
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatType::Mp3 => f.write_str("mp3"),
            FormatType::Video => f.write_str("video"),
        }
    }
}

impl FromStr for FormatType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(FormatType::Mp3),
            "video" => Ok(FormatType::Video),
            other => Err(Error::Validation(format!(
                "unknown format_type '{other}' (expected mp3 or video)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Canonical record of one retrieval.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub format_type: FormatType,
    pub quality: String,
    pub status: JobStatus,
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub filename: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh `Pending` job with zero progress.
    pub fn new(
        id: JobId,
        url: impl Into<String>,
        format_type: FormatType,
        quality: impl Into<String>,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            format_type,
            quality: quality.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            speed: String::new(),
            eta: String::new(),
            filename: String::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Current mutable fields in wire form.
    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            progress: self.progress,
            speed: self.speed.clone(),
            eta: self.eta.clone(),
            filename: self.filename.clone(),
            error: self.error.clone(),
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            url: self.url.clone(),
            format_type: self.format_type,
            quality: self.quality.clone(),
            status: self.status,
            progress: self.progress,
            filename: self.filename.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }

    /// `Pending -> Downloading`, once a worker slot is held.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return self.refuse("start");
        }
        self.status = JobStatus::Downloading;
        self.started_at = Some(Utc::now());
        true
    }

    /// Apply one engine progress callback in place.
    ///
    /// Accepted while `Downloading` or `Processing` (multi-stream retrievals
    /// report a second download after the first finishes). Progress only
    /// moves forward; `None` fields keep their previous value. While
    /// `Downloading` the stored value stays below 100, which only
    /// [`Job::begin_processing`] and [`Job::complete`] may set. Returns
    /// whether the update was applied.
    pub fn record_progress(
        &mut self,
        progress: Option<f64>,
        speed: Option<String>,
        eta: Option<String>,
    ) -> bool {
        if !matches!(self.status, JobStatus::Downloading | JobStatus::Processing) {
            return self.refuse("record_progress");
        }
        if let Some(p) = progress {
            let mut p = round_one_decimal(p.clamp(0.0, 100.0));
            if self.status == JobStatus::Downloading {
                p = p.min(DOWNLOADING_PROGRESS_CAP);
            }
            if p > self.progress {
                self.progress = p;
            }
        }
        if let Some(s) = speed {
            self.speed = s;
        }
        if let Some(e) = eta {
            self.eta = e;
        }
        true
    }

    /// `Downloading -> Processing`; progress is pinned to 100.
    pub fn begin_processing(&mut self) -> bool {
        if self.status != JobStatus::Downloading {
            return self.refuse("begin_processing");
        }
        self.status = JobStatus::Processing;
        self.progress = 100.0;
        true
    }

    /// `Processing -> Completed` with the located artifact's file name.
    pub fn complete(&mut self, filename: impl Into<String>) -> bool {
        if self.status != JobStatus::Processing {
            return self.refuse("complete");
        }
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.filename = filename.into();
        self.completed_at = Some(Utc::now());
        true
    }

    /// Any non-terminal state `-> Error`.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return self.refuse("fail");
        }
        self.status = JobStatus::Error;
        self.error = Some(message.into());
        self.completed_at = Some(Utc::now());
        true
    }

    fn refuse(&self, transition: &str) -> bool {
        tracing::debug!(
            job_id = %self.id,
            status = %self.status,
            transition,
            "Refusing illegal job transition"
        );
        false
    }
}

/// Highest progress a job may report before post-processing starts.
const DOWNLOADING_PROGRESS_CAP: f64 = 99.9;

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// The observable part of a job, pushed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: f64,
    pub speed: String,
    pub eta: String,
    pub filename: String,
    pub error: Option<String>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Listing entry for `GET /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobSummary {
    pub id: JobId,
    pub url: String,
    pub format_type: FormatType,
    pub quality: String,
    pub status: JobStatus,
    pub progress: f64,
    pub filename: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
