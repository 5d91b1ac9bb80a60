//! Progress bridge between a blocking retrieval and the job record.
//!
//! The engine calls back on a worker thread; the bridge turns each callback
//! into an in-place update of the job cell under a short write lock. There is
//! no queue: observers simply read the latest values. Lifecycle events go to
//! the [`EventBus`] only when the status actually changes.

use std::sync::Arc;

use mg_core::events::{EventBus, EventPayload};
use mg_core::format::format_size;
use mg_core::JobStatus;
use mg_engine::{ProgressPhase, ProgressUpdate};

use crate::registry::JobCell;

#[derive(Clone)]
pub struct ProgressBridge {
    cell: Arc<JobCell>,
    events: Arc<EventBus>,
}

impl ProgressBridge {
    pub fn new(cell: Arc<JobCell>, events: Arc<EventBus>) -> Self {
        Self { cell, events }
    }

    /// `Pending -> Downloading`.
    pub fn start(&self) -> bool {
        let started = self.cell.update(|job| job.start());
        if started {
            tracing::info!(job_id = %self.cell.id(), "Job started");
            self.events.broadcast(EventPayload::JobStarted {
                job_id: self.cell.id(),
            });
        }
        started
    }

    /// Apply one engine callback.
    pub fn on_progress(&self, update: ProgressUpdate) {
        match update.phase {
            ProgressPhase::Downloading => {
                let speed = update
                    .speed
                    .map(|bps| format!("{}/s", format_size(Some(bps as u64))));
                let eta = update.eta.filter(|s| *s > 0).map(|s| format!("{s}s"));
                let percent = update.percent();
                self.cell
                    .update(|job| job.record_progress(percent, speed, eta));
            }
            ProgressPhase::Finished => {
                if self.cell.update(|job| job.begin_processing()) {
                    self.processing();
                }
            }
        }
    }

    /// Mark the artifact as located. A job that never saw the end of its
    /// download phase passes through `Processing` first.
    pub fn complete(&self, filename: &str) -> bool {
        let (processed, completed) = self.cell.update(|job| {
            let processed = job.status == JobStatus::Downloading && job.begin_processing();
            (processed, job.complete(filename))
        });

        if processed {
            self.processing();
        }
        if completed {
            tracing::info!(job_id = %self.cell.id(), filename, "Job completed");
            self.events.broadcast(EventPayload::JobCompleted {
                job_id: self.cell.id(),
                filename: filename.to_string(),
            });
        }
        completed
    }

    pub fn fail(&self, message: &str) -> bool {
        let failed = self.cell.update(|job| job.fail(message));
        if failed {
            tracing::error!(job_id = %self.cell.id(), error = message, "Job failed");
            self.events.broadcast(EventPayload::JobFailed {
                job_id: self.cell.id(),
                error: message.to_string(),
            });
        }
        failed
    }

    fn processing(&self) {
        tracing::debug!(job_id = %self.cell.id(), "Download finished; post-processing");
        self.events.broadcast(EventPayload::JobProcessing {
            job_id: self.cell.id(),
        });
    }
}
