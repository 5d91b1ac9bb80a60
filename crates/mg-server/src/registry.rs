//! In-memory job registry.
//!
//! [`JobRegistry`] owns every job record. Each record lives in a [`JobCell`]
//! behind its own lock; the map itself only guards membership. Creating a job
//! inserts a `Pending` record and spawns a supervised task that waits for a
//! worker slot, runs the retrieval through a [`ProgressBridge`] and writes the
//! outcome back. Nothing here blocks on the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use mg_core::events::{EventBus, EventPayload};
use mg_core::{Error, FormatType, Job, JobId, JobSnapshot, JobStatus, JobSummary, Result};
use mg_engine::{EngineError, MediaEngine, OutputSpec};
use parking_lot::RwLock;
use serde::Serialize;

use crate::bridge::ProgressBridge;
use crate::pool::WorkerPool;

// ---------------------------------------------------------------------------
// JobCell
// ---------------------------------------------------------------------------

/// One job record plus the directory it owns.
#[derive(Debug)]
pub struct JobCell {
    id: JobId,
    job: RwLock<Job>,
    dir: PathBuf,
}

impl JobCell {
    pub fn new(job: Job, dir: PathBuf) -> Self {
        Self {
            id: job.id,
            job: RwLock::new(job),
            dir,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.job.read().snapshot()
    }

    pub fn summary(&self) -> JobSummary {
        self.job.read().summary()
    }

    /// Mutate the record under the write lock. Keep `f` short.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Job) -> R) -> R {
        f(&mut self.job.write())
    }
}

// ---------------------------------------------------------------------------
// Artifact handle and counts
// ---------------------------------------------------------------------------

/// An opened, completed artifact ready to stream.
#[derive(Debug)]
pub struct ArtifactHandle {
    pub file: tokio::fs::File,
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Jobs per status, for health reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct JobCounts {
    pub total: usize,
    pub pending: usize,
    pub downloading: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

pub struct JobRegistry {
    jobs: DashMap<JobId, Arc<JobCell>>,
    downloads_dir: PathBuf,
    pool: WorkerPool,
    engine: Arc<dyn MediaEngine>,
    events: Arc<EventBus>,
}

impl JobRegistry {
    pub fn new(
        downloads_dir: impl Into<PathBuf>,
        pool: WorkerPool,
        engine: Arc<dyn MediaEngine>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            jobs: DashMap::new(),
            downloads_dir: downloads_dir.into(),
            pool,
            engine,
            events,
        }
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    /// Register a retrieval and start it in the background.
    ///
    /// Never fails: every problem after this point, including a working
    /// directory that cannot be created, ends the job in `Error` where the
    /// client can observe it.
    pub fn create_job(self: &Arc<Self>, url: &str, format_type: FormatType, quality: Option<&str>) -> JobId {
        let spec = OutputSpec::new(format_type, quality);
        let quality = quality.unwrap_or("best").to_string();

        let id = JobId::new();
        let dir = self.downloads_dir.join(id.to_string());
        let cell = Arc::new(JobCell::new(
            Job::new(id, url, format_type, quality.clone()),
            dir.clone(),
        ));
        self.jobs.insert(id, cell.clone());

        tracing::info!(job_id = %id, url, %format_type, quality = %quality, "Job queued");
        self.events.broadcast(EventPayload::JobQueued {
            job_id: id,
            url: url.to_string(),
            format_type,
        });

        let bridge = ProgressBridge::new(cell, self.events.clone());
        tokio::spawn(self.clone().run_job(bridge, dir, url.to_string(), spec));
        id
    }

    /// The background half of a job. Every outcome ends in a terminal state.
    async fn run_job(self: Arc<Self>, bridge: ProgressBridge, dir: PathBuf, url: String, spec: OutputSpec) {
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::error!(dir = %dir.display(), "Cannot create job directory: {e}");
            bridge.fail(&format!("could not create working directory: {e}"));
            return;
        }

        let engine = self.engine.clone();
        let worker_bridge = bridge.clone();
        let worker_dir = dir.clone();

        let outcome = self
            .pool
            .run(move || {
                worker_bridge.start();
                engine
                    .retrieve(&url, &spec, &worker_dir, &mut |update| {
                        worker_bridge.on_progress(update)
                    })
                    .map(|location| location.locate())
            })
            .await;

        match outcome {
            Ok(Ok(Some(artifact))) => match artifact.file_name().and_then(|n| n.to_str()) {
                Some(name) => {
                    bridge.complete(name);
                }
                None => {
                    bridge.fail("artifact has a non UTF-8 file name");
                }
            },
            Ok(Ok(None)) => {
                tracing::warn!(dir = %dir.display(), "Retrieval returned but no artifact was found");
                bridge.fail("artifact not found");
            }
            Ok(Err(engine_err)) => {
                bridge.fail(&engine_message(&engine_err));
            }
            Err(Error::Internal(message)) => {
                bridge.fail(&format!("internal error: {message}"));
            }
            Err(other) => {
                bridge.fail(&other.to_string());
            }
        }
    }

    /// Look up a job by the id string a client sent.
    pub fn cell(&self, id: &str) -> Option<Arc<JobCell>> {
        let id: JobId = id.parse().ok()?;
        self.jobs.get(&id).map(|entry| entry.value().clone())
    }

    pub fn get_job(&self, id: &JobId) -> Option<JobSnapshot> {
        self.jobs.get(id).map(|entry| entry.snapshot())
    }

    /// Open the artifact of a completed job.
    pub async fn fetch_artifact(&self, id: &str) -> Result<ArtifactHandle> {
        let cell = self.cell(id).ok_or_else(|| Error::not_found("job", id))?;
        let snapshot = cell.snapshot();
        if snapshot.status != JobStatus::Completed {
            return Err(Error::NotReady(id.to_string()));
        }

        let path = cell.dir().join(&snapshot.filename);
        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::error!(
                    job_id = %cell.id(),
                    path = %path.display(),
                    "Completed job is missing its artifact"
                );
                return Err(Error::not_found("artifact", &snapshot.filename));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();

        Ok(ArtifactHandle {
            file,
            filename: snapshot.filename,
            path,
            size,
        })
    }

    /// All jobs, newest first.
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self.jobs.iter().map(|entry| entry.summary()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.jobs.iter() {
            counts.total += 1;
            match entry.snapshot().status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Downloading => counts.downloading += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Error => counts.error += 1,
            }
        }
        counts
    }
}

fn engine_message(err: &EngineError) -> String {
    match err {
        EngineError::Failed { message } => message.clone(),
        other => other.to_string(),
    }
}
