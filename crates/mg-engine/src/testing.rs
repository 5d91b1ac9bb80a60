//! A scripted [`MediaEngine`] for tests.
//!
//! Behaves like a fast, well-behaved engine by default: inspection returns a
//! small catalog, retrieval reports a few progress steps, announces the end
//! of the download phase and writes `<title>.<ext>` into the work dir.
//! Builder methods switch on delays, failures, panics and a gate that holds
//! retrievals until the test releases them.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mg_core::FormatType;
use parking_lot::{Condvar, Mutex};
use serde_json::json;

use crate::engine::{
    ArtifactLocation, MediaEngine, Metadata, OutputSpec, ProgressUpdate, RawFormat, SearchEntry,
    Thumbnail,
};
use crate::error::EngineError;

/// Upper bound on how long a gated retrieval waits before giving up.
const GATE_LIMIT: Duration = Duration::from_secs(10);

/// Bytes reported as the artifact size during scripted downloads.
const TOTAL_BYTES: u64 = 4096;

#[derive(Debug, Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    /// Block until opened; returns `false` if [`GATE_LIMIT`] passed first.
    fn wait(&self) -> bool {
        let mut open = self.open.lock();
        if !*open {
            let _ = self.cv.wait_while_for(&mut open, |o| !*o, GATE_LIMIT);
        }
        *open
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    title: String,
    inspect_delay: Duration,
    inspect_error: Option<String>,
    retrieve_error: Option<String>,
    step_delay: Duration,
    steps: Vec<u64>,
    emit_finished: bool,
    write_artifact: bool,
    panic_on_retrieve: bool,
    gate: Option<Arc<Gate>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    retrieve_calls: AtomicUsize,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            title: "Scripted Clip".to_string(),
            inspect_delay: Duration::ZERO,
            inspect_error: None,
            retrieve_error: None,
            step_delay: Duration::from_millis(10),
            steps: vec![1024, 2048, 3072, TOTAL_BYTES],
            emit_finished: true,
            write_artifact: true,
            panic_on_retrieve: false,
            gate: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            retrieve_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_inspect_delay(mut self, delay: Duration) -> Self {
        self.inspect_delay = delay;
        self
    }

    pub fn with_inspect_error(mut self, message: &str) -> Self {
        self.inspect_error = Some(message.to_string());
        self
    }

    pub fn with_retrieve_error(mut self, message: &str) -> Self {
        self.retrieve_error = Some(message.to_string());
        self
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Never announce the end of the download phase.
    pub fn without_finished_event(mut self) -> Self {
        self.emit_finished = false;
        self
    }

    /// Succeed without producing a file.
    pub fn without_artifact(mut self) -> Self {
        self.write_artifact = false;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_retrieve = true;
        self
    }

    /// Hold every retrieval after its first progress step until the
    /// returned gate is opened.
    pub fn gated(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Highest number of retrievals observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::SeqCst)
    }

    /// File name a successful retrieval with `spec` produces.
    pub fn artifact_name(&self, spec: &OutputSpec) -> String {
        let ext = match spec.format_type {
            FormatType::Mp3 => "mp3",
            FormatType::Video => "mp4",
        };
        format!("{}.{ext}", self.title)
    }

    fn run_retrieve(
        &self,
        spec: &OutputSpec,
        work_dir: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> Result<ArtifactLocation, EngineError> {
        if self.panic_on_retrieve {
            panic!("scripted engine panic");
        }

        for (i, &downloaded) in self.steps.iter().enumerate() {
            let mut update = ProgressUpdate::downloading(downloaded, Some(TOTAL_BYTES));
            update.speed = Some(1536.0);
            update.eta = Some((self.steps.len() - i - 1) as u64);
            on_progress(update);

            if i == 0 {
                if let Some(gate) = &self.gate {
                    if !gate.wait() {
                        return Err(EngineError::failed("gate never opened"));
                    }
                }
            }
            std::thread::sleep(self.step_delay);
        }

        if let Some(message) = &self.retrieve_error {
            return Err(EngineError::failed(message.clone()));
        }

        if self.emit_finished {
            on_progress(ProgressUpdate::finished());
        }

        if self.write_artifact {
            std::fs::write(work_dir.join(self.artifact_name(spec)), b"scripted media")?;
            std::fs::write(work_dir.join("leftover.part"), b"partial")?;
        }

        Ok(ArtifactLocation::new(work_dir))
    }
}

impl MediaEngine for ScriptedEngine {
    fn inspect(&self, url: &str) -> Result<Metadata, EngineError> {
        if !self.inspect_delay.is_zero() {
            std::thread::sleep(self.inspect_delay);
        }
        if let Some(message) = &self.inspect_error {
            return Err(EngineError::failed(message.clone()));
        }

        let format = |height: u32, vcodec: &str, size: Option<u64>| RawFormat {
            format_id: Some(format!("{height}-{vcodec}")),
            height: Some(height),
            vcodec: Some(vcodec.to_string()),
            ext: Some("mp4".to_string()),
            filesize: size,
            filesize_approx: None,
            format_note: Some(format!("{height}p")),
        };

        Ok(Metadata {
            id: Some("scripted".to_string()),
            title: Some(self.title.clone()),
            thumbnail: Some(format!("{url}/thumb.jpg")),
            duration: Some(json!(212)),
            uploader: Some("Scripted Uploader".to_string()),
            view_count: Some(1000),
            upload_date: Some("20240101".to_string()),
            description: Some("A scripted description".to_string()),
            formats: vec![
                RawFormat {
                    format_id: Some("140".to_string()),
                    vcodec: Some("none".to_string()),
                    ext: Some("m4a".to_string()),
                    ..Default::default()
                },
                format(360, "avc1", Some(500)),
                format(720, "avc1", Some(1536)),
                format(720, "vp9", None),
                format(1080, "avc1", None),
            ],
        })
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, EngineError> {
        Ok((0..limit.min(3))
            .map(|i| SearchEntry {
                id: Some(format!("vid{i}")),
                title: Some(format!("{query} #{i}")),
                thumbnail: None,
                thumbnails: vec![Thumbnail {
                    url: Some(format!("https://img.example/{i}.jpg")),
                }],
                duration: Some(json!(60 + i)),
                uploader: Some("Scripted Uploader".to_string()),
                view_count: Some(i as u64),
            })
            .collect())
    }

    fn retrieve(
        &self,
        _url: &str,
        spec: &OutputSpec,
        work_dir: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> Result<ArtifactLocation, EngineError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let _guard = InFlightGuard(&self.in_flight);
        self.run_retrieve(spec, work_dir, on_progress)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
