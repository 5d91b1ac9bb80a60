//! The [`MediaEngine`] trait and the data that crosses it.
//!
//! All engine calls are blocking and synchronous. Callers are expected to run
//! them on a blocking thread (the server's worker pool), never directly on an
//! async executor thread.

use std::path::{Path, PathBuf};

use mg_core::FormatType;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Capability to inspect and retrieve remote media.
///
/// Every call configures its own engine invocation; implementations hold no
/// per-call mutable state, so one instance is shared by all workers.
pub trait MediaEngine: Send + Sync + 'static {
    /// Fetch metadata for a single media URL without downloading it.
    fn inspect(&self, url: &str) -> Result<Metadata, EngineError>;

    /// Run a text search and return at most `limit` flat entries.
    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, EngineError>;

    /// Download and post-process `url` into `work_dir`.
    ///
    /// `on_progress` is invoked from the calling thread for every progress
    /// report the engine emits. On success the returned location points at
    /// the directory holding the artifact; locating the file inside it is
    /// left to [`ArtifactLocation::locate`].
    fn retrieve(
        &self,
        url: &str,
        spec: &OutputSpec,
        work_dir: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> Result<ArtifactLocation, EngineError>;
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Inspection result. Unknown or malformed fields fall back to `None`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    /// Left as raw JSON; sources report ints, floats, strings or null.
    pub duration: Option<Value>,
    pub uploader: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub view_count: Option<u64>,
    pub upload_date: Option<String>,
    pub description: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub formats: Vec<RawFormat>,
}

/// One encoding as reported by the engine, in engine order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    pub format_id: Option<String>,
    #[serde(deserialize_with = "lenient_u32")]
    pub height: Option<u32>,
    pub vcodec: Option<String>,
    pub ext: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub filesize_approx: Option<u64>,
    pub format_note: Option<String>,
}

impl RawFormat {
    /// Whether this entry carries a video stream.
    pub fn has_video(&self) -> bool {
        matches!(self.vcodec.as_deref(), Some(codec) if codec != "none")
    }
}

/// One flat search hit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub thumbnails: Vec<Thumbnail>,
    pub duration: Option<Value>,
    pub uploader: Option<String>,
    #[serde(deserialize_with = "lenient_u64")]
    pub view_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: Option<String>,
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(mg_core::format::duration_secs))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// Bytes are still arriving.
    Downloading,
    /// The download phase is over; post-processing follows.
    Finished,
}

/// One progress callback from the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub downloaded_bytes: u64,
    /// Exact total, or the engine's estimate when the exact one is unknown.
    pub total_bytes: Option<u64>,
    /// Bytes per second.
    pub speed: Option<f64>,
    /// Seconds remaining.
    pub eta: Option<u64>,
}

impl ProgressUpdate {
    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            phase: ProgressPhase::Downloading,
            downloaded_bytes,
            total_bytes,
            speed: None,
            eta: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            phase: ProgressPhase::Finished,
            downloaded_bytes: 0,
            total_bytes: None,
            speed: None,
            eta: None,
        }
    }

    /// Percentage downloaded, when a positive total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some(self.downloaded_bytes as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Output spec
// ---------------------------------------------------------------------------

/// What a retrieval should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub format_type: FormatType,
    /// Maximum video height; `None` means best available.
    pub max_height: Option<u32>,
}

impl OutputSpec {
    /// Build a spec from a format type and a quality label.
    ///
    /// A label is `"best"`, empty, or starts with a height (`"720p"`,
    /// `"1080"`, `"1080p60"`). Anything else falls back to best available.
    /// The label is ignored for mp3.
    pub fn new(format_type: FormatType, quality: Option<&str>) -> Self {
        let label = quality.map(str::trim).unwrap_or("");
        let max_height = match format_type {
            FormatType::Mp3 => None,
            FormatType::Video => parse_quality(label),
        };
        Self {
            format_type,
            max_height,
        }
    }

    /// The engine's format selector expression.
    pub fn format_selector(&self) -> String {
        match (self.format_type, self.max_height) {
            (FormatType::Mp3, _) => "bestaudio/best".to_string(),
            (FormatType::Video, None) => "bestvideo+bestaudio/best".to_string(),
            (FormatType::Video, Some(h)) => {
                format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]/best")
            }
        }
    }
}

fn parse_quality(label: &str) -> Option<u32> {
    if label.is_empty() || label.eq_ignore_ascii_case("best") {
        return None;
    }
    let digits: String = label.chars().take_while(char::is_ascii_digit).collect();
    match digits.parse::<u32>() {
        Ok(height) if height > 0 => Some(height),
        _ => {
            tracing::warn!(quality = label, "Unrecognized quality label, using best");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact location
// ---------------------------------------------------------------------------

/// Extensions the engine leaves behind that are never the artifact.
const SIDECAR_EXTENSIONS: &[&str] = &["part", "ytdl", "temp", "tmp", "json", "webp", "jpg", "jpeg", "png"];

/// Directory that holds a finished retrieval's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub dir: PathBuf,
}

impl ArtifactLocation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Pick the artifact: the first regular, non-sidecar file in lexical
    /// order. Returns `None` when the directory is empty or unreadable.
    pub fn locate(&self) -> Option<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), "Cannot read artifact directory: {e}");
                return None;
            }
        };

        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| !is_sidecar(path))
            .collect();
        candidates.sort();

        if candidates.len() > 1 {
            tracing::warn!(
                dir = %self.dir.display(),
                count = candidates.len(),
                "Multiple artifact candidates; picking the first"
            );
        }
        candidates.into_iter().next()
    }
}

fn is_sidecar(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| SIDECAR_EXTENSIONS.iter().any(|s| ext.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}
