//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! server, downloads, workers and tools sections. Every section defaults
//! sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub downloads: DownloadsConfig,
    pub workers: WorkersConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.workers.capacity == 0 {
            warnings.push("workers.capacity is 0; it will be raised to 1".into());
        }

        if self.workers.inspect_timeout_secs == 0 {
            warnings.push("workers.inspect_timeout_secs is 0; every inspection will time out".into());
        }

        if self.workers.progress_interval_ms < 50 {
            warnings.push(format!(
                "workers.progress_interval_ms is {}; observers will poll very aggressively",
                self.workers.progress_interval_ms
            ));
        }

        if self.downloads.max_age_secs == 0 {
            warnings.push("downloads.max_age_secs is 0; artifacts are swept immediately".into());
        }

        if self.downloads.sweep_interval_secs == 0 {
            warnings.push("downloads.sweep_interval_secs is 0; periodic sweeping is disabled".into());
        }

        for (name, path) in [
            ("tools.ytdlp_path", &self.tools.ytdlp_path),
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} '{}' does not exist", p.display()));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            static_dir: Some(PathBuf::from("./static")),
        }
    }
}

/// Where artifacts land and how long they are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    pub dir: PathBuf,
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./downloads"),
            max_age_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

impl DownloadsConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

/// Worker pool and observation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of engine calls allowed to run at once.
    pub capacity: usize,
    /// Upper bound on an inspection or search, queueing included.
    pub inspect_timeout_secs: u64,
    /// Push interval of the observation channel.
    pub progress_interval_ms: u64,
    /// Maximum number of search results.
    pub search_limit: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            inspect_timeout_secs: 90,
            progress_interval_ms: 500,
            search_limit: 10,
        }
    }
}

impl WorkersConfig {
    pub fn inspect_timeout(&self) -> Duration {
        Duration::from_secs(self.inspect_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Paths to external CLI tools. `None` means look them up on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
}
