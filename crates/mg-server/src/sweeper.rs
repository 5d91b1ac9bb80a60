//! Periodic removal of old downloads.
//!
//! Every entry directly under the downloads directory whose modification time
//! is older than the configured age is removed: files are unlinked and
//! directories removed recursively. Failures are logged and skipped.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Remove entries of `dir` older than `max_age`. Returns how many were removed.
pub fn sweep_once(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), "Skipping sweep: {e}");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Cannot stat entry: {e}");
                continue;
            }
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|mtime| now.duration_since(mtime).ok())
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        let result = if meta.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "Removed old download");
                removed += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), "Failed to remove old download: {e}"),
        }
    }

    if removed > 0 {
        tracing::info!(dir = %dir.display(), removed, "Swept old downloads");
    }
    removed
}

/// Run one sweep on the blocking pool without waiting for it.
pub fn spawn_sweep(dir: PathBuf, max_age: Duration) -> JoinHandle<usize> {
    tokio::task::spawn_blocking(move || sweep_once(&dir, max_age))
}

/// Sweep `dir` every `interval` until `cancel` fires. A zero interval
/// disables the loop.
pub async fn run_sweeper(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    if interval.is_zero() {
        tracing::info!("Download sweeper disabled");
        return;
    }
    tracing::info!(
        dir = %dir.display(),
        max_age_secs = max_age.as_secs(),
        interval_secs = interval.as_secs(),
        "Download sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = spawn_sweep(dir.clone(), max_age).await {
                    tracing::error!("Sweep task failed: {e}");
                }
            }
        }
    }

    tracing::info!("Download sweeper stopped");
}
