//! [`MediaEngine`] implementation backed by the `yt-dlp` CLI.
//!
//! Each call spawns a fresh `yt-dlp` process. Inspection and search read a
//! single JSON document from stdout. Retrieval asks yt-dlp to print one
//! machine-readable progress line per callback (`--newline` plus a custom
//! `--progress-template`) and turns those lines into [`ProgressUpdate`]s on
//! the calling thread while a helper thread drains stderr.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

use mg_core::FormatType;
use serde::Deserialize;

use crate::engine::{
    ArtifactLocation, MediaEngine, Metadata, OutputSpec, ProgressPhase, ProgressUpdate, SearchEntry,
};
use crate::error::EngineError;
use crate::tools::{ToolRegistry, FFMPEG, YTDLP};

/// Prefix that marks our own progress lines on stdout.
const PROGRESS_MARKER: &str = "[mg-progress]";

/// Fields, in order: status, downloaded, total, total estimate, speed, eta.
const PROGRESS_TEMPLATE: &str = "download:[mg-progress] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s";

/// Post-processor banners that mean the download phase is over.
const POSTPROCESS_PREFIXES: &[&str] = &[
    "[ExtractAudio]",
    "[Merger]",
    "[VideoConvertor]",
    "[VideoRemuxer]",
    "[EmbedThumbnail]",
    "[Metadata]",
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const SOCKET_TIMEOUT_SECS: &str = "30";

/// Shells out to `yt-dlp` for every call.
#[derive(Debug, Clone)]
pub struct YtDlpEngine {
    tools: Arc<ToolRegistry>,
}

impl YtDlpEngine {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    fn command(&self) -> Result<Command, EngineError> {
        let ytdlp = self.tools.require(YTDLP)?;
        let mut cmd = Command::new(&ytdlp.path);
        cmd.args(common_args());
        if let Some(ffmpeg) = self.tools.path_of(FFMPEG) {
            cmd.arg("--ffmpeg-location").arg(ffmpeg);
        }
        Ok(cmd)
    }

    /// Run to completion and parse stdout as one JSON document.
    fn run_json<T: for<'de> Deserialize<'de>>(&self, mut cmd: Command) -> Result<T, EngineError> {
        let program = cmd.get_program().to_owned();
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EngineError::Spawn {
                path: program.into(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::failed(failure_message(&stderr, output.status)));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| EngineError::Parse(e.to_string()))
    }
}

impl MediaEngine for YtDlpEngine {
    fn inspect(&self, url: &str) -> Result<Metadata, EngineError> {
        let mut cmd = self.command()?;
        cmd.args(["--dump-single-json", "--skip-download"])
            .args(["--socket-timeout", SOCKET_TIMEOUT_SECS])
            .args(["--user-agent", USER_AGENT])
            .args(["--add-header", "Accept-Language:en-US,en;q=0.9"])
            .arg("--")
            .arg(url);

        tracing::info!(url, "Inspecting media");
        let meta: Metadata = self.run_json(cmd)?;
        tracing::info!(url, title = meta.title.as_deref().unwrap_or("?"), formats = meta.formats.len(), "Inspection complete");
        Ok(meta)
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchEntry>, EngineError> {
        #[derive(Deserialize)]
        struct Playlist {
            #[serde(default)]
            entries: Option<Vec<SearchEntry>>,
        }

        let mut cmd = self.command()?;
        cmd.args(["--dump-single-json", "--flat-playlist"])
            .args(["--socket-timeout", SOCKET_TIMEOUT_SECS])
            .arg("--")
            .arg(format!("ytsearch{limit}:{query}"));

        tracing::debug!(query, limit, "Searching");
        let playlist: Playlist = self.run_json(cmd)?;
        Ok(playlist.entries.unwrap_or_default())
    }

    fn retrieve(
        &self,
        url: &str,
        spec: &OutputSpec,
        work_dir: &Path,
        on_progress: &mut dyn FnMut(ProgressUpdate),
    ) -> Result<ArtifactLocation, EngineError> {
        let mut cmd = self.command()?;
        cmd.args(retrieve_args(spec, work_dir)).arg("--").arg(url);

        let program = cmd.get_program().to_owned();
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: program.into(),
                source,
            })?;

        tracing::debug!(url, selector = %spec.format_selector(), dir = %work_dir.display(), "yt-dlp spawned");

        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let mut in_download = false;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!("Error reading yt-dlp output: {e}");
                        break;
                    }
                };

                if let Some(update) = parse_progress_line(&line) {
                    in_download = update.phase == ProgressPhase::Downloading;
                    on_progress(update);
                } else if in_download && is_postprocess_line(&line) {
                    in_download = false;
                    on_progress(ProgressUpdate::finished());
                } else {
                    tracing::trace!(target: "mg_engine::ytdlp::stdout", "{line}");
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(EngineError::failed(failure_message(&stderr, status)));
        }

        Ok(ArtifactLocation::new(work_dir))
    }
}

fn common_args() -> [&'static str; 5] {
    [
        "--no-playlist",
        "--no-check-certificates",
        "--geo-bypass",
        "--no-warnings",
        "--no-color",
    ]
}

/// Arguments that shape a retrieval, minus the URL.
fn retrieve_args(spec: &OutputSpec, work_dir: &Path) -> Vec<String> {
    let template = work_dir.join("%(title)s.%(ext)s");
    let mut args = vec![
        "--newline".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "-f".to_string(),
        spec.format_selector(),
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
    ];

    match spec.format_type {
        FormatType::Mp3 => args.extend(
            [
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                "320K",
                "--embed-thumbnail",
                "--embed-metadata",
            ]
            .map(String::from),
        ),
        FormatType::Video => args.extend(
            ["--merge-output-format", "mp4", "--remux-video", "mp4"].map(String::from),
        ),
    }

    args
}

/// Parse one of our marker lines. Any other line yields `None`.
fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?.trim();
    let fields: Vec<&str> = rest.split('|').collect();
    if fields.len() != 6 {
        return None;
    }

    let phase = match fields[0] {
        "downloading" => ProgressPhase::Downloading,
        "finished" => ProgressPhase::Finished,
        _ => return None,
    };

    let total_bytes = number(fields[2]).or_else(|| number(fields[3]));
    Some(ProgressUpdate {
        phase,
        downloaded_bytes: number(fields[1]).unwrap_or(0),
        total_bytes,
        speed: fields[4].trim().parse::<f64>().ok().filter(|s| s.is_finite() && *s > 0.0),
        eta: number(fields[5]).filter(|e| *e > 0),
    })
}

/// yt-dlp prints `NA` for missing values and floats for estimates.
fn number(field: &str) -> Option<u64> {
    let v = field.trim().parse::<f64>().ok()?;
    (v.is_finite() && v >= 0.0).then_some(v as u64)
}

fn is_postprocess_line(line: &str) -> bool {
    let line = line.trim_start();
    POSTPROCESS_PREFIXES.iter().any(|p| line.starts_with(p))
}

/// The most useful line of a failed run's stderr.
fn failure_message(stderr: &str, status: ExitStatus) -> String {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.to_string())
        .unwrap_or_else(|| format!("yt-dlp exited with {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[test]
    fn parses_downloading_line() {
        let update =
            parse_progress_line("[mg-progress] downloading|512|2048|NA|1536.0|7").unwrap();
        assert_eq!(update.phase, ProgressPhase::Downloading);
        assert_eq!(update.downloaded_bytes, 512);
        assert_eq!(update.total_bytes, Some(2048));
        assert_eq!(update.speed, Some(1536.0));
        assert_eq!(update.eta, Some(7));
        assert_eq!(update.percent(), Some(25.0));
    }

    #[test]
    fn falls_back_to_estimate() {
        let update =
            parse_progress_line("[mg-progress] downloading|100|NA|400.0|NA|NA").unwrap();
        assert_eq!(update.total_bytes, Some(400));
        assert!(update.speed.is_none());
        assert!(update.eta.is_none());
    }

    #[test]
    fn parses_finished_line() {
        let update = parse_progress_line("[mg-progress] finished|2048|2048|NA|NA|NA").unwrap();
        assert_eq!(update.phase, ProgressPhase::Finished);
    }

    #[test]
    fn ignores_other_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("[mg-progress] downloading|1|2").is_none());
        assert!(parse_progress_line("[mg-progress] error|1|2|3|4|5").is_none());
    }

    #[test]
    fn postprocess_detection() {
        assert!(is_postprocess_line("[ExtractAudio] Destination: /tmp/x.mp3"));
        assert!(is_postprocess_line("[Merger] Merging formats into \"x.mp4\""));
        assert!(!is_postprocess_line("[download] 100% of 3.00MiB"));
    }

    #[test]
    fn mp3_args() {
        let spec = OutputSpec::new(FormatType::Mp3, None);
        let args = retrieve_args(&spec, Path::new("/downloads/job"));
        assert!(args.windows(2).any(|w| w == ["-f", "bestaudio/best"]));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--audio-quality", "320K"]));
        assert!(args.contains(&"--embed-thumbnail".to_string()));
        let out = args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(
            PathBuf::from(&args[out + 1]),
            PathBuf::from("/downloads/job/%(title)s.%(ext)s")
        );
    }

    #[test]
    fn video_args() {
        let spec = OutputSpec::new(FormatType::Video, Some("480p"));
        let args = retrieve_args(&spec, Path::new("/d"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "-f" && w[1] == "bestvideo[height<=480]+bestaudio/best[height<=480]/best"));
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(!args.contains(&"--extract-audio".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn failure_message_prefers_error_line() {
        let stderr = "WARNING: something\nERROR: [youtube] x: Video unavailable\nmore noise\n";
        assert_eq!(
            failure_message(stderr, exit_status(1)),
            "ERROR: [youtube] x: Video unavailable"
        );
        assert_eq!(failure_message("just this\n", exit_status(1)), "just this");
        assert!(failure_message("", exit_status(2)).contains("exited"));
    }

    #[test]
    fn missing_binary_is_tool_not_found() {
        let engine = YtDlpEngine::new(Arc::new(ToolRegistry::default()));
        let err = engine.inspect("https://example.com/v").unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound { .. }));
    }

    #[test]
    fn unstartable_binary_is_spawn_error() {
        let tools = ToolRegistry::default().with_tool(YTDLP, "/nonexistent/bin/yt-dlp");
        let engine = YtDlpEngine::new(Arc::new(tools));
        let err = engine.search("cats", 3).unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    /// A yt-dlp stand-in: `body` runs after the `-o` template's directory
    /// has been stored in `$dir`.
    #[cfg(unix)]
    fn script_engine(tools_dir: &Path, body: &str) -> YtDlpEngine {
        use std::os::unix::fs::PermissionsExt;

        let script = tools_dir.join("fake-yt-dlp");
        let prelude = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
dir=$(dirname "$out")
"#;
        std::fs::write(&script, format!("{prelude}{body}")).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        YtDlpEngine::new(Arc::new(ToolRegistry::default().with_tool(YTDLP, script)))
    }

    #[cfg(unix)]
    #[test]
    fn retrieve_reports_progress_and_locates_artifact() {
        let tools_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        // The stderr loop writes well past a pipe buffer before stdout starts.
        let engine = script_engine(
            tools_dir.path(),
            r#"i=0
while [ $i -lt 3000 ]; do
  echo "[debug] filler line $i for the stderr pipe" >&2
  i=$((i+1))
done
echo "[youtube] abc: Downloading webpage"
echo "[mg-progress] downloading|1024|4096|NA|2048.0|2"
echo "[mg-progress] downloading|4096|NA|4096.0|NA|NA"
echo "[Merger] Merging formats into \"$dir/clip.mp4\""
printf 'data' > "$dir/clip.mp4"
exit 0
"#,
        );

        let spec = OutputSpec::new(FormatType::Video, None);
        let mut updates = Vec::new();
        let location = engine
            .retrieve("https://example.com/v", &spec, work_dir.path(), &mut |u| updates.push(u))
            .unwrap();

        let phases: Vec<ProgressPhase> = updates.iter().map(|u| u.phase).collect();
        assert_eq!(
            phases,
            vec![ProgressPhase::Downloading, ProgressPhase::Downloading, ProgressPhase::Finished]
        );
        assert_eq!(updates[0].percent(), Some(25.0));
        assert_eq!(updates[0].eta, Some(2));
        assert_eq!(updates[1].total_bytes, Some(4096));

        let artifact = location.locate().unwrap();
        assert_eq!(artifact.file_name().unwrap(), "clip.mp4");
    }

    #[cfg(unix)]
    #[test]
    fn retrieve_failure_uses_last_error_line() {
        let tools_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let engine = script_engine(
            tools_dir.path(),
            r#"echo "[youtube] abc: Downloading webpage"
echo "WARNING: falling back" >&2
echo "ERROR: [youtube] abc: Video unavailable" >&2
echo "cleanup noise" >&2
exit 1
"#,
        );

        let spec = OutputSpec::new(FormatType::Mp3, None);
        let mut calls = 0;
        let err = engine
            .retrieve("https://example.com/v", &spec, work_dir.path(), &mut |_| calls += 1)
            .unwrap_err();

        assert_eq!(calls, 0);
        match err {
            EngineError::Failed { message } => {
                assert_eq!(message, "ERROR: [youtube] abc: Video unavailable")
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
