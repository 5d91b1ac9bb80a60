//! # mg-engine
//!
//! The boundary between mediagrab and the external media-retrieval engine.
//!
//! This crate provides:
//!
//! - **Engine abstraction** ([`MediaEngine`]) -- blocking inspect, search and
//!   retrieve calls with a progress callback sink.
//! - **yt-dlp adapter** ([`YtDlpEngine`]) -- implements [`MediaEngine`] by
//!   shelling out to `yt-dlp` (and, through it, `ffmpeg`).
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the paths of
//!   `yt-dlp` and `ffmpeg`, report their versions.
//! - **Format catalog** ([`catalog`]) -- turn raw engine metadata into the
//!   ranked, de-duplicated response shapes served over HTTP.

pub mod catalog;
pub mod engine;
pub mod error;
pub mod tools;
pub mod ytdlp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ---- Re-exports for convenience ----

pub use catalog::{FormatOption, MediaInfo, SearchResult};
pub use engine::{
    ArtifactLocation, MediaEngine, Metadata, OutputSpec, ProgressPhase, ProgressUpdate, RawFormat,
    SearchEntry,
};
pub use error::EngineError;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use ytdlp::YtDlpEngine;
