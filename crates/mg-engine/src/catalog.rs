//! Format catalog resolver and response shaping.
//!
//! Turns raw engine output into the client-facing types. Nothing in here
//! fails: missing upstream fields render as defaults.

use std::collections::HashSet;

use mg_core::format::{duration_secs, format_duration, format_size};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{Metadata, RawFormat, SearchEntry};

const DEFAULT_EXT: &str = "mp4";
const UNTITLED: &str = "Untitled";
const UNKNOWN_UPLOADER: &str = "Unknown";
const DESCRIPTION_CHARS: usize = 300;

/// A selectable video quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct FormatOption {
    /// Label such as `"720p"`; unique within a catalog.
    pub quality: String,
    pub height: u32,
    pub ext: String,
    /// Human-readable size, `"N/A"` when unknown.
    pub filesize: String,
    pub format_note: String,
}

/// Inspection response.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: String,
    pub duration: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub view_count: u64,
    pub upload_date: String,
    pub description: String,
    pub video_formats: Vec<FormatOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    /// Canonical watch URL, usable as input to inspection.
    pub url: String,
    pub thumbnail: String,
    pub duration: String,
    pub uploader: String,
    pub view_count: u64,
}

/// Keep video-bearing entries with a height, one per quality label (first
/// seen wins), ordered tallest first. Equal heights keep engine order.
pub fn resolve_formats(formats: &[RawFormat]) -> Vec<FormatOption> {
    let mut seen = HashSet::new();
    let mut options: Vec<FormatOption> = formats
        .iter()
        .filter(|f| f.has_video())
        .filter_map(|f| {
            let height = f.height.filter(|h| *h > 0)?;
            let quality = format!("{height}p");
            if !seen.insert(quality.clone()) {
                return None;
            }
            Some(FormatOption {
                quality,
                height,
                ext: f.ext.clone().unwrap_or_else(|| DEFAULT_EXT.to_string()),
                filesize: format_size(f.filesize.or(f.filesize_approx)),
                format_note: f.format_note.clone().unwrap_or_default(),
            })
        })
        .collect();

    // sort_by is stable
    options.sort_by(|a, b| b.height.cmp(&a.height));
    options
}

pub fn media_info(meta: Metadata) -> MediaInfo {
    let video_formats = resolve_formats(&meta.formats);
    let duration_seconds = meta.duration.as_ref().and_then(duration_secs).unwrap_or(0);

    MediaInfo {
        title: meta.title.unwrap_or_else(|| UNTITLED.to_string()),
        thumbnail: meta.thumbnail.unwrap_or_default(),
        duration: format_duration(meta.duration.as_ref()),
        duration_seconds,
        uploader: meta.uploader.unwrap_or_else(|| UNKNOWN_UPLOADER.to_string()),
        view_count: meta.view_count.unwrap_or(0),
        upload_date: meta.upload_date.unwrap_or_default(),
        description: meta
            .description
            .map(|d| d.chars().take(DESCRIPTION_CHARS).collect())
            .unwrap_or_default(),
        video_formats,
    }
}

pub fn search_results(entries: Vec<SearchEntry>) -> Vec<SearchResult> {
    entries
        .into_iter()
        .map(|entry| {
            let id = entry.id.unwrap_or_default();
            // The last listed thumbnail is the largest.
            let thumbnail = entry
                .thumbnails
                .iter()
                .rev()
                .find_map(|t| t.url.clone())
                .or(entry.thumbnail)
                .unwrap_or_default();
            let zero = Value::from(0);

            SearchResult {
                url: format!("https://www.youtube.com/watch?v={id}"),
                id,
                title: entry.title.unwrap_or_default(),
                thumbnail,
                duration: format_duration(Some(entry.duration.as_ref().unwrap_or(&zero))),
                uploader: entry.uploader.unwrap_or_default(),
                view_count: entry.view_count.unwrap_or(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Thumbnail;
    use serde_json::json;

    fn fmt(height: Option<u32>, vcodec: Option<&str>, note: &str) -> RawFormat {
        RawFormat {
            height,
            vcodec: vcodec.map(String::from),
            format_note: Some(note.into()),
            ..Default::default()
        }
    }

    #[test]
    fn discards_audio_only_and_heightless() {
        let formats = vec![
            fmt(None, Some("avc1"), "storyboard"),
            fmt(Some(360), Some("none"), "audio"),
            fmt(Some(240), None, "unknown codec"),
            fmt(Some(480), Some("vp9"), "480p"),
        ];
        let out = resolve_formats(&formats);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].quality, "480p");
    }

    #[test]
    fn unique_by_label_first_seen_wins() {
        let formats = vec![
            fmt(Some(720), Some("avc1"), "first"),
            fmt(Some(1080), Some("avc1"), "tall"),
            fmt(Some(720), Some("vp9"), "second"),
        ];
        let out = resolve_formats(&formats);
        let labels: Vec<&str> = out.iter().map(|o| o.quality.as_str()).collect();
        assert_eq!(labels, vec!["1080p", "720p"]);
        assert_eq!(out[1].format_note, "first");
    }

    #[test]
    fn sorted_descending() {
        let formats = vec![
            fmt(Some(144), Some("avc1"), ""),
            fmt(Some(2160), Some("avc1"), ""),
            fmt(Some(720), Some("avc1"), ""),
            fmt(Some(360), Some("avc1"), ""),
        ];
        let heights: Vec<u32> = resolve_formats(&formats).iter().map(|o| o.height).collect();
        assert_eq!(heights, vec![2160, 720, 360, 144]);
    }

    #[test]
    fn size_and_ext_defaults() {
        let mut exact = fmt(Some(720), Some("avc1"), "");
        exact.filesize = Some(1536);
        exact.ext = Some("webm".into());
        let mut approx = fmt(Some(480), Some("avc1"), "");
        approx.filesize_approx = Some(500);
        let unknown = fmt(Some(360), Some("avc1"), "");

        let out = resolve_formats(&[exact, approx, unknown]);
        assert_eq!(out[0].filesize, "1.5 KB");
        assert_eq!(out[0].ext, "webm");
        assert_eq!(out[1].filesize, "500.0 B");
        assert_eq!(out[1].ext, "mp4");
        assert_eq!(out[2].filesize, "N/A");
    }

    #[test]
    fn empty_catalog() {
        assert!(resolve_formats(&[]).is_empty());
    }

    #[test]
    fn media_info_defaults() {
        let info = media_info(Metadata::default());
        assert_eq!(info.title, "Untitled");
        assert_eq!(info.uploader, "Unknown");
        assert_eq!(info.duration, "unknown");
        assert_eq!(info.duration_seconds, 0);
        assert_eq!(info.view_count, 0);
        assert!(info.video_formats.is_empty());
    }

    #[test]
    fn media_info_populated() {
        let meta = Metadata {
            title: Some("Song".into()),
            duration: Some(json!(3725)),
            uploader: Some("Band".into()),
            view_count: Some(42),
            description: Some("x".repeat(500)),
            formats: vec![fmt(Some(720), Some("avc1"), "hd")],
            ..Default::default()
        };
        let info = media_info(meta);
        assert_eq!(info.duration, "1:02:05");
        assert_eq!(info.duration_seconds, 3725);
        assert_eq!(info.description.chars().count(), 300);
        assert_eq!(info.video_formats.len(), 1);
    }

    #[test]
    fn search_results_shape() {
        let entries = vec![
            SearchEntry {
                id: Some("abc".into()),
                title: Some("First".into()),
                thumbnail: Some("small.jpg".into()),
                thumbnails: vec![
                    Thumbnail { url: Some("mid.jpg".into()) },
                    Thumbnail { url: Some("large.jpg".into()) },
                ],
                duration: Some(json!(75)),
                uploader: Some("Someone".into()),
                view_count: Some(10),
            },
            SearchEntry::default(),
        ];
        let out = search_results(entries);
        assert_eq!(out[0].url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(out[0].thumbnail, "large.jpg");
        assert_eq!(out[0].duration, "1:15");

        assert_eq!(out[1].title, "");
        assert_eq!(out[1].duration, "0:00");
        assert_eq!(out[1].view_count, 0);
    }
}
