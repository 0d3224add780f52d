//! FFprobe-based media inspection.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format
//! -show_streams` and maps the JSON output into [`MediaProbe`]. Only the
//! handful of fields the rest of the application cares about are extracted:
//! container duration and the dimensions of the first video stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Probing should be fast; don't let a wedged ffprobe hold a request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of a probed media file.
#[derive(Debug, Clone, Default)]
pub struct MediaProbe {
    /// Container duration in seconds, when the container reports one.
    pub duration_secs: Option<f64>,
    /// Width of the first video stream.
    pub width: Option<u32>,
    /// Height of the first video stream.
    pub height: Option<u32>,
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }

    /// Create a prober from a registry, if ffprobe was discovered.
    pub fn from_registry(tools: &ToolRegistry) -> Option<Self> {
        tools
            .require("ffprobe")
            .ok()
            .map(|cfg| Self::new(cfg.path.clone()))
    }

    /// Probe the given file.
    pub async fn probe(&self, path: &Path) -> reelvault_core::Result<MediaProbe> {
        let mut cmd = ToolCommand::new(self.ffprobe_path.clone());
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        cmd.arg(path.to_string_lossy().as_ref());
        cmd.timeout(PROBE_TIMEOUT);

        let output = cmd.execute().await?;
        parse_probe_output(&output.stdout)
    }

    /// Probe just the duration, swallowing failures.
    ///
    /// Thumbnailing treats an unknown duration as "capture at 1s", so a
    /// probe failure here is not an error worth propagating.
    pub async fn duration(&self, path: &Path) -> Option<f64> {
        match self.probe(path).await {
            Ok(probe) => probe.duration_secs,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "duration probe failed");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_probe_output(raw: &str) -> reelvault_core::Result<MediaProbe> {
    let ff: FfprobeOutput = serde_json::from_str(raw)
        .map_err(|e| reelvault_core::Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let duration_secs = ff
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok());

    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(MediaProbe {
        duration_secs,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_and_dimensions() {
        let raw = r#"{
            "format": {"format_name": "matroska", "duration": "4521.340000"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}
            ]
        }"#;
        let probe = parse_probe_output(raw).unwrap();
        assert_eq!(probe.duration_secs, Some(4521.34));
        assert_eq!(probe.width, Some(1920));
        assert_eq!(probe.height, Some(1080));
    }

    #[test]
    fn missing_duration_is_none() {
        let raw = r#"{"format": {}, "streams": []}"#;
        let probe = parse_probe_output(raw).unwrap();
        assert_eq!(probe.duration_secs, None);
        assert_eq!(probe.height, None);
    }

    #[test]
    fn unparsable_duration_is_none() {
        let raw = r#"{"format": {"duration": "N/A"}, "streams": []}"#;
        let probe = parse_probe_output(raw).unwrap();
        assert_eq!(probe.duration_secs, None);
    }

    #[test]
    fn garbage_json_is_probe_error() {
        let err = parse_probe_output("this is not json").unwrap_err();
        assert!(matches!(err, reelvault_core::Error::Probe(_)));
    }

    #[test]
    fn first_video_stream_wins() {
        let raw = r#"{
            "format": {"duration": "10.0"},
            "streams": [
                {"codec_type": "video", "width": 1280, "height": 720},
                {"codec_type": "video", "width": 640, "height": 360}
            ]
        }"#;
        let probe = parse_probe_output(raw).unwrap();
        assert_eq!(probe.height, Some(720));
    }
}
