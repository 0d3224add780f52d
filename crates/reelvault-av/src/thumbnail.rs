//! One-shot thumbnail extraction.
//!
//! Captures a single frame from a video -- at 25% of its duration, but at
//! least one second in -- and scales it to a 1280px-wide JPEG under a
//! unique generated name. All failure modes collapse to `None`: a missing
//! thumbnail is a cosmetic defect, never a request error.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::ToolCommand;
use crate::probe::FfprobeProber;
use crate::tools::ToolRegistry;

/// Thumbnails are scaled to this width, aspect ratio preserved. For a 16:9
/// source this yields 1280x720.
const THUMB_WIDTH: u32 = 1280;

/// Extracts thumbnail frames from video files.
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    tools: Arc<ToolRegistry>,
    prober: Option<FfprobeProber>,
    thumb_dir: PathBuf,
}

impl Thumbnailer {
    /// Create a thumbnailer writing into `thumb_dir`.
    pub fn new(tools: Arc<ToolRegistry>, thumb_dir: PathBuf) -> Self {
        let prober = FfprobeProber::from_registry(&tools);
        Self {
            tools,
            prober,
            thumb_dir,
        }
    }

    /// Directory thumbnails are written to.
    pub fn thumb_dir(&self) -> &Path {
        &self.thumb_dir
    }

    /// Generate a thumbnail for `source`, returning the generated file name.
    ///
    /// Returns `None` (not an error) when the source file is missing, ffmpeg
    /// is unavailable, or the capture fails; a failed capture removes any
    /// partial output file.
    pub async fn extract(&self, source: &Path) -> Option<String> {
        if tokio::fs::metadata(source).await.is_err() {
            return None;
        }
        let ffmpeg = self.tools.require("ffmpeg").ok()?;

        if let Err(e) = tokio::fs::create_dir_all(&self.thumb_dir).await {
            tracing::warn!(
                dir = %self.thumb_dir.display(),
                error = %e,
                "cannot create thumbnail directory"
            );
            return None;
        }

        // Capture 25% into the video, at least one second in. An unprobeable
        // duration falls back to the one-second mark.
        let duration = match &self.prober {
            Some(prober) => prober.duration(source).await,
            None => None,
        };
        let capture_secs = duration
            .filter(|d| *d > 0.0)
            .map(|d| (d * 0.25).max(1.0))
            .unwrap_or(1.0);
        let timestamp = format_timestamp(capture_secs);

        let name = format!("{}.jpg", uuid::Uuid::new_v4().simple());
        let out_path = self.thumb_dir.join(&name);

        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.arg("-y")
            .arg("-ss")
            .arg(timestamp.as_str())
            .arg("-i")
            .arg(source.to_string_lossy().as_ref())
            .args(["-vframes", "1", "-vf"])
            .arg(format!("scale={THUMB_WIDTH}:-1"))
            .args(["-q:v", "5"])
            .arg(out_path.to_string_lossy().as_ref());

        match cmd.execute().await {
            Ok(_) => Some(name),
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    error = %e,
                    "thumbnail capture failed"
                );
                let _ = tokio::fs::remove_file(&out_path).await;
                None
            }
        }
    }
}

/// Format seconds as `HH:MM:SS.mmm` for ffmpeg's `-ss` flag.
fn format_timestamp(secs: f64) -> String {
    let hours = (secs / 3600.0).floor() as u64;
    let minutes = ((secs % 3600.0) / 60.0).floor() as u64;
    let seconds = secs % 60.0;
    format!("{hours:02}:{minutes:02}:{seconds:06.3}")
}
