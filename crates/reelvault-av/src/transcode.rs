//! Live transcode command construction and the streaming encoder child.
//!
//! A [`TranscodeSpec`] describes one transcode request (source file, target
//! height, hardware backend) and knows how to render itself into an ffmpeg
//! argument list producing a fragmented MP4 on stdout. [`spawn`] starts the
//! encoder; the resulting [`TranscodeChild`] turns its stdout into a bounded
//! chunk stream and guarantees the process is killed when the stream ends,
//! however it ends.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

/// Qualities a client may request; anything else falls back to raw serving.
pub const ALLOWED_HEIGHTS: &[u32] = &[480, 720, 1080];

/// Read size for forwarding encoder output.
const CHUNK_SIZE: usize = 64 * 1024;

/// Whether the given target height is one we transcode to.
pub fn is_supported_quality(height: u32) -> bool {
    ALLOWED_HEIGHTS.contains(&height)
}

/// Hardware encoder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeBackend {
    Cpu,
    Intel,
    Amd,
    Nvidia,
}

impl Default for TranscodeBackend {
    fn default() -> Self {
        TranscodeBackend::Cpu
    }
}

impl std::fmt::Display for TranscodeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TranscodeBackend::Cpu => "cpu",
            TranscodeBackend::Intel => "intel",
            TranscodeBackend::Amd => "amd",
            TranscodeBackend::Nvidia => "nvidia",
        };
        f.write_str(s)
    }
}

impl TranscodeBackend {
    /// The H.264 encoder this backend maps to.
    pub fn video_codec(self) -> &'static str {
        match self {
            TranscodeBackend::Cpu => "libx264",
            TranscodeBackend::Nvidia => "h264_nvenc",
            TranscodeBackend::Intel => "h264_qsv",
            TranscodeBackend::Amd => "h264_vaapi",
        }
    }

    /// Hardware-acceleration context arguments, empty for the CPU path.
    pub fn hwaccel_args(self) -> &'static [&'static str] {
        match self {
            TranscodeBackend::Cpu => &[],
            TranscodeBackend::Nvidia => &["-hwaccel", "cuda"],
            TranscodeBackend::Intel => &["-hwaccel", "qsv"],
            TranscodeBackend::Amd => &["-hwaccel", "vaapi"],
        }
    }
}

/// One transcode request.
#[derive(Debug, Clone)]
pub struct TranscodeSpec {
    pub source: PathBuf,
    pub target_height: u32,
    pub backend: TranscodeBackend,
}

impl TranscodeSpec {
    /// Scale filter: height capped at min(input height, target), aspect
    /// ratio preserved, width forced even. Never upscales.
    pub fn scale_filter(&self) -> String {
        format!("scale=-2:min(ih\\,{})", self.target_height)
    }

    /// A copy of this spec retargeted at a different backend.
    pub fn with_backend(&self, backend: TranscodeBackend) -> Self {
        Self {
            backend,
            ..self.clone()
        }
    }

    /// Render the full ffmpeg argument list.
    ///
    /// Output is a fragmented MP4 (`frag_keyframe+empty_moov`) on stdout so
    /// it can be consumed incrementally without knowing the final size.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
        ];
        args.extend(self.backend.hwaccel_args().iter().map(|s| s.to_string()));
        args.push("-i".into());
        args.push(self.source.to_string_lossy().into_owned());
        args.push("-vf".into());
        args.push(self.scale_filter());
        args.push("-c:v".into());
        args.push(self.backend.video_codec().into());
        args.extend(
            [
                "-preset",
                "fast",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-ac",
                "2",
                "-movflags",
                "frag_keyframe+empty_moov",
                "-f",
                "mp4",
                "-",
            ]
            .into_iter()
            .map(String::from),
        );
        args
    }
}

/// A running encoder process with piped stdout.
#[derive(Debug)]
pub struct TranscodeChild {
    child: Child,
}

/// Start the encoder for the given spec.
///
/// # Errors
///
/// Returns [`reelvault_core::Error::Tool`] when the process cannot be
/// started (missing binary, unusable hardware backend, ...). Callers use
/// this to drive the backend fallback chain.
pub fn spawn(ffmpeg: &Path, spec: &TranscodeSpec) -> reelvault_core::Result<TranscodeChild> {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(spec.build_args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // If the consumer drops the stream mid-flight the child must not
        // outlive it.
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| reelvault_core::Error::Tool {
        tool: "ffmpeg".into(),
        message: format!("failed to start ({} backend): {e}", spec.backend),
    })?;

    tracing::debug!(
        source = %spec.source.display(),
        height = spec.target_height,
        backend = %spec.backend,
        "encoder started"
    );

    Ok(TranscodeChild { child })
}

impl TranscodeChild {
    /// Consume the child into a bounded-chunk byte stream over its stdout.
    ///
    /// The stream owns the process. When it ends -- output drained, read
    /// error, or the consumer dropping it early -- the encoder is killed and
    /// the pipe closed exactly once.
    pub fn into_byte_stream(
        mut self,
    ) -> impl futures_core::Stream<Item = std::io::Result<Bytes>> + Send {
        async_stream::stream! {
            if let Some(mut stdout) = self.child.stdout.take() {
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    match stdout.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => yield Ok(Bytes::copy_from_slice(&buf[..n])),
                        Err(e) => {
                            yield Err(e);
                            break;
                        }
                    }
                }
                drop(stdout);
            }
            let _ = self.child.start_kill();
            let _ = self.child.wait().await;
        }
    }
}
