//! Live-transcoded streaming responses.
//!
//! Spawns the encoder chosen by the configured backend and forwards its
//! fragmented-MP4 output as it is produced. `Content-Length` is unknown in
//! advance and Range requests are not honored in this mode: a client-side
//! seek restarts the encoder from the beginning. There is also no timeout
//! beyond the encoder process's own lifetime -- if the encoder hangs, the
//! stream hangs with it.

use std::path::Path;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;

use reelvault_av::{transcode, ToolRegistry, TranscodeBackend, TranscodeSpec};

/// Build a live-transcoded response, or `None` when every encoder option
/// has been exhausted and the caller should fall back to serving the
/// original file.
///
/// Failure policy: a hardware backend that fails to start is retried once
/// on the CPU encoder; if that also fails the caller degrades to the raw
/// file. Availability wins over requested quality, so the client always
/// gets a playable stream.
pub async fn transcoded_response(
    tools: &ToolRegistry,
    backend: TranscodeBackend,
    source: &Path,
    target_height: u32,
) -> Option<Response> {
    let ffmpeg = tools.require("ffmpeg").ok()?;

    let spec = TranscodeSpec {
        source: source.to_path_buf(),
        target_height,
        backend,
    };

    let child = match transcode::spawn(&ffmpeg.path, &spec) {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(
                backend = %backend,
                error = %e,
                "encoder failed to start"
            );
            if backend == TranscodeBackend::Cpu {
                return None;
            }
            let cpu_spec = spec.with_backend(TranscodeBackend::Cpu);
            match transcode::spawn(&ffmpeg.path, &cpu_spec) {
                Ok(child) => {
                    tracing::warn!(
                        source = %source.display(),
                        "falling back to CPU transcoding"
                    );
                    child
                }
                Err(e) => {
                    tracing::error!(
                        source = %source.display(),
                        error = %e,
                        "CPU encoder also failed; serving the original file"
                    );
                    return None;
                }
            }
        }
    };

    let body = Body::from_stream(child.into_byte_stream());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .body(body)
        .ok()
}

/// A quality value a client may request, validated against the supported
/// set. Anything else (including absence) means raw serving.
pub fn requested_quality(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|h| transcode::is_supported_quality(*h))
}
