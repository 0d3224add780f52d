//! Video streaming route.
//!
//! `GET /stream/:video[?quality=480|720|1080]` serves a file from the media
//! library. With a valid `quality` and a working encoder the response is a
//! live-transcoded MP4 (Range ignored); otherwise raw bytes with full
//! range-request support.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use serde::Deserialize;

use crate::server::error::AppError;
use crate::server::{validate_name, AppContext};
use crate::streaming::range::{guess_content_type, serve_file};
use crate::streaming::transcode::{requested_quality, transcoded_response};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Requested quality; values outside {480, 720, 1080} fall back to the
    /// raw file.
    pub quality: Option<String>,
}

/// GET /stream/:video
pub async fn stream_video(
    State(ctx): State<AppContext>,
    Path(video): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    validate_name(&video)?;
    let path = ctx.config.media.library_dir.join(&video);

    if tokio::fs::metadata(&path).await.is_err() {
        return Err(reelvault_core::Error::not_found("video", &video).into());
    }

    if let Some(target_height) = requested_quality(query.quality.as_deref()) {
        let backend = ctx.settings.transcode_backend();
        if let Some(resp) = transcoded_response(&ctx.tools, backend, &path, target_height).await
        {
            return Ok(resp);
        }
        // Every encoder option failed; availability beats quality, so fall
        // through to the raw file.
    }

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    Ok(serve_file(&path, range_header, guess_content_type(&video)).await?)
}
