//! Thumbnail routes: serving generated JPEGs and regenerating them.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::server::error::AppError;
use crate::server::{validate_name, AppContext};
use crate::streaming::range::{guess_content_type, serve_file};

/// GET /thumbnails/:name
///
/// Static byte-serve of a previously generated thumbnail.
pub async fn get_thumbnail(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    validate_name(&name)?;
    let path = ctx.config.media.thumbnail_dir.join(&name);

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());

    Ok(serve_file(&path, range_header, guess_content_type(&name)).await?)
}

#[derive(Debug, Serialize)]
pub struct ThumbnailResponse {
    pub success: bool,
    pub thumbnail: Option<String>,
}

/// POST /thumbnails/:name
///
/// Regenerate the thumbnail for a library video. A capture failure is
/// reported as `success: false`, not an HTTP error -- missing thumbnails
/// are cosmetic.
pub async fn regenerate_thumbnail(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
) -> Result<Json<ThumbnailResponse>, AppError> {
    validate_name(&name)?;
    let path = ctx.config.media.library_dir.join(&name);

    if tokio::fs::metadata(&path).await.is_err() {
        return Err(reelvault_core::Error::not_found("video", &name).into());
    }

    let thumbnail = ctx.thumbnailer.extract(&path).await;
    if thumbnail.is_none() {
        tracing::warn!(video = %name, "thumbnail generation failed");
    }

    Ok(Json(ThumbnailResponse {
        success: thumbnail.is_some(),
        thumbnail,
    }))
}
