//! Range-based file streaming.
//!
//! Serves raw file bytes with HTTP range support via bounded-chunk
//! `ReaderStream` bodies; files are never loaded whole into memory. The
//! range grammar is deliberately narrow: `bytes=start-end` and
//! `bytes=start-` only. Suffix ranges (`bytes=-N`) are rejected as
//! malformed like any other unparsable header, and a multipart range is
//! never produced.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use reelvault_core::{Error, Result};

/// Read size for file bodies.
const CHUNK_SIZE: usize = 64 * 1024;

/// A validated byte range within a file of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive, already clamped to `total - 1`.
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Number of bytes the range covers. Always at least 1: construction
    /// guarantees `start <= end`.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header against a file of `file_size` bytes.
///
/// Accepted forms are `bytes=start-end` and `bytes=start-`. Anything else
/// -- a different unit, non-digit bounds, the suffix form `bytes=-N`, a
/// start at or past the end of the file, or an inverted range -- is
/// [`Error::RangeNotSatisfiable`]. `end` is clamped to the last byte.
pub fn parse_range(header: &str, file_size: u64) -> Result<ByteRange> {
    let bounds = header
        .strip_prefix("bytes=")
        .ok_or_else(|| Error::bad_range(format!("unsupported range unit in {header:?}")))?;

    let (start_str, end_str) = bounds
        .split_once('-')
        .ok_or_else(|| Error::bad_range(format!("missing '-' in range {header:?}")))?;

    if start_str.is_empty() {
        // Suffix ranges (bytes=-N) are not supported; they fail like any
        // other malformed range.
        return Err(Error::bad_range(format!(
            "suffix range {header:?} is not supported"
        )));
    }

    let start: u64 = start_str
        .parse()
        .map_err(|_| Error::bad_range(format!("invalid range start {start_str:?}")))?;

    let end: u64 = if end_str.is_empty() {
        file_size.saturating_sub(1)
    } else {
        end_str
            .parse()
            .map_err(|_| Error::bad_range(format!("invalid range end {end_str:?}")))?
    };

    if start >= file_size {
        return Err(Error::bad_range(format!(
            "start {start} is beyond the {file_size}-byte resource"
        )));
    }
    let end = end.min(file_size - 1);
    if start > end {
        return Err(Error::bad_range(format!(
            "range starts at {start} but ends at {end}"
        )));
    }

    Ok(ByteRange {
        start,
        end,
        total: file_size,
    })
}

/// Guess the MIME type from a file name's extension.
pub fn guess_content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");

    match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "flv" => "video/x-flv",
        "wmv" => "video/x-ms-wmv",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

/// Serve a file with HTTP range support.
///
/// - Missing file: [`Error::NotFound`].
/// - No range header: 200 with the full body.
/// - Valid range: 206 with the exact byte slice from a seeked read.
/// - Malformed or out-of-bounds range: a 416 response carrying
///   `Content-Range: bytes */<size>`.
///
/// Bodies are `ReaderStream`s over the opened file handle, which is
/// released when the response body is dropped on any exit path.
pub async fn serve_file(
    path: &Path,
    range_header: Option<&str>,
    content_type: &str,
) -> Result<Response> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::not_found("file", path.display()))?;
    let file_size = metadata.len();

    let range = match range_header {
        Some(header) => match parse_range(header, file_size) {
            Ok(range) => Some(range),
            Err(e @ Error::RangeNotSatisfiable(_)) => {
                tracing::debug!(path = %path.display(), error = %e, "rejecting range request");
                return Ok(range_not_satisfiable(file_size));
            }
            Err(other) => return Err(other),
        },
        None => None,
    };

    match range {
        Some(range) => {
            let mut file = File::open(path)
                .await
                .map_err(|_| Error::not_found("file", path.display()))?;
            file.seek(SeekFrom::Start(range.start)).await?;

            // Take limits reads to exactly the requested slice.
            let stream = ReaderStream::with_capacity(file.take(range.len()), CHUNK_SIZE);
            let body = Body::from_stream(stream);

            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE.as_str(), content_type.to_string()),
                    (
                        header::CONTENT_RANGE.as_str(),
                        format!("bytes {}-{}/{}", range.start, range.end, range.total),
                    ),
                    (header::CONTENT_LENGTH.as_str(), range.len().to_string()),
                    (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
        None => {
            let file = File::open(path)
                .await
                .map_err(|_| Error::not_found("file", path.display()))?;

            let stream = ReaderStream::with_capacity(file, CHUNK_SIZE);
            let body = Body::from_stream(stream);

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE.as_str(), content_type.to_string()),
                    (header::CONTENT_LENGTH.as_str(), file_size.to_string()),
                    (header::ACCEPT_RANGES.as_str(), "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
    }
}

fn range_not_satisfiable(file_size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(
            header::CONTENT_RANGE.as_str(),
            format!("bytes */{file_size}"),
        )],
        Body::empty(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_range() {
        let r = parse_range("bytes=0-99", 1000).unwrap();
        assert_eq!((r.start, r.end, r.total), (0, 99, 1000));
        assert_eq!(r.len(), 100);
    }

    #[test]
    fn parse_open_ended_range() {
        let r = parse_range("bytes=500-", 1000).unwrap();
        assert_eq!((r.start, r.end), (500, 999));
    }

    #[test]
    fn end_is_clamped() {
        let r = parse_range("bytes=999-2000", 1000).unwrap();
        assert_eq!((r.start, r.end), (999, 999));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn start_past_end_of_file_is_rejected() {
        assert!(parse_range("bytes=1000-1010", 1000).is_err());
        assert!(parse_range("bytes=5000-", 1000).is_err());
    }

    #[test]
    fn any_range_on_empty_file_is_rejected() {
        assert!(parse_range("bytes=0-0", 0).is_err());
        assert!(parse_range("bytes=0-", 0).is_err());
    }

    #[test]
    fn suffix_ranges_are_rejected() {
        assert!(parse_range("bytes=-500", 1000).is_err());
        assert!(parse_range("bytes=-", 1000).is_err());
    }

    #[test]
    fn wrong_unit_is_rejected() {
        assert!(parse_range("items=0-5", 1000).is_err());
        assert!(parse_range("0-5", 1000).is_err());
    }

    #[test]
    fn garbage_bounds_are_rejected() {
        assert!(parse_range("bytes=abc-def", 1000).is_err());
        assert!(parse_range("bytes=1x-20", 1000).is_err());
        assert!(parse_range("bytes=0-99-5", 1000).is_err());
        assert!(parse_range("bytes=", 1000).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(parse_range("bytes=10-5", 1000).is_err());
    }

    #[test]
    fn errors_are_range_not_satisfiable() {
        for header in ["bytes=-5", "items=0-5", "bytes=9999-", "bytes=a-b"] {
            let err = parse_range(header, 100).unwrap_err();
            assert!(
                matches!(err, Error::RangeNotSatisfiable(_)),
                "{header} produced {err:?}"
            );
        }
    }

    #[test]
    fn content_type_guessing() {
        assert_eq!(guess_content_type("movie.mp4"), "video/mp4");
        assert_eq!(guess_content_type("movie.WebM"), "video/webm");
        assert_eq!(guess_content_type("movie.mkv"), "video/x-matroska");
        assert_eq!(guess_content_type("movie.avi"), "video/x-msvideo");
        assert_eq!(guess_content_type("movie.mov"), "video/quicktime");
        assert_eq!(guess_content_type("thumb.jpg"), "image/jpeg");
        assert_eq!(guess_content_type("file.xyz"), "application/octet-stream");
        assert_eq!(guess_content_type("noextension"), "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = serve_file(Path::new("/no/such/file.mp4"), None, "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn bad_range_yields_416_with_content_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();

        let resp = serve_file(&path, Some("bytes=100-200"), "video/mp4")
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            resp.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */100"
        );
    }
}
