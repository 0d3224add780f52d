//! Unified error type for the reelvault application.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for HTTP handlers to derive a status code via
//! [`Error::http_status`].

use std::fmt;

/// Unified error type covering all failure modes in reelvault.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "video", "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A byte-range request was malformed or outside the resource.
    #[error("range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external tool (ffmpeg, ffprobe) failed to run or returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The torrent transfer engine is not available on this host.
    #[error("Transfer engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::RangeNotSatisfiable(_) => 416,
            Error::Validation(_) => 400,
            Error::Tool { .. } => 502,
            Error::EngineUnavailable(_) => 503,
            Error::Probe(_) => 422,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::RangeNotSatisfiable`].
    pub fn bad_range(detail: impl Into<String>) -> Self {
        Error::RangeNotSatisfiable(detail.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
