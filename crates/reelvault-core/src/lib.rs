//! Core types shared by every reelvault crate: the unified error type and
//! typed identifiers.

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::JobId;
