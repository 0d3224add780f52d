//! Streaming responses: raw range-based file serving and live transcoding.

pub mod range;
pub mod transcode;
