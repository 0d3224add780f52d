//! External A/V tooling for reelvault.
//!
//! Wraps the ffmpeg/ffprobe CLI tools behind a small API: discovery
//! ([`ToolRegistry`]), one-shot execution ([`ToolCommand`]), media probing
//! ([`FfprobeProber`]), live transcoding ([`TranscodeSpec`] /
//! [`TranscodeChild`]), and thumbnail extraction ([`Thumbnailer`]).

pub mod command;
pub mod probe;
pub mod thumbnail;
pub mod tools;
pub mod transcode;

pub use command::{ToolCommand, ToolOutput};
pub use probe::{FfprobeProber, MediaProbe};
pub use thumbnail::Thumbnailer;
pub use tools::{ToolInfo, ToolOverrides, ToolRegistry};
pub use transcode::{TranscodeBackend, TranscodeChild, TranscodeSpec};
