//! Application configuration.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries
//! all sub-configs for the server, media directories, external tools,
//! transcoding, and downloads. Every section defaults sensibly so a
//! completely empty `{}` file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reelvault_av::{ToolOverrides, TranscodeBackend};
use reelvault_core::{Error, Result};

/// Extensions kept by default when a download finishes.
pub const DEFAULT_VIDEO_EXTS: &[&str] = &["mp4", "mkv", "webm", "avi", "mov", "flv", "wmv"];

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media: MediaConfig,
    pub tools: ToolOverrides,
    pub transcode: TranscodeConfig,
    pub downloads: DownloadsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            media: MediaConfig::default(),
            tools: ToolOverrides::default(),
            transcode: TranscodeConfig::default(),
            downloads: DownloadsConfig::default(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Where media and generated thumbnails live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Directory video files are served from.
    pub library_dir: PathBuf,
    /// Directory generated thumbnails are written to and served from.
    pub thumbnail_dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            library_dir: PathBuf::from("media"),
            thumbnail_dir: PathBuf::from("thumbnails"),
        }
    }
}

/// Live transcoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Hardware encoder backend; resolved per request.
    pub backend: TranscodeBackend,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            backend: TranscodeBackend::Cpu,
        }
    }
}

/// Torrent download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Root under which each job gets its own temp directory.
    pub temp_root: PathBuf,
    /// Where finished files land. Defaults to the media library dir.
    pub dest_dir: Option<PathBuf>,
    /// Extension allow-list applied when a request does not supply one.
    pub default_extensions: Vec<String>,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            temp_root: PathBuf::from("torrents"),
            dest_dir: None,
            default_extensions: DEFAULT_VIDEO_EXTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }
        if !self.media.library_dir.is_dir() {
            warnings.push(format!(
                "media.library_dir {} does not exist; streaming will 404",
                self.media.library_dir.display()
            ));
        }
        if self.downloads.default_extensions.is_empty() {
            warnings.push(
                "downloads.default_extensions is empty; finished downloads will keep no files"
                    .into(),
            );
        }

        warnings
    }
}
