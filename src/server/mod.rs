//! Axum server: shared application context, router construction, and
//! route handlers.

pub mod error;
pub mod routes_downloads;
pub mod routes_stream;
pub mod routes_thumbs;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use parking_lot::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use reelvault_av::{ToolRegistry, Thumbnailer, TranscodeBackend};
use reelvault_torrent::{DownloadManager, TransferEngine};

use crate::config::Config;

/// Mutable runtime settings, read at request time.
#[derive(Debug)]
pub struct SettingsStore {
    transcode_backend: RwLock<TranscodeBackend>,
}

impl SettingsStore {
    pub fn new(backend: TranscodeBackend) -> Self {
        Self {
            transcode_backend: RwLock::new(backend),
        }
    }

    /// The backend transcoded requests should use right now.
    pub fn transcode_backend(&self) -> TranscodeBackend {
        *self.transcode_backend.read()
    }

    pub fn set_transcode_backend(&self, backend: TranscodeBackend) {
        *self.transcode_backend.write() = backend;
    }
}

/// Application context shared by all request handlers (via Axum state).
///
/// Cheaply cloneable: only `Arc`s inside.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable configuration snapshot.
    pub config: Arc<Config>,
    /// Mutable runtime settings.
    pub settings: Arc<SettingsStore>,
    /// External tool registry (ffmpeg/ffprobe).
    pub tools: Arc<ToolRegistry>,
    /// Thumbnail extractor.
    pub thumbnailer: Arc<Thumbnailer>,
    /// Download job registry.
    pub downloads: Arc<DownloadManager>,
}

impl AppContext {
    /// Build the context from config plus an optional transfer engine.
    pub fn new(config: Config, engine: Option<Arc<dyn TransferEngine>>) -> Self {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let thumbnailer = Arc::new(Thumbnailer::new(
            Arc::clone(&tools),
            config.media.thumbnail_dir.clone(),
        ));
        let downloads = Arc::new(DownloadManager::new(
            engine,
            config.downloads.temp_root.clone(),
        ));
        let settings = Arc::new(SettingsStore::new(config.transcode.backend));

        Self {
            config: Arc::new(config),
            settings,
            tools,
            thumbnailer,
            downloads,
        }
    }

    /// Where finished downloads land.
    pub fn download_dest_dir(&self) -> PathBuf {
        self.config
            .downloads
            .dest_dir
            .clone()
            .unwrap_or_else(|| self.config.media.library_dir.clone())
    }
}

/// Reject path segments that could escape the served directory.
pub(crate) fn validate_name(name: &str) -> reelvault_core::Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(reelvault_core::Error::Validation(format!(
            "invalid file name {name:?}"
        )));
    }
    Ok(())
}

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/stream/:video", get(routes_stream::stream_video))
        .route(
            "/thumbnails/:name",
            get(routes_thumbs::get_thumbnail).post(routes_thumbs::regenerate_thumbnail),
        )
        .route(
            "/downloads",
            get(routes_downloads::list_downloads).post(routes_downloads::start_download),
        )
        .route(
            "/downloads/:id",
            delete(routes_downloads::delete_download),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx)
}

/// Bind and serve until the process is stopped.
pub async fn serve(ctx: AppContext, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("movie.mp4").is_ok());
        assert!(validate_name("My Movie (2024).mkv").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("a/b.mp4").is_err());
        assert!(validate_name("a\\b.mp4").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[test]
    fn settings_store_round_trip() {
        let store = SettingsStore::new(TranscodeBackend::Cpu);
        assert_eq!(store.transcode_backend(), TranscodeBackend::Cpu);
        store.set_transcode_backend(TranscodeBackend::Nvidia);
        assert_eq!(store.transcode_backend(), TranscodeBackend::Nvidia);
    }

    #[test]
    fn dest_dir_defaults_to_library() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.media.library_dir = dir.path().join("media");
        config.downloads.temp_root = dir.path().join("torrents");
        let ctx = AppContext::new(config, None);
        assert_eq!(ctx.download_dest_dir(), ctx.config.media.library_dir);

        let mut config = Config::default();
        config.downloads.temp_root = dir.path().join("torrents");
        config.downloads.dest_dir = Some(dir.path().join("elsewhere"));
        let ctx = AppContext::new(config, None);
        assert_eq!(ctx.download_dest_dir(), dir.path().join("elsewhere"));
    }
}
