//! Download job routes: start, poll, delete.

use axum::extract::{Path, State};
use axum::Json;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use reelvault_core::JobId;
use reelvault_torrent::{JobSnapshot, JobStatus};

use crate::server::error::AppError;
use crate::server::AppContext;

#[derive(Debug, Deserialize)]
pub struct StartDownloadRequest {
    pub magnet_uri: String,
    /// Comma-separated extension allow-list; the configured default set
    /// applies when absent.
    #[serde(default)]
    pub extensions: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartDownloadResponse {
    pub id: JobId,
}

/// POST /downloads
///
/// Fire-and-forget job creation: returns as soon as the job is registered,
/// while the download proceeds on its own worker.
pub async fn start_download(
    State(ctx): State<AppContext>,
    Json(req): Json<StartDownloadRequest>,
) -> Result<Json<StartDownloadResponse>, AppError> {
    if !ctx.downloads.has_engine() {
        return Err(reelvault_core::Error::EngineUnavailable(
            "torrent support is not available on this server".into(),
        )
        .into());
    }

    let magnet = req.magnet_uri.trim();
    if magnet.is_empty() {
        return Err(reelvault_core::Error::Validation("magnet_uri is required".into()).into());
    }

    let extensions = match req.extensions.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw
            .split(',')
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect(),
        _ => ctx.config.downloads.default_extensions.clone(),
    };

    let id = ctx
        .downloads
        .add(magnet.to_string(), ctx.download_dest_dir(), extensions);

    Ok(Json(StartDownloadResponse { id }))
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub magnet: String,
    pub name: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Percentage with one decimal.
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub elapsed_seconds: u64,
    pub eta_seconds: Option<u64>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<JobSnapshot> for JobResponse {
    fn from(snap: JobSnapshot) -> Self {
        let iso = |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self {
            id: snap.id.to_string(),
            magnet: snap.magnet_uri,
            name: snap.name,
            status: snap.status,
            error: snap.error,
            progress: (snap.progress * 1000.0).round() / 10.0,
            download_rate: snap.download_rate,
            upload_rate: snap.upload_rate,
            elapsed_seconds: snap.elapsed_seconds as u64,
            eta_seconds: snap.eta_seconds.map(|e| e as u64),
            created_at: iso(snap.created_at),
            started_at: snap.started_at.map(iso),
            completed_at: snap.completed_at.map(iso),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadsResponse {
    pub jobs: Vec<JobResponse>,
}

/// GET /downloads
///
/// Point-in-time snapshots of every registered job, for UI polling.
pub async fn list_downloads(State(ctx): State<AppContext>) -> Json<DownloadsResponse> {
    let jobs = ctx
        .downloads
        .list()
        .into_iter()
        .map(JobResponse::from)
        .collect();
    Json(DownloadsResponse { jobs })
}

#[derive(Debug, Serialize)]
pub struct DeleteDownloadResponse {
    pub success: bool,
}

/// DELETE /downloads/:id
///
/// Cancels the job if still running, cleans its temp data, and removes it
/// from the list. Files already moved into the destination directory are
/// untouched.
pub async fn delete_download(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Json<DeleteDownloadResponse> {
    let success = match id.parse::<JobId>() {
        Ok(id) => ctx.downloads.delete(id).await,
        Err(_) => false,
    };
    Json(DeleteDownloadResponse { success })
}
