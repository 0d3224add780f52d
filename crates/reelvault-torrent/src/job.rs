//! One magnet-to-files download job.
//!
//! A [`DownloadJob`] downloads into its own temp directory, and once the
//! transfer completes, moves the allow-listed files into the destination
//! directory and deletes everything else. It runs on a dedicated worker
//! task and notifies the owning registry when it reaches a terminal state.
//!
//! State machine:
//! `queued -> downloading -> {processing -> completed} | cancelled | error`.
//! The three right-hand states are terminal; nothing transitions out of
//! them and no field changes after one is reached.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use reelvault_core::JobId;

use crate::engine::{TransferEngine, TransferHandle, TransferStatus};

/// How often the worker polls the underlying transfer. Cancellation is
/// observed within one interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Job registry map shared between the manager and the jobs' workers.
/// Jobs hold a `Weak` to it so they can reap themselves on reaching a
/// terminal state.
pub type Registry = Mutex<HashMap<JobId, Arc<DownloadJob>>>;

/// Lifecycle state of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Processing,
    Completed,
    Cancelled,
    Error,
}

impl JobStatus {
    /// Whether no further transitions can occur.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Error
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Copy-out view of a job for status polling. Never aliases job-internal
/// mutable state.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub magnet_uri: String,
    pub name: String,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Fraction complete, 0.0 to 1.0.
    pub progress: f64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub elapsed_seconds: f64,
    pub eta_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
}

/// Fields written only by the job's own worker; read elsewhere via
/// [`DownloadJob::snapshot`].
#[derive(Debug)]
struct JobState {
    name: String,
    status: JobStatus,
    error: Option<String>,
    progress: f64,
    download_rate: u64,
    upload_rate: u64,
    elapsed_seconds: f64,
    eta_seconds: Option<f64>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

/// A single torrent download job.
pub struct DownloadJob {
    id: JobId,
    magnet_uri: String,
    dest_dir: PathBuf,
    temp_dir: PathBuf,
    allowed_exts: HashSet<String>,
    engine: Option<Arc<dyn TransferEngine>>,
    registry: Weak<Registry>,
    created_at: DateTime<Utc>,
    state: RwLock<JobState>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

impl DownloadJob {
    /// Construct a job. Extensions are normalized: lowercased, trimmed,
    /// leading dot stripped, empties dropped.
    pub fn new(
        id: JobId,
        magnet_uri: String,
        dest_dir: PathBuf,
        temp_dir: PathBuf,
        allowed_exts: impl IntoIterator<Item = String>,
        engine: Option<Arc<dyn TransferEngine>>,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        let allowed_exts = allowed_exts
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Arc::new(Self {
            id,
            magnet_uri,
            dest_dir,
            temp_dir,
            allowed_exts,
            engine,
            registry,
            created_at: Utc::now(),
            state: RwLock::new(JobState {
                name: String::new(),
                status: JobStatus::Queued,
                error: None,
                progress: 0.0,
                download_rate: 0,
                upload_rate: 0,
                elapsed_seconds: 0.0,
                eta_seconds: None,
                started_at: None,
                completed_at: None,
            }),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Begin the background worker: `queued -> downloading`.
    pub fn start(self: &Arc<Self>) {
        let job = Arc::clone(self);
        tokio::spawn(job.run());
    }

    /// Request cancellation. Idempotent; observed by the worker within one
    /// poll interval.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker to reach a terminal state, up to `timeout`.
    /// Returns whether it did.
    pub async fn wait_terminal(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.finished.cancelled())
            .await
            .is_ok()
    }

    /// Best-effort removal of the temp directory regardless of state. Used
    /// when the job is deleted externally.
    pub fn force_cleanup(&self) {
        self.cleanup_temp();
    }

    /// Copy out the current state.
    pub fn snapshot(&self) -> JobSnapshot {
        let st = self.state.read();
        JobSnapshot {
            id: self.id,
            magnet_uri: self.magnet_uri.clone(),
            name: st.name.clone(),
            status: st.status,
            error: st.error.clone(),
            progress: st.progress,
            download_rate: st.download_rate,
            upload_rate: st.upload_rate,
            elapsed_seconds: st.elapsed_seconds,
            eta_seconds: st.eta_seconds,
            created_at: self.created_at,
            started_at: st.started_at,
            completed_at: st.completed_at,
            cancel_requested: self.cancel.is_cancelled(),
        }
    }

    // ------------------------------------------------------------------
    // Worker
    // ------------------------------------------------------------------

    async fn run(self: Arc<Self>) {
        if let Err(e) = self.drive().await {
            self.fail(e.to_string());
            self.cleanup_temp();
        }
        self.finished.cancel();
        self.notify_finished();
    }

    async fn drive(&self) -> reelvault_core::Result<()> {
        let Some(engine) = self.engine.clone() else {
            return Err(reelvault_core::Error::EngineUnavailable(
                "no transfer engine is configured".into(),
            ));
        };

        tokio::fs::create_dir_all(&self.temp_dir).await?;
        self.set_downloading();
        let started = Instant::now();

        let mut handle = engine.add_magnet(&self.magnet_uri, &self.temp_dir).await?;
        let poll_result = self.poll_until_done(&mut *handle, started).await;
        // Stop unconditionally so no further network activity occurs,
        // whatever ended the loop.
        handle.stop().await;
        poll_result?;

        if self.cancel.is_cancelled() {
            tracing::info!(id = %self.id, "download cancelled");
            self.set_cancelled();
            self.cleanup_temp();
            return Ok(());
        }

        self.set_processing();
        self.relocate_files().await?;
        self.cleanup_temp();
        self.set_completed();
        tracing::info!(id = %self.id, dest = %self.dest_dir.display(), "download completed");
        Ok(())
    }

    async fn poll_until_done(
        &self,
        handle: &mut dyn TransferHandle,
        started: Instant,
    ) -> reelvault_core::Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let status = handle.status().await?;
            self.record_progress(&status, started.elapsed());
            if status.is_complete {
                return Ok(());
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
    }

    fn record_progress(&self, status: &TransferStatus, elapsed: Duration) {
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        if st.name.is_empty() {
            if let Some(name) = &status.name {
                st.name = name.clone();
            }
        }
        st.progress = status.progress;
        st.download_rate = status.download_rate;
        st.upload_rate = status.upload_rate;
        st.elapsed_seconds = elapsed.as_secs_f64();

        let remaining = status.remaining_bytes();
        st.eta_seconds = if status.download_rate > 0 && remaining > 0 {
            Some(remaining as f64 / status.download_rate as f64)
        } else {
            None
        };
    }

    // ------------------------------------------------------------------
    // File relocation
    // ------------------------------------------------------------------

    /// Move allow-listed files into `dest_dir` and delete everything else.
    async fn relocate_files(&self) -> reelvault_core::Result<()> {
        let temp = self.temp_dir.clone();
        let dest = self.dest_dir.clone();
        let exts = self.allowed_exts.clone();
        tokio::task::spawn_blocking(move || relocate(&temp, &dest, &exts))
            .await
            .map_err(|e| {
                reelvault_core::Error::Internal(format!("file relocation task failed: {e}"))
            })?
    }

    fn cleanup_temp(&self) {
        if self.temp_dir.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&self.temp_dir) {
                tracing::warn!(
                    id = %self.id,
                    dir = %self.temp_dir.display(),
                    error = %e,
                    "temp directory removal failed"
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // State transitions -- all guarded so terminal states absorb.
    // ------------------------------------------------------------------

    fn set_downloading(&self) {
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        st.status = JobStatus::Downloading;
        st.started_at = Some(Utc::now());
    }

    fn set_processing(&self) {
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        st.status = JobStatus::Processing;
    }

    fn set_completed(&self) {
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        st.status = JobStatus::Completed;
        st.progress = 1.0;
        st.completed_at = Some(Utc::now());
    }

    fn set_cancelled(&self) {
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        st.status = JobStatus::Cancelled;
    }

    fn fail(&self, message: String) {
        tracing::warn!(id = %self.id, error = %message, "download job failed");
        let mut st = self.state.write();
        if st.status.is_terminal() {
            return;
        }
        st.status = JobStatus::Error;
        st.error = Some(message);
    }

    /// Tell the registry this job is done so it can be dropped from the
    /// list. A no-op if the job was already deleted manually.
    fn notify_finished(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.id);
        }
    }
}

/// Walk `temp`, moving allow-listed files into `dest` (renaming on
/// collision) and deleting everything else.
fn relocate(
    temp: &Path,
    dest: &Path,
    allowed_exts: &HashSet<String>,
) -> reelvault_core::Result<()> {
    std::fs::create_dir_all(dest)?;

    for entry in WalkDir::new(temp).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let keep = ext.as_deref().is_some_and(|e| allowed_exts.contains(e));
        if keep {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let target = collision_free_path(dest, &file_name);
            move_file(path, &target)?;
        } else if let Err(e) = std::fs::remove_file(path) {
            // Leftover stray files are tolerable; the temp sweep gets them.
            tracing::warn!(path = %path.display(), error = %e, "stray file removal failed");
        }
    }

    Ok(())
}

/// First non-existing path for `file_name` under `dest`, appending `_1`,
/// `_2`, ... before the extension on collision.
fn collision_free_path(dest: &Path, file_name: &str) -> PathBuf {
    let candidate = dest.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };

    let mut counter = 1;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dest.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to copy+remove for cross-device moves.
fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(from, to)?;
            std::fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    fn job_with_engine(
        engine: Option<Arc<dyn TransferEngine>>,
        dest: &Path,
        temp: &Path,
        exts: &[&str],
    ) -> Arc<DownloadJob> {
        DownloadJob::new(
            JobId::new(),
            "magnet:?xt=urn:btih:deadbeef".into(),
            dest.to_path_buf(),
            temp.to_path_buf(),
            exts.iter().map(|e| e.to_string()),
            engine,
            Weak::new(),
        )
    }

    async fn run_to_terminal(job: &Arc<DownloadJob>) {
        job.start();
        assert!(
            job.wait_terminal(Duration::from_secs(5)).await,
            "job did not reach a terminal state in time"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_engine_errors_immediately() {
        let root = tempfile::tempdir().unwrap();
        let job = job_with_engine(
            None,
            &root.path().join("dest"),
            &root.path().join("tmp"),
            &["mp4"],
        );
        run_to_terminal(&job).await;

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Error);
        assert!(snap.error.unwrap().contains("engine"));
        assert!(!root.path().join("tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completion_moves_allowed_files_and_deletes_the_rest() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");
        let temp = root.path().join("tmp");

        let engine = FakeEngine::completing(vec![
            ("clip.mp4".into(), b"video-bytes".to_vec()),
            ("Sample/CLIP.MKV".into(), b"more-video".to_vec()),
            ("readme.txt".into(), b"junk".to_vec()),
        ]);
        let job = job_with_engine(Some(Arc::new(engine)), &dest, &temp, &["mp4", "mkv"]);
        run_to_terminal(&job).await;

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.progress, 1.0);
        assert!(snap.completed_at.is_some());

        assert_eq!(
            std::fs::read(dest.join("clip.mp4")).unwrap(),
            b"video-bytes"
        );
        // Extension matching is case-insensitive.
        assert_eq!(std::fs::read(dest.join("CLIP.MKV")).unwrap(), b"more-video");
        assert!(!dest.join("readme.txt").exists());
        assert!(!temp.exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn name_collisions_get_numeric_suffixes() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("clip.mp4"), b"existing").unwrap();
        std::fs::write(dest.join("clip_1.mp4"), b"also existing").unwrap();

        let engine = FakeEngine::completing(vec![("clip.mp4".into(), b"new".to_vec())]);
        let job = job_with_engine(
            Some(Arc::new(engine)),
            &dest,
            &root.path().join("tmp"),
            &["mp4"],
        );
        run_to_terminal(&job).await;

        assert_eq!(job.snapshot().status, JobStatus::Completed);
        // First free integer wins; existing files are untouched.
        assert_eq!(std::fs::read(dest.join("clip.mp4")).unwrap(), b"existing");
        assert_eq!(
            std::fs::read(dest.join("clip_1.mp4")).unwrap(),
            b"also existing"
        );
        assert_eq!(std::fs::read(dest.join("clip_2.mp4")).unwrap(), b"new");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_before_completion_yields_cancelled() {
        let root = tempfile::tempdir().unwrap();
        let engine = FakeEngine::endless();
        let stopped = engine.stopped_flag();
        let job = job_with_engine(
            Some(Arc::new(engine)),
            &root.path().join("dest"),
            &root.path().join("tmp"),
            &["mp4"],
        );
        job.start();

        // Let the worker get into the poll loop, then cancel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        job.cancel();
        job.cancel(); // idempotent
        assert!(job.wait_terminal(Duration::from_secs(5)).await);

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Cancelled);
        assert!(snap.cancel_requested);
        assert!(!root.path().join("tmp").exists());
        // The transfer was stopped, not abandoned.
        assert!(stopped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn terminal_state_absorbs_later_transitions() {
        let root = tempfile::tempdir().unwrap();
        let engine = FakeEngine::completing(vec![("clip.mp4".into(), b"x".to_vec())]);
        let job = job_with_engine(
            Some(Arc::new(engine)),
            &root.path().join("dest"),
            &root.path().join("tmp"),
            &["mp4"],
        );
        run_to_terminal(&job).await;
        assert_eq!(job.snapshot().status, JobStatus::Completed);

        // A late cancel must not move the job out of completed.
        job.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Completed);
        assert!(snap.error.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engine_refusal_becomes_job_error() {
        let root = tempfile::tempdir().unwrap();
        let engine = FakeEngine::failing();
        let job = job_with_engine(
            Some(Arc::new(engine)),
            &root.path().join("dest"),
            &root.path().join("tmp"),
            &["mp4"],
        );
        run_to_terminal(&job).await;

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Error);
        assert!(snap.error.is_some());
        assert!(!root.path().join("tmp").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn progress_fields_update_while_downloading() {
        let root = tempfile::tempdir().unwrap();
        let engine = FakeEngine::with_script(
            vec![TransferStatus {
                name: Some("Big.Movie.2024".into()),
                progress: 0.25,
                download_rate: 1_000_000,
                upload_rate: 50_000,
                total_bytes: 4_000_000_000,
                completed_bytes: 1_000_000_000,
                is_complete: false,
            }],
            vec![],
        );
        let job = job_with_engine(
            Some(Arc::new(engine)),
            &root.path().join("dest"),
            &root.path().join("tmp"),
            &["mp4"],
        );
        job.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let snap = job.snapshot();
        assert_eq!(snap.status, JobStatus::Downloading);
        assert_eq!(snap.name, "Big.Movie.2024");
        assert_eq!(snap.progress, 0.25);
        assert_eq!(snap.download_rate, 1_000_000);
        // 3 GB remaining at 1 MB/s.
        assert_eq!(snap.eta_seconds, Some(3000.0));
        assert!(snap.started_at.is_some());

        job.cancel();
        assert!(job.wait_terminal(Duration::from_secs(5)).await);
    }

    #[test]
    fn extension_normalization() {
        let job = DownloadJob::new(
            JobId::new(),
            "magnet:?".into(),
            PathBuf::from("/dest"),
            PathBuf::from("/tmp/x"),
            vec![".MP4".to_string(), " mkv ".to_string(), "".to_string()],
            None,
            Weak::new(),
        );
        assert!(job.allowed_exts.contains("mp4"));
        assert!(job.allowed_exts.contains("mkv"));
        assert_eq!(job.allowed_exts.len(), 2);
    }

    #[test]
    fn collision_paths_pick_first_free_integer() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            collision_free_path(dir.path(), "clip.mp4"),
            dir.path().join("clip.mp4")
        );
        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        assert_eq!(
            collision_free_path(dir.path(), "clip.mp4"),
            dir.path().join("clip_1.mp4")
        );
        std::fs::write(dir.path().join("clip_1.mp4"), b"x").unwrap();
        assert_eq!(
            collision_free_path(dir.path(), "clip.mp4"),
            dir.path().join("clip_2.mp4")
        );
        // No extension.
        std::fs::write(dir.path().join("notes"), b"x").unwrap();
        assert_eq!(
            collision_free_path(dir.path(), "notes"),
            dir.path().join("notes_1")
        );
    }
}
