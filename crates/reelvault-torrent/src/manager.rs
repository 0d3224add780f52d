//! Thread-safe registry of active download jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use reelvault_core::JobId;

use crate::engine::TransferEngine;
use crate::job::{DownloadJob, JobSnapshot, Registry};

/// How long [`DownloadManager::delete`] waits for a cancelled worker to
/// acknowledge before force-cleaning anyway.
const DELETE_ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// In-memory manager for [`DownloadJob`]s.
///
/// Jobs remove themselves from the registry when their worker reaches a
/// terminal state; `delete` removes them eagerly. The registry lock is held
/// only for map access, never across blocking work.
pub struct DownloadManager {
    engine: Option<Arc<dyn TransferEngine>>,
    temp_root: PathBuf,
    jobs: Arc<Registry>,
}

impl DownloadManager {
    /// Create a manager allocating per-job temp directories under
    /// `temp_root`. `engine` is `None` when no torrent backend is available
    /// on this host; jobs can still be constructed but error immediately,
    /// and callers should gate on [`has_engine`](Self::has_engine).
    pub fn new(engine: Option<Arc<dyn TransferEngine>>, temp_root: PathBuf) -> Self {
        if let Err(e) = std::fs::create_dir_all(&temp_root) {
            tracing::warn!(
                dir = %temp_root.display(),
                error = %e,
                "cannot create download temp root"
            );
        }
        Self {
            engine,
            temp_root,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether a transfer engine is configured.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Register and start a new job. Returns immediately; the download
    /// proceeds on the job's own worker task.
    pub fn add(
        &self,
        magnet_uri: String,
        dest_dir: PathBuf,
        allowed_exts: Vec<String>,
    ) -> JobId {
        let id = JobId::new();
        let temp_dir = self.temp_root.join(id.as_uuid().simple().to_string());

        let job = DownloadJob::new(
            id,
            magnet_uri,
            dest_dir,
            temp_dir,
            allowed_exts,
            self.engine.clone(),
            Arc::downgrade(&self.jobs),
        );

        self.jobs.lock().insert(id, Arc::clone(&job));
        job.start();
        tracing::info!(%id, "download job registered");
        id
    }

    /// Point-in-time snapshots of every registered job.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let jobs: Vec<Arc<DownloadJob>> = self.jobs.lock().values().cloned().collect();
        jobs.iter().map(|j| j.snapshot()).collect()
    }

    /// Cancel and remove a job. Returns whether it existed. Files already
    /// moved into the destination directory are never touched.
    pub async fn delete(&self, id: JobId) -> bool {
        let job = self.jobs.lock().remove(&id);
        let Some(job) = job else {
            return false;
        };

        job.cancel();
        if !job.wait_terminal(DELETE_ACK_TIMEOUT).await {
            tracing::warn!(%id, "job did not acknowledge cancellation in time");
        }
        job.force_cleanup();
        tracing::info!(%id, "download job deleted");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;

    fn manager_with(engine: Option<Arc<dyn TransferEngine>>, root: &std::path::Path) -> DownloadManager {
        DownloadManager::new(engine, root.join("tmp"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_adds_produce_distinct_ids_and_temp_dirs() {
        let root = tempfile::tempdir().unwrap();
        let manager = Arc::new(manager_with(
            Some(Arc::new(FakeEngine::endless())),
            root.path(),
        ));
        let dest = root.path().join("dest");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            let dest = dest.clone();
            handles.push(tokio::spawn(async move {
                manager.add("magnet:?xt=urn:btih:feed".into(), dest, vec!["mp4".into()])
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }

        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 8);

        let snapshots = manager.list();
        assert_eq!(snapshots.len(), 8);

        // Tear down so the workers stop.
        for id in ids {
            assert!(manager.delete(id).await);
        }
        assert!(manager.list().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_unknown_id_is_false_and_leaves_registry_alone() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with(Some(Arc::new(FakeEngine::endless())), root.path());
        let id = manager.add(
            "magnet:?xt=urn:btih:feed".into(),
            root.path().join("dest"),
            vec!["mp4".into()],
        );

        assert!(!manager.delete(JobId::new()).await);
        assert_eq!(manager.list().len(), 1);

        assert!(manager.delete(id).await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_spares_already_moved_files() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("dest");
        let manager = manager_with(
            Some(Arc::new(FakeEngine::completing(vec![(
                "clip.mp4".into(),
                b"payload".to_vec(),
            )]))),
            root.path(),
        );

        let id = manager.add("magnet:?xt=urn:btih:feed".into(), dest.clone(), vec!["mp4".into()]);

        // Wait for the job to complete and self-reap.
        for _ in 0..100 {
            if manager.list().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(manager.list().is_empty(), "job should self-reap on completion");
        assert!(dest.join("clip.mp4").exists());

        // Deleting after the fact reports absence and leaves the file.
        assert!(!manager.delete(id).await);
        assert!(dest.join("clip.mp4").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_cancels_running_job_and_cleans_temp() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with(Some(Arc::new(FakeEngine::endless())), root.path());
        let id = manager.add(
            "magnet:?xt=urn:btih:feed".into(),
            root.path().join("dest"),
            vec!["mp4".into()],
        );

        // Give the worker time to create its temp dir.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let temp_dir = root.path().join("tmp").join(id.as_uuid().simple().to_string());
        assert!(temp_dir.exists());

        assert!(manager.delete(id).await);
        assert!(!temp_dir.exists());
        assert!(manager.list().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn engineless_manager_reports_and_jobs_error_out() {
        let root = tempfile::tempdir().unwrap();
        let manager = manager_with(None, root.path());
        assert!(!manager.has_engine());

        let id = manager.add(
            "magnet:?xt=urn:btih:feed".into(),
            root.path().join("dest"),
            vec!["mp4".into()],
        );

        // The job errors immediately and reaps itself.
        for _ in 0..100 {
            if manager.list().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(manager.list().is_empty());
        let _ = id;
    }
}
