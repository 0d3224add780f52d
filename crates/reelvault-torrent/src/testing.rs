//! Scriptable in-memory [`TransferEngine`] for tests.
//!
//! Lets the job state machine and the HTTP layer be exercised without a
//! real torrent backend: the fake serves a fixed sequence of statuses and
//! materializes files into the download directory when it reports
//! completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{TransferEngine, TransferHandle, TransferStatus};

/// A fake transfer engine.
pub struct FakeEngine {
    script: Vec<TransferStatus>,
    files_on_complete: Vec<(String, Vec<u8>)>,
    fail_add: bool,
    stopped: Arc<AtomicBool>,
}

impl FakeEngine {
    /// An engine whose transfers report completion on the first poll and
    /// materialize the given `(relative path, contents)` files.
    pub fn completing(files: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            script: vec![TransferStatus {
                name: Some("fake-transfer".into()),
                progress: 1.0,
                is_complete: true,
                ..Default::default()
            }],
            files_on_complete: files,
            fail_add: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An engine whose transfers never complete (progress stuck halfway).
    pub fn endless() -> Self {
        Self {
            script: vec![TransferStatus {
                name: Some("fake-transfer".into()),
                progress: 0.5,
                download_rate: 1024,
                total_bytes: 2048,
                completed_bytes: 1024,
                ..Default::default()
            }],
            files_on_complete: Vec::new(),
            fail_add: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// An engine that refuses every magnet.
    pub fn failing() -> Self {
        Self {
            script: Vec::new(),
            files_on_complete: Vec::new(),
            fail_add: true,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve the given statuses in order (the last repeats), materializing
    /// `files` once a complete status is served.
    pub fn with_script(script: Vec<TransferStatus>, files: Vec<(String, Vec<u8>)>) -> Self {
        Self {
            script,
            files_on_complete: files,
            fail_add: false,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once any handle from this engine has been stopped.
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

#[async_trait]
impl TransferEngine for FakeEngine {
    async fn add_magnet(
        &self,
        _magnet_uri: &str,
        download_dir: &Path,
    ) -> reelvault_core::Result<Box<dyn TransferHandle>> {
        if self.fail_add {
            return Err(reelvault_core::Error::Internal(
                "fake engine refused the magnet".into(),
            ));
        }
        Ok(Box::new(FakeHandle {
            script: self.script.clone(),
            pos: 0,
            download_dir: download_dir.to_path_buf(),
            files: self.files_on_complete.clone(),
            wrote_files: false,
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

struct FakeHandle {
    script: Vec<TransferStatus>,
    pos: usize,
    download_dir: PathBuf,
    files: Vec<(String, Vec<u8>)>,
    wrote_files: bool,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl TransferHandle for FakeHandle {
    async fn status(&mut self) -> reelvault_core::Result<TransferStatus> {
        let status = self
            .script
            .get(self.pos)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or_default();
        if self.pos + 1 < self.script.len() {
            self.pos += 1;
        }

        if status.is_complete && !self.wrote_files {
            self.wrote_files = true;
            for (rel, contents) in &self.files {
                let path = self.download_dir.join(rel);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, contents)?;
            }
        }

        Ok(status)
    }

    async fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
