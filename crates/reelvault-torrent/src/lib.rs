//! Magnet-link acquisition for reelvault.
//!
//! The torrent backend itself is an opaque capability behind the
//! [`TransferEngine`] / [`TransferHandle`] traits; this crate owns
//! everything around it: the per-download [`DownloadJob`] state machine and
//! the thread-safe [`DownloadManager`] registry.

pub mod engine;
pub mod job;
pub mod manager;
pub mod testing;

pub use engine::{TransferEngine, TransferHandle, TransferStatus};
pub use job::{DownloadJob, JobSnapshot, JobStatus, POLL_INTERVAL};
pub use manager::DownloadManager;
