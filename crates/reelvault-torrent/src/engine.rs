//! Engine-agnostic transfer interfaces.
//!
//! The concrete torrent backend (libtorrent bindings, an external daemon,
//! ...) is substituted behind these traits so the job state machine and the
//! manager can be written and tested against them.

use std::path::Path;

use async_trait::async_trait;

/// Point-in-time status of one transfer, copied out of the engine.
#[derive(Debug, Clone, Default)]
pub struct TransferStatus {
    /// Display name, once the transfer metadata is known.
    pub name: Option<String>,
    /// Fraction complete, 0.0 to 1.0.
    pub progress: f64,
    /// Current download rate in bytes/sec.
    pub download_rate: u64,
    /// Current upload rate in bytes/sec.
    pub upload_rate: u64,
    /// Total payload size in bytes, 0 until metadata is known.
    pub total_bytes: u64,
    /// Bytes already downloaded.
    pub completed_bytes: u64,
    /// Whether the transfer has everything (seeding / 100%).
    pub is_complete: bool,
}

impl TransferStatus {
    /// Bytes still outstanding.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.completed_bytes)
    }
}

/// A torrent/transfer backend capable of turning magnet URIs into running
/// transfers.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Parse a magnet URI and begin transferring its content into
    /// `download_dir`, returning a handle for polling and teardown.
    async fn add_magnet(
        &self,
        magnet_uri: &str,
        download_dir: &Path,
    ) -> reelvault_core::Result<Box<dyn TransferHandle>>;
}

/// A single running transfer.
#[async_trait]
pub trait TransferHandle: Send {
    /// Poll the current status.
    async fn status(&mut self) -> reelvault_core::Result<TransferStatus>;

    /// Stop and detach the transfer. After this returns no further network
    /// activity occurs for it. Must be safe to call after completion.
    async fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_bytes_saturates() {
        let status = TransferStatus {
            total_bytes: 100,
            completed_bytes: 250,
            ..Default::default()
        };
        assert_eq!(status.remaining_bytes(), 0);

        let status = TransferStatus {
            total_bytes: 1000,
            completed_bytes: 250,
            ..Default::default()
        };
        assert_eq!(status.remaining_bytes(), 750);
    }
}
