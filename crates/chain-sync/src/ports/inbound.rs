//! # Inbound Ports
//!
//! What the rest of the node can ask of the sync engine.

use crate::domain::{BlockId, InfoBlock, SyncError};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Result of a completed update pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Tip before the pass.
    pub start_tip: BlockId,
    /// Tip after the pass.
    pub end_tip: BlockId,
    /// Blocks applied through the normal path.
    pub blocks_applied: usize,
    /// Forks repaired along the way.
    pub forks_resolved: usize,
}

/// Outcome of one sync trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another pass was in progress; nothing was done.
    AlreadyRunning,
    /// Local tip already matches the best peer.
    UpToDate {
        /// Local tip
        tip: BlockId,
    },
    /// Empty chain was seeded from the bootstrap source.
    FirstLoad {
        /// Tip after loading
        tip: BlockId,
    },
    /// Blocks were fetched and applied.
    Updated(UpdateReport),
}

/// Chain synchronization API.
#[async_trait]
pub trait ChainSyncApi: Send + Sync {
    /// Run one sync pass unless one is already running.
    async fn sync(&self, cancel: &CancellationToken) -> Result<SyncOutcome, SyncError>;

    /// Committed local tip.
    fn local_tip(&self) -> Result<InfoBlock, SyncError>;

    /// Whether a pass is in progress.
    fn is_syncing(&self) -> bool;
}
