//! # Outbound Ports
//!
//! Traits for everything chain sync depends on: storage, peers, execution
//! and the node subsystems a fork has to notify.

use crate::domain::{
    Block, BlockHeader, BlockId, BootstrapError, ExecError, Host, PeerError, ReputationError,
    RollbackLedger, StorageError,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Storage
// =============================================================================

/// Single write in an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation {
    /// Insert or overwrite.
    Put {
        /// Key
        key: String,
        /// Value
        value: Vec<u8>,
    },
    /// Remove.
    Delete {
        /// Key
        key: String,
    },
}

impl BatchOperation {
    /// Create a put operation.
    pub fn put(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a delete operation.
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }

    /// Key touched by this operation.
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// Ordered key-value store with atomic batches.
///
/// Transactions are layered on top by [`crate::storage::StoreTransaction`].
pub trait KeyValueStore: Send + Sync {
    /// Read a committed value.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// All committed entries whose key starts with `prefix`, ascending by key.
    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Apply every operation or none.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError>;
}

// =============================================================================
// Peers
// =============================================================================

/// Item delivered by a [`BlockStream`]: raw block bytes or a transport error.
pub type StreamItem = Result<Vec<u8>, PeerError>;

/// Producer half of a [`BlockStream`].
#[derive(Clone)]
pub struct BlockSender {
    tx: mpsc::Sender<StreamItem>,
    cancel: CancellationToken,
}

impl BlockSender {
    /// Deliver an item. Returns `false` once the consumer is gone or cancelled.
    pub async fn send(&self, item: StreamItem) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// True once the consumer cancelled or dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Token that fires when the consumer goes away.
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Bounded, cancellable sequence of raw block bodies.
///
/// Cancelling the token ends the sequence without an error. Dropping the
/// stream cancels the token so the producer stops promptly.
pub struct BlockStream {
    rx: mpsc::Receiver<StreamItem>,
    cancel: CancellationToken,
}

impl BlockStream {
    /// Create a stream with `capacity` buffered items, tied to `cancel`.
    pub fn channel(capacity: usize, cancel: CancellationToken) -> (BlockSender, BlockStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            BlockSender {
                tx,
                cancel: cancel.clone(),
            },
            BlockStream { rx, cancel },
        )
    }

    /// Next item, or `None` when the producer finished or the token fired.
    pub async fn next(&mut self) -> Option<StreamItem> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}

impl Drop for BlockStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Client for the block-exchange protocol.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Peer's current tip height.
    async fn get_max_block_id(&self, host: &Host) -> Result<BlockId, PeerError>;

    /// Stream of up to one window of raw blocks starting at `from`,
    /// ascending, or descending when `reverse` is set.
    async fn get_blocks_bodies(
        &self,
        host: &Host,
        from: BlockId,
        reverse: bool,
        cancel: CancellationToken,
    ) -> Result<BlockStream, PeerError>;

    /// Header of one block as the peer stores it.
    async fn get_block_info(&self, host: &Host, block_id: BlockId)
        -> Result<BlockHeader, PeerError>;
}

/// Peer reputation tracking.
pub trait PeerReputation: Send + Sync {
    /// Record that `host` served a bad block.
    fn register_bad_block(
        &self,
        host: &Host,
        block_id: BlockId,
        block_time: i64,
        reason: &str,
    ) -> Result<(), ReputationError>;

    /// Hosts from `hosts` that are not currently banned, order preserved.
    fn filter_banned(&self, hosts: &[Host]) -> Vec<Host>;
}

// =============================================================================
// Execution and node collaborators
// =============================================================================

/// Result of playing a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayOutcome {
    /// Block changed system parameters.
    pub sys_update: bool,
}

/// Applies block transactions to state, recording previous values in the ledger.
pub trait ExecutionEngine: Send + Sync {
    /// Play every transaction of `block` inside the ledger's transaction.
    fn play(&self, block: &Block, ledger: &mut RollbackLedger<'_>) -> Result<PlayOutcome, ExecError>;

    /// Drop any cached compiled state.
    fn clean_cache(&self);
}

/// Pending-transaction pool.
pub trait TransactionPool: Send + Sync {
    /// Mark every pending transaction as needing re-verification.
    fn mark_unverified(&self) -> Result<(), StorageError>;
}

/// Cached node-level system parameters.
pub trait SystemParameters: Send + Sync {
    /// Reload parameters from committed state.
    fn reload(&self, store: &dyn KeyValueStore) -> Result<(), StorageError>;
}

/// Source of block 1 for an empty chain.
pub trait BootstrapSource: Send + Sync {
    /// Raw wire bytes of the first block.
    fn first_block(&self) -> Result<Vec<u8>, BootstrapError>;
}
