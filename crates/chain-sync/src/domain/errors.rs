//! # Domain Errors
//!
//! Error types for chain synchronization.
//!
//! Each component owns a narrow error type describing its own failure modes;
//! all of them fold into [`SyncError`], which is what the coordinator sees.
//!
//! | Class | Variants | Policy |
//! |-------|----------|--------|
//! | Peer availability | `PeerUnavailable` | Retried on the next trigger |
//! | Block validation | `MalformedBlock`, `InvalidSignature`, `BlockIdMismatch`, `UnknownProducer`, `RollbacksHashMismatch` | Abort the window, report the peer |
//! | Fork repair | `ResolutionFailed`, `NoCommonAncestor` | Abort the resolution transaction |
//! | Storage | `Storage`, `Ledger` | Abort the enclosing transaction, propagate |
//! | Cancellation | `Cancelled` | Not retried, never reported |

use super::block::BlockId;
use thiserror::Error;

/// Block decoding failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Truncated, oversized or otherwise undecodable block bytes.
    #[error("Malformed block: {0}")]
    MalformedBlock(String),
}

/// Producer signature failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature does not verify over the canonical signing payload.
    #[error("Invalid signature for block {block_id}")]
    InvalidSignature {
        /// Block whose signature failed
        block_id: BlockId,
    },
}

/// Header linkage failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkageError {
    /// Block id is not the one the caller expected next.
    #[error("Block id mismatch: expected {expected}, got {actual}")]
    BlockIdMismatch {
        /// Expected block id
        expected: BlockId,
        /// Block id found in the header
        actual: BlockId,
    },

    /// No public key is registered for the producer position.
    #[error("Unknown producer at position {position}")]
    UnknownProducer {
        /// Producer position from the header
        position: i64,
    },
}

/// Key-value storage failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading a key failed.
    #[error("Storage read failed for {key}: {message}")]
    Read {
        /// Key being read
        key: String,
        /// Backend message
        message: String,
    },

    /// Writing or deleting a key failed.
    #[error("Storage write failed for {key}: {message}")]
    Write {
        /// Key being written
        key: String,
        /// Backend message
        message: String,
    },

    /// Transaction commit failed; nothing was applied.
    #[error("Transaction commit failed: {0}")]
    Commit(String),

    /// Stored bytes could not be decoded.
    #[error("Corrupted record {key}: {message}")]
    Corrupted {
        /// Key holding the bad record
        key: String,
        /// Decoder message
        message: String,
    },
}

/// Rollback ledger failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Recording a previous value failed; the block counter was not advanced.
    #[error("Failed to save rollback state for block {block_id}: {source}")]
    Write {
        /// Block being played
        block_id: BlockId,
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },

    /// Restoring recorded state failed.
    #[error("Failed to roll back block {block_id}: {source}")]
    Rollback {
        /// Block being rolled back
        block_id: BlockId,
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },

    /// Reading current state failed.
    #[error("Failed to read state: {source}")]
    Read {
        /// Underlying storage failure
        #[source]
        source: StorageError,
    },

    /// Registry name cannot be encoded into a storage key.
    #[error("Invalid registry name {name:?}")]
    InvalidRegistry {
        /// Rejected name
        name: String,
    },

    /// Registry value is not valid UTF-8.
    #[error("Registry value at {key} is not valid UTF-8")]
    InvalidValue {
        /// Registry storage key
        key: String,
    },
}

/// Peer networking failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerError {
    /// No candidate answered the tip query.
    #[error("All nodes unavailable")]
    NodesUnavailable,

    /// Connection could not be established.
    #[error("Cannot connect to {host}: {message}")]
    Connect {
        /// Peer address
        host: String,
        /// Transport message
        message: String,
    },

    /// Connection failed mid-exchange.
    #[error("I/O error with {host}: {message}")]
    Io {
        /// Peer address
        host: String,
        /// Transport message
        message: String,
    },

    /// Peer sent something outside the protocol.
    #[error("Protocol violation by {host}: {message}")]
    Protocol {
        /// Peer address
        host: String,
        /// What was wrong
        message: String,
    },

    /// Peer did not answer in time.
    #[error("Timeout waiting for {host}")]
    Timeout {
        /// Peer address
        host: String,
    },

    /// Caller cancelled the request.
    #[error("Peer request cancelled")]
    Cancelled,
}

/// Block execution failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// A transaction could not be decoded or applied.
    #[error("Invalid transaction #{index} in block {block_id}: {message}")]
    InvalidTransaction {
        /// Block being played
        block_id: BlockId,
        /// Position of the transaction in the block
        index: usize,
        /// Reason
        message: String,
    },

    /// Rollback ledger failure while recording state.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// First-block loading failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// No bootstrap source is configured for an empty chain.
    #[error("No first block source configured")]
    NotConfigured,

    /// First block file could not be read.
    #[error("Cannot read first block from {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// I/O message
        message: String,
    },
}

/// Peer reputation failures. Logged by callers, never escalated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReputationError {
    /// Host is not a known node.
    #[error("Unknown node {0}")]
    UnknownNode(String),
}

/// Top-level synchronization error.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No reachable peer reports a usable height.
    #[error("All peers unavailable")]
    PeerUnavailable,

    /// Block bytes could not be decoded.
    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    /// Producer signature did not verify.
    #[error("Invalid signature for block {block_id}")]
    InvalidSignature {
        /// Offending block
        block_id: BlockId,
    },

    /// Block arrived out of sequence.
    #[error("Block id mismatch: expected {expected}, got {actual}")]
    BlockIdMismatch {
        /// Expected id
        expected: BlockId,
        /// Received id
        actual: BlockId,
    },

    /// Producer position has no registered key.
    #[error("Unknown producer at position {position}")]
    UnknownProducer {
        /// Producer position
        position: i64,
    },

    /// Replaying the block produced different rollback entries than its producer recorded.
    #[error("Rollbacks hash mismatch at block {block_id}")]
    RollbacksHashMismatch {
        /// Offending block
        block_id: BlockId,
    },

    /// Backward search exhausted without a block that verifies against the local chain.
    #[error("No common ancestor found, searched down to block {oldest}")]
    NoCommonAncestor {
        /// Oldest block examined
        oldest: BlockId,
    },

    /// Fork resolution aborted; the local chain is unchanged.
    #[error("Fork resolution failed at block {block_id}: {source}")]
    ResolutionFailed {
        /// Divergence point
        block_id: BlockId,
        /// Peer block `(id, time)` being handled when the resolution failed.
        candidate: Option<(BlockId, i64)>,
        /// Cause
        #[source]
        source: Box<SyncError>,
    },

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Rollback ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Execution engine failure.
    #[error(transparent)]
    Execution(#[from] ExecError),

    /// Network failure talking to a peer.
    #[error(transparent)]
    Peer(PeerError),

    /// First block could not be loaded.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    /// Cooperative cancellation.
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the failure is attributable to the peer that served the block.
    pub fn is_ban_worthy(&self) -> bool {
        match self {
            SyncError::MalformedBlock(_)
            | SyncError::InvalidSignature { .. }
            | SyncError::BlockIdMismatch { .. }
            | SyncError::UnknownProducer { .. }
            | SyncError::RollbacksHashMismatch { .. }
            | SyncError::Execution(ExecError::InvalidTransaction { .. })
            | SyncError::Peer(PeerError::Protocol { .. }) => true,
            SyncError::ResolutionFailed { source, .. } => source.is_ban_worthy(),
            _ => false,
        }
    }

    /// Whether this is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        match self {
            SyncError::Cancelled => true,
            SyncError::ResolutionFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::MalformedBlock(msg) => SyncError::MalformedBlock(msg),
        }
    }
}

impl From<SignatureError> for SyncError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidSignature { block_id } => SyncError::InvalidSignature { block_id },
        }
    }
}

impl From<LinkageError> for SyncError {
    fn from(err: LinkageError) -> Self {
        match err {
            LinkageError::BlockIdMismatch { expected, actual } => {
                SyncError::BlockIdMismatch { expected, actual }
            }
            LinkageError::UnknownProducer { position } => SyncError::UnknownProducer { position },
        }
    }
}

impl From<PeerError> for SyncError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::NodesUnavailable => SyncError::PeerUnavailable,
            PeerError::Cancelled => SyncError::Cancelled,
            other => SyncError::Peer(other),
        }
    }
}
