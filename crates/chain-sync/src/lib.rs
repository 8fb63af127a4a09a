//! # Chain Sync
//!
//! Chain synchronization and fork resolution for a permissioned ledger node.
//!
//! **Architecture:** Hexagonal (ports/adapters)
//!
//! ## Purpose
//!
//! Keep the local chain equal to the best peer's chain:
//! - Catch up block by block from the peer with the highest tip
//! - Detect forks through the previous block's hash and rollbacks hash
//! - Replace a diverged tail atomically, undoing state through the rollback ledger
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Exact undo | Previous values recorded per block, restored in reverse counter order |
//! | Atomic fork repair | Rollback and replacement share one store transaction |
//! | Single sync pass | Compare-and-exchange run flag with an RAII guard |
//! | Serialized chain mutation | Process-wide write lock held for the whole pass |
//! | Bounded memory | Peer blocks flow through a bounded, cancellable channel |
//!
//! ## Module Structure
//!
//! ```text
//! chain-sync/
//! ├── domain/          # Blocks, codec and validation, rollback ledger, errors
//! ├── ports/           # Sync API (inbound) + collaborator traits (outbound)
//! ├── storage/         # Key layout, transactions, chain records
//! ├── adapters/        # In-memory store, TCP peer protocol, registry engine, bans
//! ├── application/     # Updater, fork resolver, coordinator, desync monitor
//! └── config.rs        # SyncConfig
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports
pub use application::{
    ChainUpdater, DesyncMonitor, DesyncReport, ForkResolver, ResolutionReport, SyncCoordinator,
    SyncDependencies, UpdaterState,
};
pub use config::{BanConfig, ConfigError, SyncConfig};
pub use domain::{
    Block, BlockHeader, BlockId, Host, InfoBlock, ProducerKeys, ProducerSet, RollbackLedger,
    SyncError,
};
pub use ports::{ChainSyncApi, SyncOutcome, UpdateReport};
pub use storage::StoreTransaction;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
