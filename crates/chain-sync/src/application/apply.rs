//! Validate, play and persist a single block inside an open transaction.
//!
//! Shared by the chain updater, the fork resolver and first-block loading.

use crate::domain::{
    codec, Block, BlockId, ProducerKeys, RollbackLedger, StoredBlock, SyncError,
};
use crate::ports::{ExecutionEngine, KeyValueStore};
use crate::storage::{chain, StoreTransaction};
use std::sync::Arc;

/// Shared collaborators for applying blocks.
#[derive(Clone)]
pub struct SyncDependencies {
    /// Chain and state storage.
    pub store: Arc<dyn KeyValueStore>,
    /// Peer protocol client.
    pub peers: Arc<dyn crate::ports::PeerClient>,
    /// Transaction execution.
    pub engine: Arc<dyn ExecutionEngine>,
    /// Producer keys by position.
    pub producers: Arc<dyn ProducerKeys>,
    /// Peer reputation.
    pub reputation: Arc<dyn crate::ports::PeerReputation>,
    /// Pending transactions.
    pub tx_pool: Arc<dyn crate::ports::TransactionPool>,
    /// Cached node parameters.
    pub system_parameters: Arc<dyn crate::ports::SystemParameters>,
    /// First block source for an empty chain.
    pub bootstrap: Option<Arc<dyn crate::ports::BootstrapSource>>,
}

impl SyncDependencies {
    /// Begin a transaction on the store.
    pub fn begin(&self) -> StoreTransaction {
        StoreTransaction::begin(self.store.clone())
    }
}

/// Validate `block` against its `prev_header`, play it and persist it with `body`.
///
/// The header's content hash is recomputed; the rollbacks digest produced by
/// playing must equal the header's rollbacks hash. On success the block is
/// the new tip inside `txn`.
pub fn apply_block(
    txn: &mut StoreTransaction,
    block: &mut Block,
    body: Vec<u8>,
    engine: &dyn ExecutionEngine,
    producers: &dyn ProducerKeys,
) -> Result<(), SyncError> {
    let block_id = block.id();
    let key = producers
        .public_key(block.header.node_position)
        .ok_or(SyncError::UnknownProducer {
            position: block.header.node_position,
        })?;
    codec::verify_signature(block, &key)?;

    let outcome = {
        let mut ledger = RollbackLedger::new(txn);
        let outcome = engine.play(block, &mut ledger)?;
        let digest = ledger.block_digest(block_id)?;
        if digest != block.header.rollbacks_hash {
            return Err(SyncError::RollbacksHashMismatch { block_id });
        }
        outcome
    };

    block.sys_update = outcome.sys_update;
    block.header.hash = codec::compute_content_hash(block);

    chain::write_block(
        txn,
        &StoredBlock {
            header: block.header.clone(),
            body,
        },
    )?;
    chain::write_info(txn, &block.header.info())?;
    Ok(())
}

/// Drop rollback entries older than the retained horizon below `tip`.
pub fn retire_horizon(
    txn: &mut StoreTransaction,
    tip: BlockId,
    rollback_blocks: u32,
) -> Result<usize, SyncError> {
    let through = tip - BlockId::from(rollback_blocks);
    Ok(RollbackLedger::new(txn).retire_through(through)?)
}
