//! Block and tip persistence on top of a transaction.
//!
//! Blocks are stored with bincode (validated header plus wire body); the tip
//! summary is stored as JSON.

use super::keys::{block_key, INFO_KEY};
use super::transaction::StoreTransaction;
use crate::domain::{BlockHeader, BlockId, InfoBlock, StorageError, StoredBlock};
use crate::ports::KeyValueStore;

fn corrupted(key: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupted {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn decode_info(bytes: Option<Vec<u8>>) -> Result<InfoBlock, StorageError> {
    match bytes {
        Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| corrupted(INFO_KEY, e)),
        None => Ok(InfoBlock::default()),
    }
}

fn decode_block(key: &str, bytes: Option<Vec<u8>>) -> Result<Option<StoredBlock>, StorageError> {
    bytes
        .map(|bytes| bincode::deserialize(&bytes).map_err(|e| corrupted(key, e)))
        .transpose()
}

/// Committed tip; the default summary (id 0) on an empty chain.
pub fn committed_info(store: &dyn KeyValueStore) -> Result<InfoBlock, StorageError> {
    decode_info(store.get(INFO_KEY)?)
}

/// Committed block by id.
pub fn committed_block(
    store: &dyn KeyValueStore,
    block_id: BlockId,
) -> Result<Option<StoredBlock>, StorageError> {
    let key = block_key(block_id);
    decode_block(&key, store.get(&key)?)
}

/// Tip as seen by `txn`.
pub fn read_info(txn: &StoreTransaction) -> Result<InfoBlock, StorageError> {
    decode_info(txn.get(INFO_KEY)?)
}

/// Replace the tip summary.
pub fn write_info(txn: &mut StoreTransaction, info: &InfoBlock) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(info).map_err(|e| corrupted(INFO_KEY, e))?;
    txn.put(INFO_KEY, bytes)
}

/// Block as seen by `txn`.
pub fn read_block(
    txn: &StoreTransaction,
    block_id: BlockId,
) -> Result<Option<StoredBlock>, StorageError> {
    let key = block_key(block_id);
    decode_block(&key, txn.get(&key)?)
}

/// Header of a block as seen by `txn`.
pub fn read_header(
    txn: &StoreTransaction,
    block_id: BlockId,
) -> Result<Option<BlockHeader>, StorageError> {
    Ok(read_block(txn, block_id)?.map(|b| b.header))
}

/// Persist a block.
pub fn write_block(txn: &mut StoreTransaction, block: &StoredBlock) -> Result<(), StorageError> {
    let key = block_key(block.header.block_id);
    let bytes = bincode::serialize(block).map_err(|e| corrupted(&key, e))?;
    txn.put(&key, bytes)
}

/// Remove a block.
pub fn delete_block(txn: &mut StoreTransaction, block_id: BlockId) -> Result<(), StorageError> {
    txn.delete(&block_key(block_id))
}

/// Blocks with id greater than `after`, newest first.
pub fn blocks_after_desc(
    txn: &StoreTransaction,
    after: BlockId,
) -> Result<Vec<StoredBlock>, StorageError> {
    let tip = read_info(txn)?.block_id;
    let mut blocks = Vec::new();
    let mut id = tip;
    while id > after {
        if let Some(block) = read_block(txn, id)? {
            blocks.push(block);
        }
        id -= 1;
    }
    Ok(blocks)
}
