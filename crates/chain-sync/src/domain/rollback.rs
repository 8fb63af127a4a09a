//! # Rollback Ledger
//!
//! Records the previous value of every registry key a block mutates so the
//! block can later be undone exactly.
//!
//! Entries live under `rollback/{block}/{counter}/{tx}` and are written in the
//! same transaction as the mutation they describe. Rolling a block back
//! restores values in descending counter order and removes the entries.
//!
//! ## Invariants
//!
//! - Counters are strictly increasing per block; a failed write does not
//!   consume a counter.
//! - Rolling back a block whose entries were already removed is a no-op.

use super::block::BlockId;
use super::errors::{LedgerError, StorageError};
use crate::storage::keys::{
    is_valid_registry_name, registry_key, rollback_block_prefix, rollback_key, rollback_key_block, ROLLBACK_PREFIX,
};
use crate::storage::StoreTransaction;
use serde::{Deserialize, Serialize};
use shared_crypto::{Hash, Sha256Hasher};
use std::collections::HashMap;

/// Named, ecosystem-scoped key-value table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Registry {
    /// Table name.
    pub name: String,
    /// Owning ecosystem.
    pub ecosystem_id: i64,
}

impl Registry {
    /// Create a registry handle.
    pub fn new(name: impl Into<String>, ecosystem_id: i64) -> Self {
        Self {
            name: name.into(),
            ecosystem_id,
        }
    }
}

/// One recorded previous value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Position within the block.
    pub counter: u64,
    /// Registry the key belongs to.
    pub registry: Registry,
    /// Mutated key.
    pub key: String,
    /// Value before the mutation; `None` means the key did not exist.
    pub previous_value: Option<String>,
}

/// Rollback ledger bound to one open transaction.
pub struct RollbackLedger<'t> {
    txn: &'t mut StoreTransaction,
    counters: HashMap<BlockId, u64>,
}

impl<'t> RollbackLedger<'t> {
    /// Bind a ledger to `txn`.
    pub fn new(txn: &'t mut StoreTransaction) -> Self {
        Self {
            txn,
            counters: HashMap::new(),
        }
    }

    /// The underlying transaction.
    pub fn transaction(&mut self) -> &mut StoreTransaction {
        self.txn
    }

    /// Record the previous value of `key` before `block` changes it.
    pub fn save_state(
        &mut self,
        block_id: BlockId,
        tx_hash: &Hash,
        registry: &Registry,
        key: &str,
        previous_value: Option<String>,
    ) -> Result<(), LedgerError> {
        let write_err = |source: StorageError| LedgerError::Write { block_id, source };

        let counter = self.last_counter(block_id).map_err(write_err)? + 1;
        let record = StateRecord {
            counter,
            registry: registry.clone(),
            key: key.to_string(),
            previous_value,
        };
        let entry_key = rollback_key(block_id, counter, tx_hash);
        let bytes = serde_json::to_vec(&record).map_err(|e| {
            write_err(StorageError::Write {
                key: entry_key.clone(),
                message: e.to_string(),
            })
        })?;

        self.txn.put(&entry_key, bytes).map_err(write_err)?;
        self.counters.insert(block_id, counter);
        Ok(())
    }

    /// Undo every recorded mutation of `block_id`, newest first.
    ///
    /// Returns the number of entries restored.
    pub fn rollback_state(&mut self, block_id: BlockId) -> Result<usize, LedgerError> {
        let rollback_err = |source: StorageError| LedgerError::Rollback { block_id, source };

        let mut records = self.records(block_id).map_err(rollback_err)?;
        records.sort_by(|a, b| b.1.counter.cmp(&a.1.counter));

        for (entry_key, record) in &records {
            let target = registry_key(
                &record.registry.name,
                record.registry.ecosystem_id,
                &record.key,
            );
            match &record.previous_value {
                Some(value) => self
                    .txn
                    .put(&target, value.as_bytes().to_vec())
                    .map_err(rollback_err)?,
                None => self.txn.delete(&target).map_err(rollback_err)?,
            }
            self.txn.delete(entry_key).map_err(rollback_err)?;
        }

        self.counters.remove(&block_id);
        if !records.is_empty() {
            tracing::debug!(
                "[chain-sync] rolled back {} state entries of block {}",
                records.len(),
                block_id
            );
        }
        Ok(records.len())
    }

    /// Entries of `block_id`, ascending by counter.
    pub fn records(&self, block_id: BlockId) -> Result<Vec<(String, StateRecord)>, StorageError> {
        let mut records = self
            .txn
            .prefix_scan(&rollback_block_prefix(block_id))?
            .into_iter()
            .map(|(key, bytes)| {
                serde_json::from_slice::<StateRecord>(&bytes)
                    .map(|record| (key.clone(), record))
                    .map_err(|e| StorageError::Corrupted {
                        key,
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|(_, record)| record.counter);
        Ok(records)
    }

    /// Digest of the entries of `block_id` in counter order.
    pub fn block_digest(&self, block_id: BlockId) -> Result<Hash, LedgerError> {
        let records = self
            .records(block_id)
            .map_err(|source| LedgerError::Write { block_id, source })?;

        let mut hasher = Sha256Hasher::new();
        for (entry_key, record) in &records {
            let bytes = serde_json::to_vec(record).map_err(|e| LedgerError::Write {
                block_id,
                source: StorageError::Corrupted {
                    key: entry_key.clone(),
                    message: e.to_string(),
                },
            })?;
            hasher.update(entry_key.as_bytes()).update(&bytes);
        }
        Ok(hasher.finalize_double())
    }

    /// Remove entries of every block up to and including `through`.
    ///
    /// Those blocks can no longer be rolled back.
    pub fn retire_through(&mut self, through: BlockId) -> Result<usize, LedgerError> {
        if through < 1 {
            return Ok(0);
        }
        let retire_err = |source: StorageError| LedgerError::Write {
            block_id: through,
            source,
        };

        let stale: Vec<String> = self
            .txn
            .prefix_scan(ROLLBACK_PREFIX)
            .map_err(retire_err)?
            .into_iter()
            .map(|(key, _)| key)
            .take_while(|key| rollback_key_block(key).is_some_and(|id| id <= through))
            .collect();

        for key in &stale {
            self.txn.delete(key).map_err(retire_err)?;
        }
        Ok(stale.len())
    }

    fn entry_key(registry: &Registry, key: &str) -> Result<String, LedgerError> {
        if !is_valid_registry_name(&registry.name) {
            return Err(LedgerError::InvalidRegistry {
                name: registry.name.clone(),
            });
        }
        Ok(registry_key(&registry.name, registry.ecosystem_id, key))
    }

    /// Current value of a registry key.
    pub fn registry_get(&self, registry: &Registry, key: &str) -> Result<Option<String>, LedgerError> {
        let target = Self::entry_key(registry, key)?;
        let bytes = self
            .txn
            .get(&target)
            .map_err(|source| LedgerError::Read { source })?;
        bytes
            .map(|b| String::from_utf8(b).map_err(|_| LedgerError::InvalidValue { key: target }))
            .transpose()
    }

    /// Set a registry key, recording its previous value first.
    pub fn registry_set(
        &mut self,
        block_id: BlockId,
        tx_hash: &Hash,
        registry: &Registry,
        key: &str,
        value: &str,
    ) -> Result<(), LedgerError> {
        let target = Self::entry_key(registry, key)?;
        let previous = self.registry_get(registry, key)?;
        self.save_state(block_id, tx_hash, registry, key, previous)?;
        self.txn
            .put(&target, value.as_bytes().to_vec())
            .map_err(|source| LedgerError::Write { block_id, source })
    }

    /// Delete a registry key, recording its previous value first.
    pub fn registry_delete(
        &mut self,
        block_id: BlockId,
        tx_hash: &Hash,
        registry: &Registry,
        key: &str,
    ) -> Result<(), LedgerError> {
        let target = Self::entry_key(registry, key)?;
        let previous = self.registry_get(registry, key)?;
        if previous.is_none() {
            return Ok(());
        }
        self.save_state(block_id, tx_hash, registry, key, previous)?;
        self.txn
            .delete(&target)
            .map_err(|source| LedgerError::Write { block_id, source })
    }

    fn last_counter(&mut self, block_id: BlockId) -> Result<u64, StorageError> {
        if let Some(counter) = self.counters.get(&block_id) {
            return Ok(*counter);
        }
        let last = self
            .records(block_id)?
            .last()
            .map(|(_, record)| record.counter)
            .unwrap_or(0);
        self.counters.insert(block_id, last);
        Ok(last)
    }
}
