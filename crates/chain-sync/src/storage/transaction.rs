//! Write-buffering transaction over a [`KeyValueStore`].
//!
//! Reads see this transaction's own writes layered over committed state.
//! Nothing reaches the store until [`StoreTransaction::commit`], which hands
//! every buffered write to the store as one atomic batch. Dropping the
//! transaction discards it.

use crate::domain::StorageError;
use crate::ports::{BatchOperation, KeyValueStore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Buffered read-write transaction.
pub struct StoreTransaction {
    store: Arc<dyn KeyValueStore>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl StoreTransaction {
    /// Begin a transaction on `store`.
    pub fn begin(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            writes: BTreeMap::new(),
        }
    }

    /// Read a value, including uncommitted writes.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match self.writes.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => self.store.get(key),
        }
    }

    /// Buffer an insert or overwrite.
    pub fn put(&mut self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::Write {
                key: String::new(),
                message: "empty key".into(),
            });
        }
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    /// Buffer a removal.
    pub fn delete(&mut self, key: &str) -> Result<(), StorageError> {
        self.writes.insert(key.to_string(), None);
        Ok(())
    }

    /// Entries under `prefix`, ascending by key, including uncommitted writes.
    pub fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut merged: BTreeMap<String, Vec<u8>> =
            self.store.prefix_scan(prefix)?.into_iter().collect();

        for (key, pending) in self
            .writes
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Apply every buffered write atomically.
    pub fn commit(self) -> Result<(), StorageError> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let operations = self
            .writes
            .into_iter()
            .map(|(key, pending)| match pending {
                Some(value) => BatchOperation::Put { key, value },
                None => BatchOperation::Delete { key },
            })
            .collect();

        self.store.atomic_batch_write(operations)
    }

    /// Discard every buffered write.
    pub fn rollback(self) {
        tracing::trace!(
            "[chain-sync] discarding {} buffered writes",
            self.writes.len()
        );
    }
}
