//! In-memory key-value store.
//!
//! Ordered map behind a lock, with fault injection for tests that need a
//! read or a commit to fail part-way through a sync.

use crate::domain::StorageError;
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory [`KeyValueStore`].
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_patterns: RwLock<Vec<String>>,
    read_fail_prefixes: RwLock<Vec<String>>,
}

impl InMemoryKVStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every batch that touches a key containing `pattern` fail.
    pub fn fail_batches_touching(&self, pattern: &str) {
        self.fail_patterns.write().push(pattern.to_string());
    }

    /// Make reads and scans of keys under `prefix` fail.
    pub fn fail_reads_under(&self, prefix: &str) {
        self.read_fail_prefixes.write().push(prefix.to_string());
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        self.fail_patterns.write().clear();
        self.read_fail_prefixes.write().clear();
    }

    fn check_read(&self, key: &str) -> Result<(), StorageError> {
        let prefixes = self.read_fail_prefixes.read();
        if prefixes
            .iter()
            .any(|p| key.starts_with(p.as_str()) || p.starts_with(key))
        {
            return Err(StorageError::Read {
                key: key.to_string(),
                message: "injected fault".into(),
            });
        }
        Ok(())
    }

    /// Copy of all committed entries.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        self.data.read().clone()
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// True when nothing is committed.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check_read(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        self.check_read(prefix)?;
        let data = self.data.read();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        {
            let patterns = self.fail_patterns.read();
            if let Some(op) = operations
                .iter()
                .find(|op| patterns.iter().any(|p| op.key().contains(p.as_str())))
            {
                return Err(StorageError::Commit(format!(
                    "injected fault on {}",
                    op.key()
                )));
            }
        }

        let mut data = self.data.write();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}
