//! Node collaborators touched by sync: transaction pool, system parameter
//! cache and first-block source.

use super::registry_engine::{PLATFORM_ECOSYSTEM, SYSTEM_PARAMETERS};
use crate::domain::{BootstrapError, StorageError};
use crate::ports::{BootstrapSource, KeyValueStore, SystemParameters, TransactionPool};
use crate::storage::keys::registry_prefix;
use parking_lot::RwLock;
use shared_crypto::Hash;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Transaction pool
// =============================================================================

/// Pending transactions with a verified flag.
#[derive(Default)]
pub struct InMemoryTransactionPool {
    pending: RwLock<HashMap<Hash, bool>>,
}

impl InMemoryTransactionPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a verified transaction.
    pub fn insert_verified(&self, tx_hash: Hash) {
        self.pending.write().insert(tx_hash, true);
    }

    /// Transactions waiting for re-verification.
    pub fn unverified(&self) -> usize {
        self.pending.read().values().filter(|v| !**v).count()
    }
}

impl TransactionPool for InMemoryTransactionPool {
    fn mark_unverified(&self) -> Result<(), StorageError> {
        let mut pending = self.pending.write();
        for verified in pending.values_mut() {
            *verified = false;
        }
        tracing::debug!(
            "[chain-sync] marked {} pending transactions unverified",
            pending.len()
        );
        Ok(())
    }
}

// =============================================================================
// System parameters
// =============================================================================

/// In-memory copy of the platform `system_parameters` registry.
#[derive(Default)]
pub struct CachedSystemParameters {
    values: RwLock<HashMap<String, String>>,
    reloads: AtomicU64,
}

impl CachedSystemParameters {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value of a parameter.
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    /// Number of reloads performed.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

impl SystemParameters for CachedSystemParameters {
    fn reload(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        let prefix = registry_prefix(SYSTEM_PARAMETERS, PLATFORM_ECOSYSTEM);
        let mut values = HashMap::new();
        for (key, bytes) in store.prefix_scan(&prefix)? {
            let name = key[prefix.len()..].to_string();
            let value = String::from_utf8(bytes).map_err(|e| StorageError::Corrupted {
                key: key.clone(),
                message: e.to_string(),
            })?;
            values.insert(name, value);
        }

        tracing::info!("[chain-sync] reloaded {} system parameters", values.len());
        *self.values.write() = values;
        self.reloads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// =============================================================================
// First block
// =============================================================================

/// Reads the wire-encoded first block from a file.
#[derive(Clone, Debug)]
pub struct FileBootstrap {
    path: PathBuf,
}

impl FileBootstrap {
    /// Source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BootstrapSource for FileBootstrap {
    fn first_block(&self) -> Result<Vec<u8>, BootstrapError> {
        std::fs::read(&self.path).map_err(|e| BootstrapError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}
