//! Storage backends for the chain store.
//!
//! The in-memory store from `chain-sync` is always available; RocksDB is
//! behind the `rocksdb` feature.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

use crate::config::StorageConfig;
use chain_sync::adapters::InMemoryKVStore;
use chain_sync::ports::KeyValueStore;
use std::sync::Arc;

/// Open the store selected by `config`.
pub fn open_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if config.in_memory {
        tracing::warn!("Using in-memory chain store; state is lost on exit");
        return Ok(Arc::new(InMemoryKVStore::new()));
    }

    #[cfg(feature = "rocksdb")]
    {
        let store = RocksDbStore::open(RocksDbConfig {
            path: config.data_dir.clone(),
            ..Default::default()
        })?;
        tracing::info!("Opened chain store at {}", config.data_dir.display());
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "rocksdb"))]
    {
        anyhow::bail!(
            "persistent storage at {} requires the `rocksdb` feature; set storage.in_memory = true",
            config.data_dir.display()
        )
    }
}
