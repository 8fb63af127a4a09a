//! # RocksDB Storage Adapter
//!
//! Persistent implementation of the chain-sync `KeyValueStore` port.
//!
//! ## Features
//!
//! - Atomic batch writes (`WriteBatch`), one per committed transaction
//! - Snappy compression
//! - Bloom filters for point reads
//! - Optional fsync on every commit

use chain_sync::domain::StorageError;
use chain_sync::ports::{BatchOperation, KeyValueStore};
use rocksdb::{
    BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use std::path::PathBuf;

/// RocksDB configuration.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 32MB)
    pub write_buffer_size: usize,
    /// fsync after each commit (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/chain"),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 32 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (small buffers, no sync)
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: DB,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create the database.
    pub fn open(config: RocksDbConfig) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| StorageError::Read {
            key: config.path.display().to_string(),
            message: format!("Failed to open RocksDB: {}", e),
        })?;

        Ok(Self { db, config })
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.db.get(key.as_bytes()).map_err(|e| StorageError::Read {
            key: key.to_string(),
            message: format!("RocksDB get failed: {}", e),
        })
    }

    fn prefix_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::Read {
                key: prefix.to_string(),
                message: format!("RocksDB scan failed: {}", e),
            })?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key = String::from_utf8(key.to_vec()).map_err(|e| StorageError::Corrupted {
                key: prefix.to_string(),
                message: e.to_string(),
            })?;
            results.push((key, value.to_vec()));
        }

        Ok(results)
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), StorageError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(key.as_bytes(), &value),
                BatchOperation::Delete { key } => batch.delete(key.as_bytes()),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StorageError::Commit(format!("RocksDB batch write failed: {}", e)))
    }
}
