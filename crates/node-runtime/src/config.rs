//! # Node Configuration
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables.
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `LEDGER_CONFIG` | Path of the TOML file |
//! | `LEDGER_LISTEN_ADDR` | `network.listen_addr` |
//! | `LEDGER_PEERS` | `sync.remote_peers` (comma-separated) |
//! | `LEDGER_FIRST_BLOCK` | `sync.first_block_path` |
//! | `LEDGER_DATA_DIR` | `storage.data_dir` |

use chain_sync::{Host, ProducerSet, SyncConfig};
use serde::{Deserialize, Serialize};
use shared_crypto::Ed25519PublicKey;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Cannot read config file {path}: {message}")]
    Read {
        /// File path
        path: String,
        /// I/O message
        message: String,
    },

    /// Config file is not valid TOML for [`NodeConfig`].
    #[error("Invalid config file {path}: {message}")]
    Parse {
        /// File path
        path: String,
        /// Parser message
        message: String,
    },

    /// A producer key is not 32 bytes of hex.
    #[error("Invalid producer key at position {position}: {message}")]
    ProducerKey {
        /// Position in `producers`
        position: usize,
        /// Decoder message
        message: String,
    },

    /// Sync settings rejected.
    #[error(transparent)]
    Sync(#[from] chain_sync::ConfigError),
}

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Chain sync configuration.
    pub sync: SyncConfig,
    /// Hex Ed25519 public keys of block producers, by position.
    pub producers: Vec<String>,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the block server listens on.
    pub listen_addr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:7078".to_string(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for the chain store.
    pub data_dir: PathBuf,
    /// Keep the chain in memory only. Defaults to on unless the node is
    /// built with the `rocksdb` feature.
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/chain"),
            in_memory: !cfg!(feature = "rocksdb"),
        }
    }
}

impl NodeConfig {
    /// Load from `LEDGER_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("LEDGER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        config.sync.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("LEDGER_LISTEN_ADDR") {
            self.network.listen_addr = addr;
        }
        if let Some(peers) = lookup("LEDGER_PEERS") {
            self.sync.remote_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(Host::from)
                .collect();
        }
        if let Some(path) = lookup("LEDGER_FIRST_BLOCK") {
            self.sync.first_block_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("LEDGER_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Decode the producer keys.
    pub fn producer_set(&self) -> Result<ProducerSet, ConfigError> {
        let keys = self
            .producers
            .iter()
            .enumerate()
            .map(|(position, hex)| {
                Ed25519PublicKey::from_hex(hex).map_err(|e| ConfigError::ProducerKey {
                    position,
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ProducerSet::new(keys))
    }
}
