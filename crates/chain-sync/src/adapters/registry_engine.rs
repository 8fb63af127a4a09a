//! # Registry Execution Engine
//!
//! Executes transactions made of registry set/delete operations.
//!
//! Every mutation goes through the [`RollbackLedger`], so playing a block is
//! exactly reversible. Writes to the `system_parameters` registry of the
//! platform ecosystem flag the block for a parameter reload.

use crate::domain::{Block, ExecError, Registry, RollbackLedger};
use crate::ports::{ExecutionEngine, PlayOutcome};
use crate::storage::keys::is_valid_registry_name;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_crypto::{double_hash, Hash};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry holding node-level parameters.
pub const SYSTEM_PARAMETERS: &str = "system_parameters";

/// Ecosystem that owns the system parameters.
pub const PLATFORM_ECOSYSTEM: i64 = 1;

/// Decoded transactions kept between plays.
const MAX_CACHED_TRANSACTIONS: usize = 10_000;

/// One registry mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryOp {
    /// Set `key` to `value`.
    Set {
        /// Target registry
        registry: Registry,
        /// Key
        key: String,
        /// New value
        value: String,
    },
    /// Remove `key`.
    Delete {
        /// Target registry
        registry: Registry,
        /// Key
        key: String,
    },
}

impl RegistryOp {
    fn registry(&self) -> &Registry {
        match self {
            Self::Set { registry, .. } | Self::Delete { registry, .. } => registry,
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::Set { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

/// Transaction: an ordered list of registry operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryTx {
    /// Operations, applied in order.
    pub ops: Vec<RegistryOp>,
}

impl RegistryTx {
    /// Single set operation.
    pub fn set(registry: Registry, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            ops: vec![RegistryOp::Set {
                registry,
                key: key.into(),
                value: value.into(),
            }],
        }
    }

    /// Append an operation.
    pub fn with(mut self, op: RegistryOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Registry execution engine with a decoded-transaction cache.
#[derive(Default)]
pub struct RegistryEngine {
    compiled: RwLock<HashMap<Hash, Arc<RegistryTx>>>,
}

impl RegistryEngine {
    /// Create an engine with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached transactions.
    pub fn cached(&self) -> usize {
        self.compiled.read().len()
    }

    fn compile(&self, tx_hash: &Hash, raw: &[u8]) -> Result<Arc<RegistryTx>, String> {
        if let Some(tx) = self.compiled.read().get(tx_hash) {
            return Ok(tx.clone());
        }

        let tx = RegistryTx::decode(raw).map_err(|e| e.to_string())?;
        if tx.ops.is_empty() {
            return Err("transaction has no operations".into());
        }
        if let Some(op) = tx
            .ops
            .iter()
            .find(|op| op.key().is_empty() || !is_valid_registry_name(&op.registry().name))
        {
            return Err(format!("invalid registry or key in {:?}", op));
        }

        let tx = Arc::new(tx);
        let mut compiled = self.compiled.write();
        if compiled.len() >= MAX_CACHED_TRANSACTIONS {
            compiled.clear();
        }
        compiled.insert(*tx_hash, tx.clone());
        Ok(tx)
    }
}

impl ExecutionEngine for RegistryEngine {
    fn play(&self, block: &Block, ledger: &mut RollbackLedger<'_>) -> Result<PlayOutcome, ExecError> {
        let block_id = block.id();
        let mut outcome = PlayOutcome::default();

        for (index, raw) in block.transactions.iter().enumerate() {
            let tx_hash = double_hash(raw);
            let tx = self
                .compile(&tx_hash, raw)
                .map_err(|message| ExecError::InvalidTransaction {
                    block_id,
                    index,
                    message,
                })?;

            for op in &tx.ops {
                match op {
                    RegistryOp::Set {
                        registry,
                        key,
                        value,
                    } => ledger.registry_set(block_id, &tx_hash, registry, key, value)?,
                    RegistryOp::Delete { registry, key } => {
                        ledger.registry_delete(block_id, &tx_hash, registry, key)?
                    }
                }

                let registry = op.registry();
                if registry.name == SYSTEM_PARAMETERS && registry.ecosystem_id == PLATFORM_ECOSYSTEM {
                    outcome.sys_update = true;
                }
            }
        }

        tracing::trace!(
            "[chain-sync] played block {} ({} transactions)",
            block_id,
            block.transactions.len()
        );
        Ok(outcome)
    }

    fn clean_cache(&self) {
        let dropped = {
            let mut compiled = self.compiled.write();
            let dropped = compiled.len();
            compiled.clear();
            dropped
        };
        tracing::debug!("[chain-sync] dropped {} cached transactions", dropped);
    }
}
