//! Storage key layout.
//!
//! Numeric components are zero-padded to 20 digits so lexicographic key
//! order matches numeric order in prefix scans. Registry names never
//! contain `/`, so a registry entry key splits back into exactly one
//! `(name, ecosystem, key)` triple.

use crate::domain::BlockId;
use shared_crypto::{to_hex, Hash};

/// Committed tip summary.
pub const INFO_KEY: &str = "chain/info";

/// Prefix of all stored blocks.
pub const BLOCK_PREFIX: &str = "chain/block/";

/// Prefix of all rollback ledger entries.
pub const ROLLBACK_PREFIX: &str = "rollback/";

/// Prefix of all registry state.
pub const REGISTRY_PREFIX: &str = "registry/";

/// Key of a stored block.
pub fn block_key(block_id: BlockId) -> String {
    format!("{}{:020}", BLOCK_PREFIX, block_id)
}

/// Prefix of every rollback entry of one block.
pub fn rollback_block_prefix(block_id: BlockId) -> String {
    format!("{}{:020}/", ROLLBACK_PREFIX, block_id)
}

/// Key of one rollback entry.
pub fn rollback_key(block_id: BlockId, counter: u64, tx_hash: &Hash) -> String {
    format!(
        "{}{:020}/{}",
        rollback_block_prefix(block_id),
        counter,
        to_hex(tx_hash)
    )
}

/// Block id encoded in a rollback entry key.
pub fn rollback_key_block(key: &str) -> Option<BlockId> {
    key.strip_prefix(ROLLBACK_PREFIX)?
        .split('/')
        .next()?
        .parse()
        .ok()
}

/// Whether `name` can be used as a registry name in a storage key.
pub fn is_valid_registry_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

/// Prefix of one registry.
pub fn registry_prefix(name: &str, ecosystem_id: i64) -> String {
    format!("{}{}/{}/", REGISTRY_PREFIX, name, ecosystem_id)
}

/// Key of one registry entry.
pub fn registry_key(name: &str, ecosystem_id: i64, key: &str) -> String {
    format!("{}{}", registry_prefix(name, ecosystem_id), key)
}
