//! # Block Entities
//!
//! Headers, decoded blocks and the committed-tip summary.

use serde::{Deserialize, Serialize};
use shared_crypto::{double_hash, to_hex, Hash, ZERO_HASH};
use std::fmt;

/// Block height. The first block is 1; 0 means "no blocks".
pub type BlockId = i64;

/// Block header as signed by its producer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Height of this block.
    pub block_id: BlockId,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Ecosystem the producer belongs to.
    pub ecosystem_id: i64,
    /// Producer key identifier.
    pub key_id: Vec<u8>,
    /// Producer position in the producer set.
    pub node_position: i64,
    /// Producer signature over the signing payload.
    pub signature: Vec<u8>,
    /// Content hash. Recomputed locally before persisting.
    pub hash: Hash,
    /// Digest of the rollback entries produced by playing this block.
    pub rollbacks_hash: Hash,
}

impl BlockHeader {
    /// Parent used for the first block.
    pub fn genesis_parent() -> Self {
        Self::default()
    }

    /// Canonical string hashed into the content hash.
    ///
    /// Covers every header field except the signature and the content hash itself.
    pub fn for_sha(&self, prev: &BlockHeader, merkle_root: &Hash) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.block_id,
            to_hex(&prev.hash),
            to_hex(merkle_root),
            self.time,
            self.ecosystem_id,
            hex::encode(&self.key_id),
            self.node_position,
            to_hex(&self.rollbacks_hash),
        )
    }

    /// Canonical string the producer signs.
    ///
    /// Binds the block to the producer's view of the previous header.
    pub fn for_sign(&self, prev: &BlockHeader, merkle_root: &Hash) -> String {
        format!(
            "0,{},{},{},{},{},{},{},{}",
            self.block_id,
            to_hex(&prev.hash),
            to_hex(&prev.rollbacks_hash),
            self.time,
            self.ecosystem_id,
            hex::encode(&self.key_id),
            self.node_position,
            to_hex(merkle_root),
        )
    }

    /// Summary of this header as the committed tip.
    pub fn info(&self) -> InfoBlock {
        InfoBlock {
            block_id: self.block_id,
            hash: self.hash,
            rollbacks_hash: self.rollbacks_hash,
            time: self.time,
        }
    }
}

/// A decoded block.
///
/// `prev_hash` and `prev_rollbacks_hash` are the producer's claims about the
/// previous block; `prev_header` is the previous header as this node knows it
/// and is filled in by the caller before hashing or verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Header.
    pub header: BlockHeader,
    /// Content hash of the previous block as embedded by the producer.
    pub prev_hash: Hash,
    /// Rollbacks hash of the previous block as embedded by the producer.
    pub prev_rollbacks_hash: Hash,
    /// Previous header from local storage (or from an in-memory candidate chain).
    pub prev_header: Option<BlockHeader>,
    /// Merkle root over the transactions.
    pub merkle_root: Hash,
    /// Raw transactions.
    pub transactions: Vec<Vec<u8>>,
    /// Set after play when the block touched system parameters.
    pub sys_update: bool,
}

impl Block {
    /// Build a block, computing its merkle root.
    pub fn new(
        header: BlockHeader,
        prev_hash: Hash,
        prev_rollbacks_hash: Hash,
        transactions: Vec<Vec<u8>>,
    ) -> Self {
        let merkle_root = merkle_root(&transactions);
        Self {
            header,
            prev_hash,
            prev_rollbacks_hash,
            prev_header: None,
            merkle_root,
            transactions,
            sys_update: false,
        }
    }

    /// Height of this block.
    pub fn id(&self) -> BlockId {
        self.header.block_id
    }

    /// Previous header, falling back to the genesis parent for block 1.
    pub fn parent(&self) -> BlockHeader {
        self.prev_header
            .clone()
            .unwrap_or_else(BlockHeader::genesis_parent)
    }
}

/// Summary of the committed tip.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoBlock {
    /// Tip height, 0 on an empty chain.
    pub block_id: BlockId,
    /// Tip content hash.
    pub hash: Hash,
    /// Tip rollbacks hash.
    pub rollbacks_hash: Hash,
    /// Tip timestamp.
    pub time: i64,
}

/// Block as persisted: the validated header plus the wire bytes served to peers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredBlock {
    /// Validated header with the locally computed content hash.
    pub header: BlockHeader,
    /// Wire encoding as received.
    pub body: Vec<u8>,
}

/// Peer address (`host:port`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Host(pub String);

impl Host {
    /// Create from an address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Host {
    fn from(addr: &str) -> Self {
        Self(addr.to_string())
    }
}

/// Merkle root over transaction double hashes.
///
/// Pairs are combined with a double hash of the concatenation; an odd last
/// node is paired with itself. No transactions gives the zero hash.
pub fn merkle_root(transactions: &[Vec<u8>]) -> Hash {
    if transactions.is_empty() {
        return ZERO_HASH;
    }

    let mut level: Vec<Hash> = transactions.iter().map(|tx| double_hash(tx)).collect();

    while level.len() > 1 {
        let mut next_level = Vec::with_capacity((level.len() + 1) / 2);

        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left);
            let mut joined = [0u8; 64];
            joined[..32].copy_from_slice(left);
            joined[32..].copy_from_slice(right);
            next_level.push(double_hash(&joined));
        }

        level = next_level;
    }

    level[0]
}
