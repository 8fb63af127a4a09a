//! # SHA-256 Hashing
//!
//! Chain-linkage hashing. Block content hashes and merkle nodes are
//! double SHA-256 (`sha256(sha256(x))`), which must match byte-for-byte
//! across every node of the network.

use sha2::{Digest, Sha256};

/// SHA-256 hash output (256-bit).
pub type Hash = [u8; 32];

/// The all-zero hash, used as the "previous hash" of the first block.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Stateful SHA-256 hasher.
pub struct Sha256Hasher {
    inner: Sha256,
}

impl Sha256Hasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return the single hash.
    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }

    /// Finalize and hash the digest once more.
    pub fn finalize_double(self) -> Hash {
        sha256(&self.finalize())
    }
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash data with SHA-256 (one-shot).
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Hash-of-hash over `data`.
pub fn double_hash(data: &[u8]) -> Hash {
    sha256(&sha256(data))
}

/// Lowercase hex rendering used by canonical payloads and storage keys.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}
