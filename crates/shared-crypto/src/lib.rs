//! # Shared Crypto - Chain Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | SHA-256, double SHA-256 | Content hashes, merkle roots, rollback digests |
//! | `signatures` | Ed25519 | Block producer signatures |
//!
//! ## Security Properties
//!
//! - **Double SHA-256**: length-extension resistant chain linkage hash
//! - **Ed25519**: Deterministic nonces, no RNG dependency

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use errors::CryptoError;
pub use hashing::{double_hash, sha256, to_hex, Hash, Sha256Hasher, ZERO_HASH};
pub use signatures::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
