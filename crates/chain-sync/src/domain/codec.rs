//! # Block Codec & Validator
//!
//! Wire decoding, content hashing, signature verification and linkage checks.
//!
//! All functions are pure: the previous header is supplied by the caller in
//! [`Block::prev_header`].

use super::block::{Block, BlockHeader, BlockId};
use super::errors::{CodecError, LinkageError, SignatureError};
use super::producers::ProducerKeys;
use bincode::Options;
use serde::{Deserialize, Serialize};
use shared_crypto::{double_hash, Ed25519PublicKey, Ed25519Signature, Hash};

/// Upper bound on an encoded block.
pub const MAX_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// On-the-wire block layout.
#[derive(Serialize, Deserialize)]
struct WireBlock {
    header: BlockHeader,
    prev_hash: Hash,
    prev_rollbacks_hash: Hash,
    transactions: Vec<Vec<u8>>,
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_BLOCK_SIZE)
}

/// Outcome of comparing a block's embedded previous-block claims with local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashCheck {
    /// Claims match the local previous block.
    Matched,
    /// Embedded previous content hash differs.
    Mismatch,
    /// Embedded previous rollbacks hash differs.
    RollbacksMismatch,
}

impl HashCheck {
    /// Number of blocks the fork resolver must collect for this outcome.
    pub fn replace_count(self) -> Option<u64> {
        match self {
            HashCheck::Matched => None,
            HashCheck::Mismatch => Some(1),
            HashCheck::RollbacksMismatch => Some(2),
        }
    }
}

/// Decode wire bytes into a block.
///
/// Trailing bytes, oversized input and non-positive ids are rejected.
pub fn decode(data: &[u8]) -> Result<Block, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MalformedBlock("empty input".into()));
    }

    let wire: WireBlock = wire_options()
        .deserialize(data)
        .map_err(|e| CodecError::MalformedBlock(e.to_string()))?;

    if wire.header.block_id < 1 {
        return Err(CodecError::MalformedBlock(format!(
            "non-positive block id {}",
            wire.header.block_id
        )));
    }

    Ok(Block::new(
        wire.header,
        wire.prev_hash,
        wire.prev_rollbacks_hash,
        wire.transactions,
    ))
}

/// Encode a block into wire bytes.
pub fn encode(block: &Block) -> Result<Vec<u8>, CodecError> {
    let wire = WireBlock {
        header: block.header.clone(),
        prev_hash: block.prev_hash,
        prev_rollbacks_hash: block.prev_rollbacks_hash,
        transactions: block.transactions.clone(),
    };
    wire_options()
        .serialize(&wire)
        .map_err(|e| CodecError::MalformedBlock(e.to_string()))
}

/// Content hash: double SHA-256 of the canonical header string.
pub fn compute_content_hash(block: &Block) -> Hash {
    let prev = block.parent();
    double_hash(block.header.for_sha(&prev, &block.merkle_root).as_bytes())
}

/// Verify the producer signature against the previous header.
pub fn verify_signature(block: &Block, key: &Ed25519PublicKey) -> Result<(), SignatureError> {
    let invalid = || SignatureError::InvalidSignature {
        block_id: block.id(),
    };

    let signature = Ed25519Signature::from_slice(&block.header.signature).map_err(|_| invalid())?;
    let payload = block.header.for_sign(&block.parent(), &block.merkle_root);

    key.verify(payload.as_bytes(), &signature)
        .map_err(|_| invalid())
}

/// Compare the embedded previous-block claims with the local previous header.
///
/// The rollbacks hash is compared first. Block 1 always matches.
pub fn check_hash(block: &Block) -> HashCheck {
    let Some(prev) = block.prev_header.as_ref() else {
        return HashCheck::Matched;
    };

    if prev.rollbacks_hash != block.prev_rollbacks_hash {
        return HashCheck::RollbacksMismatch;
    }
    if prev.hash != block.prev_hash {
        return HashCheck::Mismatch;
    }
    HashCheck::Matched
}

/// Check that the block follows `prev_block_id` and that its producer is known.
///
/// Returns the producer's public key.
pub fn check_linkage(
    block: &Block,
    prev_block_id: BlockId,
    producers: &dyn ProducerKeys,
) -> Result<Ed25519PublicKey, LinkageError> {
    let expected = prev_block_id + 1;
    if block.id() != expected {
        return Err(LinkageError::BlockIdMismatch {
            expected,
            actual: block.id(),
        });
    }

    producers
        .public_key(block.header.node_position)
        .ok_or(LinkageError::UnknownProducer {
            position: block.header.node_position,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::producers::ProducerSet;
    use shared_crypto::{Ed25519KeyPair, ZERO_HASH};

    fn signed_block(keypair: &Ed25519KeyPair, prev: Option<BlockHeader>) -> Block {
        let id = prev.as_ref().map(|p| p.block_id).unwrap_or(0) + 1;
        let header = BlockHeader {
            block_id: id,
            time: 1_700_000_000,
            ecosystem_id: 1,
            key_id: vec![1, 2, 3],
            node_position: 0,
            ..Default::default()
        };
        let (prev_hash, prev_rb) = prev
            .as_ref()
            .map(|p| (p.hash, p.rollbacks_hash))
            .unwrap_or((ZERO_HASH, ZERO_HASH));
        let mut block = Block::new(header, prev_hash, prev_rb, vec![b"tx-1".to_vec()]);
        block.prev_header = prev;
        let payload = block.header.for_sign(&block.parent(), &block.merkle_root);
        block.header.signature = keypair.sign(payload.as_bytes()).as_bytes().to_vec();
        block
    }

    #[test]
    fn test_decode_encoded_block() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let block = signed_block(&keypair, None);

        let bytes = encode(&block).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded.header, block.header);
        assert_eq!(decoded.merkle_root, block.merkle_root);
        assert!(decoded.prev_header.is_none());
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let bytes = encode(&signed_block(&keypair, None)).unwrap();

        assert!(matches!(
            decode(&bytes[..bytes.len() / 2]),
            Err(CodecError::MalformedBlock(_))
        ));
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let mut bytes = encode(&signed_block(&keypair, None)).unwrap();
        bytes.push(0);

        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_rejects_zero_block_id() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let mut block = signed_block(&keypair, None);
        block.header.block_id = 0;
        let bytes = encode(&block).unwrap();

        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_signature_verifies_against_prev_header() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let prev = BlockHeader {
            block_id: 4,
            hash: [4u8; 32],
            ..Default::default()
        };
        let block = signed_block(&keypair, Some(prev));

        assert!(verify_signature(&block, &keypair.public_key()).is_ok());
    }

    #[test]
    fn test_signature_fails_on_different_prev_header() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let prev = BlockHeader {
            block_id: 4,
            hash: [4u8; 32],
            ..Default::default()
        };
        let mut block = signed_block(&keypair, Some(prev.clone()));
        block.prev_header = Some(BlockHeader {
            hash: [8u8; 32],
            ..prev
        });

        assert_eq!(
            verify_signature(&block, &keypair.public_key()),
            Err(SignatureError::InvalidSignature { block_id: 5 })
        );
    }

    #[test]
    fn test_signature_rejects_wrong_length() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let mut block = signed_block(&keypair, None);
        block.header.signature.truncate(10);

        assert!(verify_signature(&block, &keypair.public_key()).is_err());
    }

    #[test]
    fn test_check_hash_outcomes() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let prev = BlockHeader {
            block_id: 4,
            hash: [4u8; 32],
            rollbacks_hash: [6u8; 32],
            ..Default::default()
        };
        let mut block = signed_block(&keypair, Some(prev.clone()));
        assert_eq!(check_hash(&block), HashCheck::Matched);

        block.prev_hash = [0xEE; 32];
        assert_eq!(check_hash(&block), HashCheck::Mismatch);
        assert_eq!(HashCheck::Mismatch.replace_count(), Some(1));

        block.prev_rollbacks_hash = [0xEE; 32];
        assert_eq!(check_hash(&block), HashCheck::RollbacksMismatch);
        assert_eq!(HashCheck::RollbacksMismatch.replace_count(), Some(2));
    }

    #[test]
    fn test_check_hash_first_block_matches() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let mut block = signed_block(&keypair, None);
        block.prev_hash = [1u8; 32];
        assert_eq!(check_hash(&block), HashCheck::Matched);
    }

    #[test]
    fn test_content_hash_depends_on_prev() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let mut block = signed_block(&keypair, None);
        let first = compute_content_hash(&block);

        block.prev_header = Some(BlockHeader {
            hash: [1u8; 32],
            ..Default::default()
        });
        assert_ne!(first, compute_content_hash(&block));
    }

    #[test]
    fn test_check_linkage() {
        let keypair = Ed25519KeyPair::from_seed([5u8; 32]);
        let producers = ProducerSet::new(vec![keypair.public_key()]);
        let mut block = signed_block(&keypair, None);

        assert_eq!(
            check_linkage(&block, 0, &producers).unwrap(),
            keypair.public_key()
        );
        assert_eq!(
            check_linkage(&block, 3, &producers),
            Err(LinkageError::BlockIdMismatch {
                expected: 4,
                actual: 1
            })
        );

        block.header.node_position = 7;
        assert_eq!(
            check_linkage(&block, 0, &producers),
            Err(LinkageError::UnknownProducer { position: 7 })
        );
    }
}
