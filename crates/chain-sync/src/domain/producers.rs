//! Producer key lookup by position.

use shared_crypto::Ed25519PublicKey;

/// Resolves a producer position to its public key.
pub trait ProducerKeys: Send + Sync {
    /// Public key registered at `position`, if any.
    fn public_key(&self, position: i64) -> Option<Ed25519PublicKey>;

    /// Number of registered producers.
    fn len(&self) -> usize;

    /// True when no producer is registered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed producer set, indexed by position.
#[derive(Clone, Debug, Default)]
pub struct ProducerSet {
    keys: Vec<Ed25519PublicKey>,
}

impl ProducerSet {
    /// Create from keys in position order.
    pub fn new(keys: Vec<Ed25519PublicKey>) -> Self {
        Self { keys }
    }
}

impl ProducerKeys for ProducerSet {
    fn public_key(&self, position: i64) -> Option<Ed25519PublicKey> {
        usize::try_from(position)
            .ok()
            .and_then(|idx| self.keys.get(idx))
            .copied()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}
