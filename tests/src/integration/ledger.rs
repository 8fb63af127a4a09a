//! # Rollback Ledger Properties
//!
//! Random mutation histories checked against the guarantees fork
//! resolution relies on.

#[cfg(test)]
mod tests {
    use chain_sync::adapters::InMemoryKVStore;
    use chain_sync::domain::Registry;
    use chain_sync::{RollbackLedger, StoreTransaction};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shared_crypto::Hash;
    use std::sync::Arc;

    fn registry() -> Registry {
        Registry::new("accounts", 1)
    }

    /// Apply `ops` random sets and deletes to `block_id`, returning how many were recorded.
    fn mutate(txn: &mut StoreTransaction, rng: &mut StdRng, block_id: i64, ops: usize) -> usize {
        let mut ledger = RollbackLedger::new(txn);
        let before = ledger.records(block_id).unwrap().len();
        for n in 0..ops {
            let tx_hash: Hash = [n as u8; 32];
            let key = format!("acct-{}", rng.gen_range(0..6));
            if rng.gen_bool(0.2) {
                ledger
                    .registry_delete(block_id, &tx_hash, &registry(), &key)
                    .unwrap();
            } else {
                let value = rng.gen_range(0..1000).to_string();
                ledger
                    .registry_set(block_id, &tx_hash, &registry(), &key, &value)
                    .unwrap();
            }
        }
        ledger.records(block_id).unwrap().len() - before
    }

    // =========================================================================
    // RESTORATION
    // =========================================================================

    #[test]
    fn test_reverse_rollback_restores_every_snapshot() {
        let mut rng = StdRng::seed_from_u64(7);
        let store = Arc::new(InMemoryKVStore::new());
        let mut snapshots = Vec::new();

        for block_id in 1..=8 {
            snapshots.push(store.snapshot());
            let ops = rng.gen_range(1..12);
            let mut txn = StoreTransaction::begin(store.clone());
            mutate(&mut txn, &mut rng, block_id, ops);
            txn.commit().unwrap();
        }

        for block_id in (1..=8).rev() {
            let mut txn = StoreTransaction::begin(store.clone());
            RollbackLedger::new(&mut txn).rollback_state(block_id).unwrap();
            txn.commit().unwrap();
            assert_eq!(
                store.snapshot(),
                snapshots[(block_id - 1) as usize],
                "after rolling back block {}",
                block_id
            );
        }
    }

    #[test]
    fn test_rollback_in_one_transaction_matches_stepwise() {
        let mut rng = StdRng::seed_from_u64(11);
        let store = Arc::new(InMemoryKVStore::new());
        let start = store.snapshot();
        for block_id in 1..=5 {
            let mut txn = StoreTransaction::begin(store.clone());
            mutate(&mut txn, &mut rng, block_id, 10);
            txn.commit().unwrap();
        }

        let mut txn = StoreTransaction::begin(store.clone());
        {
            let mut ledger = RollbackLedger::new(&mut txn);
            for block_id in (1..=5).rev() {
                ledger.rollback_state(block_id).unwrap();
            }
        }
        txn.commit().unwrap();
        assert_eq!(store.snapshot(), start);
    }

    // =========================================================================
    // COUNTERS
    // =========================================================================

    #[test]
    fn test_every_save_gets_the_next_counter() {
        let mut rng = StdRng::seed_from_u64(3);
        let store = Arc::new(InMemoryKVStore::new());

        let mut expected = 0;
        for _ in 0..4 {
            let ops = rng.gen_range(1..8);
            let mut txn = StoreTransaction::begin(store.clone());
            expected += mutate(&mut txn, &mut rng, 42, ops);
            txn.commit().unwrap();
        }

        let mut txn = StoreTransaction::begin(store);
        let counters: Vec<u64> = RollbackLedger::new(&mut txn)
            .records(42)
            .unwrap()
            .iter()
            .map(|(_, record)| record.counter)
            .collect();
        assert_eq!(counters, (1..=expected as u64).collect::<Vec<_>>());
    }

    #[test]
    fn test_digest_depends_only_on_history() {
        let replay = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            let store = Arc::new(InMemoryKVStore::new());
            let mut txn = StoreTransaction::begin(store);
            mutate(&mut txn, &mut rng, 9, 15);
            RollbackLedger::new(&mut txn).block_digest(9).unwrap()
        };

        assert_eq!(replay(5), replay(5));
        assert_ne!(replay(5), replay(6));
    }
}
