//! # Fork Scenarios
//!
//! The local node holds blocks `1..=10`; its peer follows a branch that
//! leaves the shared history at block 9.

#[cfg(test)]
mod tests {
    use chain_sync::ports::KeyValueStore;
    use chain_sync::storage::chain::committed_block;
    use chain_sync::storage::keys::REGISTRY_PREFIX;
    use chain_sync::test_utils::{ChainFixture, TestNode};
    use chain_sync::{SyncCoordinator, SyncError, SyncOutcome};
    use rand::Rng;
    use tokio_util::sync::CancellationToken;

    fn registry_state(store: &dyn KeyValueStore) -> Vec<(String, Vec<u8>)> {
        store.prefix_scan(REGISTRY_PREFIX).unwrap()
    }

    async fn sync_once(node: &TestNode) -> Result<SyncOutcome, SyncError> {
        SyncCoordinator::new(node.deps.clone(), node.config.clone())
            .trigger(&CancellationToken::new())
            .await
    }

    fn local_and_peer(fork: impl Fn(&ChainFixture) -> ChainFixture) -> (ChainFixture, TestNode) {
        let local = ChainFixture::new(3).with_blocks(10);
        let node = TestNode::with_chain(&local, 10);
        let peer = fork(&local);
        node.serve(&peer);
        (peer, node)
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    #[tokio::test]
    async fn test_fork_replaces_local_tail() {
        let (peer, node) = local_and_peer(|local| local.fork_at(9).with_blocks(3));
        node.tx_pool.insert_verified([0x42; 32]);

        let SyncOutcome::Updated(report) = sync_once(&node).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(report.forks_resolved, 1);
        assert_eq!(report.end_tip, 11);

        for id in 9..=11 {
            let stored = committed_block(node.store.as_ref(), id).unwrap().unwrap();
            assert_eq!(stored.header.hash, peer.header(id).hash);
        }
        assert_eq!(node.tip().hash, peer.header(11).hash);
        assert_eq!(node.tx_pool.unverified(), 1);
    }

    #[tokio::test]
    async fn test_state_fork_restores_prefix_state() {
        let (peer, node) = local_and_peer(|local| local.diverge_at(9).with_blocks(3));

        sync_once(&node).await.unwrap();

        assert_eq!(node.tip().rollbacks_hash, peer.header(11).rollbacks_hash);
        assert_eq!(
            registry_state(node.store.as_ref()),
            registry_state(peer.store())
        );
    }

    #[tokio::test]
    async fn test_random_fork_points_converge() {
        let mut rng = rand::thread_rng();
        for _ in 0..3 {
            let height = rng.gen_range(2..=10);
            let extra = rng.gen_range(1..=4);
            let blocks = 12 - height as usize + extra;
            let (peer, node) = local_and_peer(|local| local.diverge_at(height).with_blocks(blocks));

            sync_once(&node).await.unwrap();

            assert_eq!(node.tip().hash, peer.header(peer.tip()).hash);
            assert_eq!(
                registry_state(node.store.as_ref()),
                registry_state(peer.store()),
                "fork at {}",
                height
            );
        }
    }

    // =========================================================================
    // ATOMICITY
    // =========================================================================

    #[tokio::test]
    async fn test_bad_candidate_leaves_chain_untouched() {
        let (_, node) = local_and_peer(|local| {
            let mut fork = local.fork_at(9).with_blocks(3);
            fork.corrupt_rollbacks_hash(10);
            fork
        });
        let before = node.store.snapshot();

        let err = sync_once(&node).await.unwrap_err();

        assert!(matches!(err, SyncError::ResolutionFailed { .. }));
        assert!(err.is_ban_worthy());
        assert_eq!(node.store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_chain_untouched() {
        let (peer, node) = local_and_peer(|local| local.fork_at(9).with_blocks(3));
        let before = node.store.snapshot();
        node.store.fail_batches_touching("chain/info");

        let err = sync_once(&node).await.unwrap_err();
        assert!(!err.is_ban_worthy());
        assert_eq!(node.store.snapshot(), before);

        node.store.clear_faults();
        sync_once(&node).await.unwrap();
        assert_eq!(node.tip().hash, peer.header(11).hash);
    }

    #[tokio::test]
    async fn test_fork_beyond_horizon_is_refused() {
        let (_, mut node) = local_and_peer(|local| local.fork_at(5).with_blocks(7));
        node.config.rollback_blocks = 3;
        let before = node.store.snapshot();

        let err = sync_once(&node).await.unwrap_err();

        let SyncError::ResolutionFailed { source, .. } = err else {
            panic!("expected a failed resolution");
        };
        assert!(matches!(*source, SyncError::NoCommonAncestor { .. }));
        assert_eq!(node.store.snapshot(), before);
    }
}
