//! # Catch-up Scenarios
//!
//! A node behind an honest peer, driven through the coordinator exactly as
//! the node runtime drives it.

#[cfg(test)]
mod tests {
    use chain_sync::adapters::{BanList, FileBootstrap};
    use chain_sync::ports::KeyValueStore;
    use chain_sync::storage::keys::{rollback_key_block, REGISTRY_PREFIX, ROLLBACK_PREFIX};
    use chain_sync::test_utils::{ChainFixture, TestNode};
    use chain_sync::{ChainSyncApi, SyncCoordinator, SyncError, SyncOutcome};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn coordinator(node: &TestNode) -> Arc<SyncCoordinator> {
        Arc::new(SyncCoordinator::new(node.deps.clone(), node.config.clone()))
    }

    fn registry_state(store: &dyn KeyValueStore) -> Vec<(String, Vec<u8>)> {
        store.prefix_scan(REGISTRY_PREFIX).unwrap()
    }

    fn rollback_blocks(store: &dyn KeyValueStore) -> Vec<i64> {
        let mut blocks: Vec<i64> = store
            .prefix_scan(ROLLBACK_PREFIX)
            .unwrap()
            .iter()
            .filter_map(|(key, _)| rollback_key_block(key))
            .collect();
        blocks.dedup();
        blocks
    }

    // =========================================================================
    // CATCH-UP
    // =========================================================================

    #[tokio::test]
    async fn test_catch_up_retires_old_rollbacks() {
        let fixture = ChainFixture::new(3).with_blocks(13);
        let mut node = TestNode::with_chain(&fixture, 10);
        node.config.rollback_blocks = 3;
        node.serve(&fixture);

        let outcome = coordinator(&node)
            .trigger(&CancellationToken::new())
            .await
            .unwrap();

        let SyncOutcome::Updated(report) = outcome else {
            panic!("expected an update");
        };
        assert_eq!((report.start_tip, report.end_tip), (10, 13));
        assert_eq!(report.blocks_applied, 3);
        assert_eq!(report.forks_resolved, 0);

        let tip = node.tip();
        assert_eq!(tip.block_id, 13);
        assert_eq!(tip.hash, fixture.header(13).hash);
        assert_eq!(tip.rollbacks_hash, fixture.header(13).rollbacks_hash);

        assert_eq!(
            registry_state(node.store.as_ref()),
            registry_state(fixture.store())
        );
        assert_eq!(rollback_blocks(node.store.as_ref()), vec![11, 12, 13]);
    }

    #[tokio::test]
    async fn test_second_pass_is_up_to_date() {
        let fixture = ChainFixture::new(2).with_blocks(7);
        let node = TestNode::with_chain(&fixture, 2);
        node.serve(&fixture);
        let coordinator = coordinator(&node);
        let cancel = CancellationToken::new();

        assert!(matches!(
            coordinator.sync(&cancel).await.unwrap(),
            SyncOutcome::Updated(_)
        ));
        assert_eq!(
            coordinator.sync(&cancel).await.unwrap(),
            SyncOutcome::UpToDate { tip: 7 }
        );
    }

    #[tokio::test]
    async fn test_first_load_then_catch_up() {
        let fixture = ChainFixture::new(3).with_blocks(9);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("first.block");
        std::fs::write(&path, &fixture.raw_blocks()[0]).unwrap();

        let mut node = TestNode::new(&fixture);
        node.deps.bootstrap = Some(Arc::new(FileBootstrap::new(path)));
        node.serve(&fixture);
        let coordinator = coordinator(&node);
        let cancel = CancellationToken::new();

        assert_eq!(
            coordinator.trigger(&cancel).await.unwrap(),
            SyncOutcome::FirstLoad { tip: 1 }
        );
        assert!(matches!(
            coordinator.trigger(&cancel).await.unwrap(),
            SyncOutcome::Updated(_)
        ));
        assert_eq!(node.tip().hash, fixture.header(9).hash);
    }

    // =========================================================================
    // SINGLE FLIGHT AND LOCKING
    // =========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_run_one_pass() {
        let fixture = ChainFixture::new(3).with_blocks(16);
        let node = TestNode::with_chain(&fixture, 4);
        node.serve(&fixture);
        node.network.set_delay(&node.peer, Duration::from_millis(40));
        let coordinator = coordinator(&node);
        let cancel = CancellationToken::new();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let coordinator = coordinator.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { coordinator.trigger(&cancel).await })
            })
            .collect();

        let mut updated = 0;
        let mut skipped = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                SyncOutcome::Updated(_) => updated += 1,
                SyncOutcome::AlreadyRunning => skipped += 1,
                other => panic!("unexpected outcome {:?}", other),
            }
        }

        assert_eq!((updated, skipped), (1, 3));
        assert_eq!(node.tip().block_id, 16);
        assert!(!coordinator.is_syncing());
    }

    #[tokio::test]
    async fn test_pass_waits_for_chain_readers() {
        let fixture = ChainFixture::new(3).with_blocks(6);
        let node = TestNode::with_chain(&fixture, 3);
        node.serve(&fixture);
        let coordinator = coordinator(&node);
        let lock = coordinator.chain_lock();
        let reader = lock.read().await;

        let cancel = CancellationToken::new();
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            timer.cancel();
        });

        let err = coordinator.trigger(&cancel).await.unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(node.tip().block_id, 3);

        drop(reader);
        assert!(matches!(
            coordinator.trigger(&CancellationToken::new()).await.unwrap(),
            SyncOutcome::Updated(_)
        ));
        assert_eq!(node.tip().block_id, 6);
    }

    // =========================================================================
    // CANCELLATION
    // =========================================================================

    #[tokio::test]
    async fn test_cancel_mid_pass_keeps_committed_prefix() {
        let fixture = ChainFixture::new(3).with_blocks(13);
        let node = TestNode::with_chain(&fixture, 2);
        node.serve(&fixture);
        node.network.set_delay(&node.peer, Duration::from_millis(50));
        let coordinator = coordinator(&node);

        let cancel = CancellationToken::new();
        let timer = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            timer.cancel();
        });

        let err = coordinator.trigger(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!coordinator.is_syncing());

        let tip = node.tip();
        assert!(tip.block_id >= 2);
        assert_eq!(tip.hash, fixture.header(tip.block_id).hash);

        node.network.set_delay(&node.peer, Duration::ZERO);
        coordinator.trigger(&CancellationToken::new()).await.unwrap();
        assert_eq!(node.tip().hash, fixture.header(13).hash);
    }

    // =========================================================================
    // BAD PEERS
    // =========================================================================

    #[tokio::test]
    async fn test_repeat_offender_is_banned() {
        let mut fixture = ChainFixture::new(3).with_blocks(13);
        fixture.corrupt_rollbacks_hash(12);
        let mut node = TestNode::with_chain(&fixture, 10);
        node.serve(&fixture);
        node.config.ban.incorrect_blocks_per_day = 2;
        let bans = Arc::new(BanList::new(node.config.ban.clone(), vec![node.peer.clone()]));
        node.deps.reputation = bans.clone();
        let coordinator = coordinator(&node);
        let cancel = CancellationToken::new();

        let first = coordinator.trigger(&cancel).await.unwrap_err();
        assert!(first.is_ban_worthy());
        assert_eq!(node.tip().block_id, 11);
        assert_eq!(bans.bad_blocks(&node.peer), 1);
        assert!(!bans.is_banned(&node.peer));

        let second = coordinator.trigger(&cancel).await.unwrap_err();
        assert!(second.is_ban_worthy());
        assert!(bans.is_banned(&node.peer));

        let third = coordinator.trigger(&cancel).await.unwrap_err();
        assert!(matches!(third, SyncError::PeerUnavailable));
        assert_eq!(node.tip().block_id, 11);
    }
}
