//! # Sync over TCP
//!
//! Nodes talking through the real block server and peer client on loopback.

#[cfg(test)]
mod tests {
    use chain_sync::adapters::{BlockServer, InMemoryKVStore, TcpPeerClient};
    use chain_sync::test_utils::{ChainFixture, TestNode};
    use chain_sync::{DesyncMonitor, Host, SyncCoordinator, SyncOutcome};
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    /// Serve `fixture`'s whole chain on an ephemeral port.
    async fn serve(fixture: &ChainFixture, cancel: &CancellationToken) -> Host {
        let store = Arc::new(InMemoryKVStore::new());
        fixture.install(store.clone(), fixture.tip());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let host = Host::new(listener.local_addr().unwrap().to_string());
        let server = Arc::new(BlockServer::new(store, 5));
        tokio::spawn(server.serve(listener, cancel.child_token()));
        host
    }

    /// Node holding `local`'s first `up_to` blocks, syncing from `remote` over TCP.
    fn tcp_node(local: &ChainFixture, up_to: i64, remote: Host) -> TestNode {
        let mut node = TestNode::with_chain(local, up_to);
        node.deps.peers = Arc::new(TcpPeerClient::new(&node.config));
        node.config.remote_peers = vec![remote];
        node
    }

    #[tokio::test]
    async fn test_catch_up_over_tcp() {
        let cancel = CancellationToken::new();
        let fixture = ChainFixture::new(3).with_blocks(12);
        let remote = serve(&fixture, &cancel).await;
        let node = tcp_node(&fixture, 3, remote);

        let outcome = SyncCoordinator::new(node.deps.clone(), node.config.clone())
            .trigger(&cancel)
            .await
            .unwrap();

        let SyncOutcome::Updated(report) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(report.blocks_applied, 9);
        assert_eq!(node.tip().hash, fixture.header(12).hash);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_fork_over_tcp() {
        let cancel = CancellationToken::new();
        let local = ChainFixture::new(3).with_blocks(10);
        let fork = local.diverge_at(9).with_blocks(4);
        let remote = serve(&fork, &cancel).await;
        let node = tcp_node(&local, 10, remote);

        let outcome = SyncCoordinator::new(node.deps.clone(), node.config.clone())
            .trigger(&cancel)
            .await
            .unwrap();

        let SyncOutcome::Updated(report) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(report.forks_resolved, 1);
        assert_eq!(node.tip().hash, fork.header(12).hash);
        assert_eq!(node.tip().rollbacks_hash, fork.header(12).rollbacks_hash);
        cancel.cancel();
    }

    #[tokio::test]
    async fn test_desync_monitor_over_tcp() {
        let cancel = CancellationToken::new();
        let main = ChainFixture::new(3).with_blocks(8);
        let split = main.diverge_at(6).with_blocks(3);
        let hosts = vec![
            serve(&main, &cancel).await,
            serve(&main, &cancel).await,
            serve(&split, &cancel).await,
        ];

        let config = chain_sync::SyncConfig::for_testing();
        let monitor = DesyncMonitor::new(Arc::new(TcpPeerClient::new(&config)), config.peer_timeout());

        let report = monitor.check(&hosts).await.unwrap();
        assert_eq!(report.block_id, 8);
        assert!(!report.is_synced());
        let mut sizes: Vec<usize> = report.groups.values().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);

        let agreeing = monitor.check(&hosts[..2]).await.unwrap();
        assert!(agreeing.is_synced());
        cancel.cancel();
    }
}
