//! In-process peer network for tests.
//!
//! Each host serves a list of raw blocks (index `i` holds block `i + 1`).
//! Hosts can be made unreachable, slow, or made to drop a body stream
//! part-way through.

use super::wire::window_ids;
use crate::domain::{codec, BlockHeader, BlockId, Host, PeerError};
use crate::ports::{BlockStream, PeerClient};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct MockPeer {
    blocks: Vec<Vec<u8>>,
    reported_tip: Option<BlockId>,
    unreachable: bool,
    fail_after: Option<usize>,
    delay: Option<Duration>,
}

/// Simulated peers.
pub struct MockPeerNetwork {
    peers: RwLock<HashMap<Host, MockPeer>>,
    window: u32,
    buffer: usize,
    body_requests: AtomicUsize,
}

impl MockPeerNetwork {
    /// Network whose peers serve `window` blocks per body request.
    pub fn new(window: u32) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            window,
            buffer: 2,
            body_requests: AtomicUsize::new(0),
        }
    }

    /// Add or replace a peer serving `blocks`.
    pub fn add_peer(&self, host: &Host, blocks: Vec<Vec<u8>>) {
        self.peers.write().insert(
            host.clone(),
            MockPeer {
                blocks,
                ..Default::default()
            },
        );
    }

    /// Make a peer refuse connections.
    pub fn set_unreachable(&self, host: &Host, unreachable: bool) {
        self.update(host, |p| p.unreachable = unreachable);
    }

    /// Override the tip a peer reports.
    pub fn set_reported_tip(&self, host: &Host, tip: BlockId) {
        self.update(host, |p| p.reported_tip = Some(tip));
    }

    /// Deliver `count` blocks per stream, then fail with an I/O error.
    pub fn fail_stream_after(&self, host: &Host, count: usize) {
        self.update(host, |p| p.fail_after = Some(count));
    }

    /// Delay every response from a peer.
    pub fn set_delay(&self, host: &Host, delay: Duration) {
        self.update(host, |p| p.delay = Some(delay));
    }

    /// Body requests served so far.
    pub fn body_requests(&self) -> usize {
        self.body_requests.load(Ordering::SeqCst)
    }

    fn update(&self, host: &Host, f: impl FnOnce(&mut MockPeer)) {
        if let Some(peer) = self.peers.write().get_mut(host) {
            f(peer);
        }
    }

    async fn reach(&self, host: &Host) -> Result<MockPeer, PeerError> {
        let peer = self
            .peers
            .read()
            .get(host)
            .cloned()
            .ok_or_else(|| PeerError::Connect {
                host: host.to_string(),
                message: "unknown host".into(),
            })?;
        if let Some(delay) = peer.delay {
            tokio::time::sleep(delay).await;
        }
        if peer.unreachable {
            return Err(PeerError::Connect {
                host: host.to_string(),
                message: "connection refused".into(),
            });
        }
        Ok(peer)
    }
}

#[async_trait]
impl PeerClient for MockPeerNetwork {
    async fn get_max_block_id(&self, host: &Host) -> Result<BlockId, PeerError> {
        let peer = self.reach(host).await?;
        Ok(peer
            .reported_tip
            .unwrap_or(peer.blocks.len() as BlockId))
    }

    async fn get_blocks_bodies(
        &self,
        host: &Host,
        from: BlockId,
        reverse: bool,
        cancel: CancellationToken,
    ) -> Result<BlockStream, PeerError> {
        let peer = self.reach(host).await?;
        self.body_requests.fetch_add(1, Ordering::SeqCst);

        let ids = window_ids(from, reverse, self.window, peer.blocks.len() as BlockId);
        let (sender, stream) = BlockStream::channel(self.buffer, cancel);
        let host = host.clone();

        tokio::spawn(async move {
            for (sent, id) in ids.into_iter().enumerate() {
                if peer.fail_after == Some(sent) {
                    sender
                        .send(Err(PeerError::Io {
                            host: host.to_string(),
                            message: "connection reset".into(),
                        }))
                        .await;
                    return;
                }
                let raw = peer.blocks[(id - 1) as usize].clone();
                if !sender.send(Ok(raw)).await {
                    return;
                }
            }
        });

        Ok(stream)
    }

    async fn get_block_info(
        &self,
        host: &Host,
        block_id: BlockId,
    ) -> Result<BlockHeader, PeerError> {
        let peer = self.reach(host).await?;
        let raw = usize::try_from(block_id - 1)
            .ok()
            .and_then(|idx| peer.blocks.get(idx))
            .ok_or_else(|| PeerError::Protocol {
                host: host.to_string(),
                message: format!("block {} not found", block_id),
            })?;
        codec::decode(raw)
            .map(|block| block.header)
            .map_err(|e| PeerError::Protocol {
                host: host.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> (MockPeerNetwork, Host) {
        let net = MockPeerNetwork::new(2);
        let host = Host::new("peer-a:7078");
        net.add_peer(&host, vec![vec![1], vec![2], vec![3]]);
        (net, host)
    }

    #[tokio::test]
    async fn test_tip_and_window() {
        let (net, host) = network();
        assert_eq!(net.get_max_block_id(&host).await.unwrap(), 3);

        let mut stream = net
            .get_blocks_bodies(&host, 2, false, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(Ok(vec![2])));
        assert_eq!(stream.next().await, Some(Ok(vec![3])));
        assert_eq!(stream.next().await, None);
        assert_eq!(net.body_requests(), 1);
    }

    #[tokio::test]
    async fn test_stream_failure_midway() {
        let (net, host) = network();
        net.fail_stream_after(&host, 1);

        let mut stream = net
            .get_blocks_bodies(&host, 1, false, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stream.next().await, Some(Ok(vec![1])));
        assert!(matches!(stream.next().await, Some(Err(PeerError::Io { .. }))));
    }

    #[tokio::test]
    async fn test_unreachable_and_unknown_hosts() {
        let (net, host) = network();
        net.set_unreachable(&host, true);

        assert!(net.get_max_block_id(&host).await.is_err());
        assert!(net.get_max_block_id(&Host::new("nowhere:1")).await.is_err());
    }
}
