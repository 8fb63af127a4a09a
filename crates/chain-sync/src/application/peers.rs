//! Peer selection.

use crate::domain::{BlockId, Host, PeerError};
use crate::ports::PeerClient;
use futures::future::join_all;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Query every candidate concurrently and pick the one with the highest tip.
///
/// Candidates that fail or time out are skipped. Ties go to the earlier
/// candidate. Fails with `NodesUnavailable` when nobody answers.
pub async fn best_peer(
    client: &dyn PeerClient,
    candidates: &[Host],
    per_peer_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(Host, BlockId), PeerError> {
    if candidates.is_empty() {
        return Err(PeerError::NodesUnavailable);
    }

    let queries = candidates.iter().map(|host| async move {
        let answer = match timeout(per_peer_timeout, client.get_max_block_id(host)).await {
            Ok(answer) => answer,
            Err(_) => Err(PeerError::Timeout {
                host: host.to_string(),
            }),
        };
        (host, answer)
    });

    let answers = tokio::select! {
        _ = cancel.cancelled() => return Err(PeerError::Cancelled),
        answers = join_all(queries) => answers,
    };

    let mut best: Option<(Host, BlockId)> = None;
    for (host, answer) in answers {
        match answer {
            Ok(tip) => {
                tracing::debug!("[chain-sync] peer {} reports tip {}", host, tip);
                if best.as_ref().map_or(true, |(_, best_tip)| tip > *best_tip) {
                    best = Some((host.clone(), tip));
                }
            }
            Err(e) => tracing::debug!("[chain-sync] peer {} unavailable: {}", host, e),
        }
    }

    best.ok_or(PeerError::NodesUnavailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockPeerNetwork;

    fn network() -> MockPeerNetwork {
        let net = MockPeerNetwork::new(10);
        net.add_peer(&Host::new("a:1"), vec![vec![]; 5]);
        net.add_peer(&Host::new("b:1"), vec![vec![]; 8]);
        net.add_peer(&Host::new("c:1"), vec![vec![]; 8]);
        net
    }

    #[tokio::test]
    async fn test_highest_tip_wins_first_on_tie() {
        let net = network();
        let hosts = vec![Host::new("a:1"), Host::new("b:1"), Host::new("c:1")];

        let (host, tip) = best_peer(&net, &hosts, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(host, Host::new("b:1"));
        assert_eq!(tip, 8);
    }

    #[tokio::test]
    async fn test_unreachable_peers_skipped() {
        let net = network();
        net.set_unreachable(&Host::new("b:1"), true);
        let hosts = vec![Host::new("b:1"), Host::new("a:1")];

        let (host, _) = best_peer(&net, &hosts, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(host, Host::new("a:1"));
    }

    #[tokio::test]
    async fn test_slow_peer_times_out() {
        let net = network();
        net.set_delay(&Host::new("b:1"), Duration::from_secs(5));
        let hosts = vec![Host::new("b:1")];

        let result = best_peer(
            &net,
            &hosts,
            Duration::from_millis(20),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(result, Err(PeerError::NodesUnavailable));
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let net = network();
        let result = best_peer(&net, &[], Duration::from_secs(1), &CancellationToken::new()).await;
        assert_eq!(result, Err(PeerError::NodesUnavailable));
    }
}
