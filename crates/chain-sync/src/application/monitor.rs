//! # Desync Monitor
//!
//! Compares the rollbacks hash of one block across a set of nodes. Every
//! honest node that played the same chain holds the same hash; more than
//! one distinct value means the network has split.

use crate::domain::{BlockId, Host, PeerError};
use crate::ports::PeerClient;
use futures::future::join_all;
use shared_crypto::to_hex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Nodes grouped by the rollbacks hash they report for one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesyncReport {
    /// Block compared, the lowest tip among the nodes.
    pub block_id: BlockId,
    /// Hex rollbacks hash to the nodes reporting it.
    pub groups: BTreeMap<String, Vec<Host>>,
}

impl DesyncReport {
    /// All nodes agree.
    pub fn is_synced(&self) -> bool {
        self.groups.len() <= 1
    }
}

/// Checks rollbacks hash agreement across nodes.
pub struct DesyncMonitor {
    client: Arc<dyn PeerClient>,
    per_node_timeout: Duration,
}

impl DesyncMonitor {
    /// Monitor querying through `client`.
    pub fn new(client: Arc<dyn PeerClient>, per_node_timeout: Duration) -> Self {
        Self {
            client,
            per_node_timeout,
        }
    }

    /// Compare `nodes` at the lowest tip any of them reports.
    ///
    /// Any node failing to answer fails the whole check.
    pub async fn check(&self, nodes: &[Host]) -> Result<DesyncReport, PeerError> {
        if nodes.is_empty() {
            return Err(PeerError::NodesUnavailable);
        }

        let tips = join_all(nodes.iter().map(|host| async move {
            self.bounded(host, self.client.get_max_block_id(host)).await
        }))
        .await;
        let mut block_id = BlockId::MAX;
        for tip in tips {
            block_id = block_id.min(tip?);
        }

        let headers = join_all(nodes.iter().map(|host| async move {
            let header = self
                .bounded(host, self.client.get_block_info(host, block_id))
                .await?;
            Ok::<_, PeerError>((host.clone(), header))
        }))
        .await;

        let mut groups: BTreeMap<String, Vec<Host>> = BTreeMap::new();
        for answer in headers {
            let (host, header) = answer?;
            groups
                .entry(to_hex(&header.rollbacks_hash))
                .or_default()
                .push(host);
        }

        let report = DesyncReport { block_id, groups };
        if report.is_synced() {
            tracing::info!("[chain-sync] {} nodes agree at block {}", nodes.len(), block_id);
        } else {
            for (hash, hosts) in &report.groups {
                tracing::warn!(
                    "[chain-sync] block {} rollbacks hash {}: {:?}",
                    block_id,
                    hash,
                    hosts
                );
            }
        }
        Ok(report)
    }

    async fn bounded<T>(
        &self,
        host: &Host,
        query: impl std::future::Future<Output = Result<T, PeerError>>,
    ) -> Result<T, PeerError> {
        timeout(self.per_node_timeout, query)
            .await
            .map_err(|_| PeerError::Timeout {
                host: host.to_string(),
            })?
    }
}
