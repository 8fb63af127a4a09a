//! Desync Monitor: checks that ledger nodes agree on their rollback hashes.
//!
//! Queries every node for its tip, compares the rollbacks hash of the lowest
//! common block and logs an alert when the nodes split into more than one
//! group. Runs once, or periodically with `--daemon`.

use std::time::Duration;

use anyhow::{bail, Result};
use chain_sync::adapters::TcpPeerClient;
use chain_sync::{DesyncMonitor, DesyncReport, Host, SyncConfig};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Desync Monitor: compare rollback hashes across ledger nodes
#[derive(Parser, Debug)]
#[command(name = "desync-monitor")]
#[command(about = "Detects ledger nodes whose state has diverged")]
struct Args {
    /// Node addresses (host:port), comma-separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    nodes: Vec<String>,

    /// Keep running and check every `period` seconds
    #[arg(short, long)]
    daemon: bool,

    /// Querying period in daemon mode, in seconds
    #[arg(short, long, default_value = "60")]
    period: u64,

    /// Per-node timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,
}

fn log_report(report: &DesyncReport) {
    if report.is_synced() {
        info!("Nodes in sync at block {}", report.block_id);
        return;
    }
    error!(
        "Nodes out of sync at block {}: {} distinct rollback hashes",
        report.block_id,
        report.groups.len()
    );
    for (hash, hosts) in &report.groups {
        let hosts: Vec<&str> = hosts.iter().map(Host::as_str).collect();
        error!("  {} <- {}", hash, hosts.join(", "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let nodes: Vec<Host> = args.nodes.iter().map(|n| Host::new(n.trim())).collect();
    if nodes.is_empty() {
        bail!("no nodes given");
    }

    let config = SyncConfig {
        peer_timeout_ms: args.timeout_ms,
        ..Default::default()
    };
    let monitor = DesyncMonitor::new(
        Arc::new(TcpPeerClient::new(&config)),
        config.peer_timeout(),
    );

    if !args.daemon {
        let report = monitor.check(&nodes).await?;
        log_report(&report);
        if !report.is_synced() {
            std::process::exit(2);
        }
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.period.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {}
        }
        match monitor.check(&nodes).await {
            Ok(report) => log_report(&report),
            Err(e) => warn!("Check failed: {}", e),
        }
    }

    info!("Desync monitor stopped");
    Ok(())
}
