//! TCP block server.
//!
//! Answers the block-exchange requests from committed storage so other
//! nodes can sync from this one.

use super::wire::{read_request, window_ids, write_frame, Request};
use crate::domain::StorageError;
use crate::ports::KeyValueStore;
use crate::storage::chain::{committed_block, committed_info};
use std::io;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

fn storage_io(err: StorageError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// Serves committed blocks to peers.
pub struct BlockServer {
    store: Arc<dyn KeyValueStore>,
    max_window: u32,
}

impl BlockServer {
    /// Serve from `store`, capping body windows at `max_window` blocks.
    pub fn new(store: Arc<dyn KeyValueStore>, max_window: u32) -> Self {
        Self { store, max_window }
    }

    /// Accept connections until `cancel` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> io::Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("[chain-sync] block server listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            let (socket, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("[chain-sync] accept failed: {}", e);
                    continue;
                }
            };

            let server = self.clone();
            let token = cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = server.handle(socket, token).await {
                    tracing::debug!("[chain-sync] request from {} failed: {}", peer, e);
                }
            });
        }

        tracing::info!("[chain-sync] block server stopped");
        Ok(())
    }

    async fn handle(&self, mut socket: TcpStream, cancel: CancellationToken) -> io::Result<()> {
        let request = read_request(&mut socket).await?;
        tracing::trace!("[chain-sync] serving {:?}", request);

        match request {
            Request::MaxBlockId => {
                let info = committed_info(self.store.as_ref()).map_err(storage_io)?;
                socket.write_i64(info.block_id).await?;
            }
            Request::BlocksBodies {
                from,
                reverse,
                count,
            } => {
                let tip = committed_info(self.store.as_ref())
                    .map_err(storage_io)?
                    .block_id;
                let count = count.min(self.max_window);
                for id in window_ids(from, reverse, count, tip) {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    match committed_block(self.store.as_ref(), id).map_err(storage_io)? {
                        Some(block) => write_frame(&mut socket, &block.body).await?,
                        None => break,
                    }
                }
                write_frame(&mut socket, &[]).await?;
            }
            Request::BlockInfo { block_id } => {
                let header = committed_block(self.store.as_ref(), block_id)
                    .map_err(storage_io)?
                    .map(|b| b.header);
                let payload = match header {
                    Some(header) => bincode::serialize(&header)
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?,
                    None => Vec::new(),
                };
                write_frame(&mut socket, &payload).await?;
            }
        }

        socket.flush().await
    }
}
