//! TCP implementation of [`PeerClient`].
//!
//! One connection per request. Body streams read frames on a spawned task
//! and push them through a bounded [`BlockStream`]; the connection closes as
//! soon as the consumer drops or cancels the stream.

use super::wire::{read_frame, write_request, Request};
use crate::config::SyncConfig;
use crate::domain::{BlockHeader, BlockId, Host, PeerError};
use crate::ports::{BlockStream, PeerClient};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// TCP peer client.
#[derive(Clone, Debug)]
pub struct TcpPeerClient {
    timeout: Duration,
    blocks_per_request: u32,
    stream_buffer: usize,
}

impl TcpPeerClient {
    /// Client using the timeouts and window size from `config`.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            timeout: config.peer_timeout(),
            blocks_per_request: config.blocks_per_request,
            stream_buffer: config.stream_buffer,
        }
    }

    async fn connect(&self, host: &Host, request: &Request) -> Result<TcpStream, PeerError> {
        let mut conn = timeout(self.timeout, TcpStream::connect(host.as_str()))
            .await
            .map_err(|_| PeerError::Timeout {
                host: host.to_string(),
            })?
            .map_err(|e| PeerError::Connect {
                host: host.to_string(),
                message: e.to_string(),
            })?;
        conn.set_nodelay(true).ok();

        write_request(&mut conn, request)
            .await
            .map_err(|e| io_error(host, e))?;
        Ok(conn)
    }
}

fn io_error(host: &Host, err: io::Error) -> PeerError {
    match err.kind() {
        io::ErrorKind::InvalidData => PeerError::Protocol {
            host: host.to_string(),
            message: err.to_string(),
        },
        _ => PeerError::Io {
            host: host.to_string(),
            message: err.to_string(),
        },
    }
}

#[async_trait]
impl PeerClient for TcpPeerClient {
    async fn get_max_block_id(&self, host: &Host) -> Result<BlockId, PeerError> {
        let mut conn = self.connect(host, &Request::MaxBlockId).await?;
        let id = timeout(self.timeout, conn.read_i64())
            .await
            .map_err(|_| PeerError::Timeout {
                host: host.to_string(),
            })?
            .map_err(|e| io_error(host, e))?;
        if id < 0 {
            return Err(PeerError::Protocol {
                host: host.to_string(),
                message: format!("negative tip {}", id),
            });
        }
        Ok(id)
    }

    async fn get_blocks_bodies(
        &self,
        host: &Host,
        from: BlockId,
        reverse: bool,
        cancel: CancellationToken,
    ) -> Result<BlockStream, PeerError> {
        let request = Request::BlocksBodies {
            from,
            reverse,
            count: self.blocks_per_request,
        };
        let mut conn = self.connect(host, &request).await?;
        let (sender, stream) = BlockStream::channel(self.stream_buffer, cancel);
        let stop = sender.cancelled();
        let frame_timeout = self.timeout;
        let host = host.clone();

        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = stop.cancelled() => break,
                    frame = timeout(frame_timeout, read_frame(&mut conn)) => frame,
                };
                let item = match frame {
                    Err(_) => Err(PeerError::Timeout {
                        host: host.to_string(),
                    }),
                    Ok(Err(e)) => Err(io_error(&host, e)),
                    Ok(Ok(body)) if body.is_empty() => break,
                    Ok(Ok(body)) => Ok(body),
                };
                let failed = item.is_err();
                if !sender.send(item).await || failed {
                    break;
                }
            }
            tracing::trace!("[chain-sync] body stream from {} closed", host);
        });

        Ok(stream)
    }

    async fn get_block_info(
        &self,
        host: &Host,
        block_id: BlockId,
    ) -> Result<BlockHeader, PeerError> {
        let mut conn = self.connect(host, &Request::BlockInfo { block_id }).await?;
        let frame = timeout(self.timeout, read_frame(&mut conn))
            .await
            .map_err(|_| PeerError::Timeout {
                host: host.to_string(),
            })?
            .map_err(|e| io_error(host, e))?;

        if frame.is_empty() {
            return Err(PeerError::Protocol {
                host: host.to_string(),
                message: format!("block {} not found", block_id),
            });
        }
        bincode::deserialize(&frame).map_err(|e| PeerError::Protocol {
            host: host.to_string(),
            message: e.to_string(),
        })
    }
}
