//! Block-exchange wire protocol.
//!
//! A request is one kind byte followed by big-endian arguments:
//!
//! | Kind | Request | Arguments | Response |
//! |------|---------|-----------|----------|
//! | 1 | max block id | none | `i64` |
//! | 2 | block bodies | `i64` from, `u8` reverse, `u32` count | frames, then an empty frame |
//! | 3 | block info | `i64` block id | one frame (bincode header), empty if unknown |
//!
//! A frame is a `u32` length followed by that many bytes.

use crate::domain::{BlockId, MAX_BLOCK_SIZE};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const KIND_MAX_BLOCK_ID: u8 = 1;
const KIND_BLOCKS_BODIES: u8 = 2;
const KIND_BLOCK_INFO: u8 = 3;

/// Decoded request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Request {
    /// Tip height.
    MaxBlockId,
    /// Window of block bodies.
    BlocksBodies {
        /// First block id
        from: BlockId,
        /// Descending when set
        reverse: bool,
        /// Window size
        count: u32,
    },
    /// One block header.
    BlockInfo {
        /// Block id
        block_id: BlockId,
    },
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Send a request.
pub async fn write_request<W: AsyncWrite + Unpin>(w: &mut W, request: &Request) -> io::Result<()> {
    match *request {
        Request::MaxBlockId => w.write_u8(KIND_MAX_BLOCK_ID).await?,
        Request::BlocksBodies {
            from,
            reverse,
            count,
        } => {
            w.write_u8(KIND_BLOCKS_BODIES).await?;
            w.write_i64(from).await?;
            w.write_u8(u8::from(reverse)).await?;
            w.write_u32(count).await?;
        }
        Request::BlockInfo { block_id } => {
            w.write_u8(KIND_BLOCK_INFO).await?;
            w.write_i64(block_id).await?;
        }
    }
    w.flush().await
}

/// Receive a request.
pub async fn read_request<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Request> {
    match r.read_u8().await? {
        KIND_MAX_BLOCK_ID => Ok(Request::MaxBlockId),
        KIND_BLOCKS_BODIES => {
            let from = r.read_i64().await?;
            let reverse = match r.read_u8().await? {
                0 => false,
                1 => true,
                other => return Err(invalid(format!("bad reverse flag {}", other))),
            };
            let count = r.read_u32().await?;
            Ok(Request::BlocksBodies {
                from,
                reverse,
                count,
            })
        }
        KIND_BLOCK_INFO => Ok(Request::BlockInfo {
            block_id: r.read_i64().await?,
        }),
        other => Err(invalid(format!("unknown request kind {}", other))),
    }
}

/// Send one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| u64::from(*len) <= MAX_BLOCK_SIZE)
        .ok_or_else(|| invalid(format!("frame of {} bytes too large", payload.len())))?;
    w.write_u32(len).await?;
    w.write_all(payload).await
}

/// Receive one length-prefixed frame. An empty frame ends a body stream.
pub async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = r.read_u32().await?;
    if u64::from(len) > MAX_BLOCK_SIZE {
        return Err(invalid(format!("frame of {} bytes exceeds limit", len)));
    }
    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Ids served for a body request against a chain of height `tip`.
pub fn window_ids(from: BlockId, reverse: bool, count: u32, tip: BlockId) -> Vec<BlockId> {
    let count = i64::from(count);
    if from < 1 || from > tip || count == 0 {
        return Vec::new();
    }
    if reverse {
        let lowest = (from - count + 1).max(1);
        (lowest..=from).rev().collect()
    } else {
        let highest = (from + count - 1).min(tip);
        (from..=highest).collect()
    }
}
