//! Response reader: the bounded chunk loop on the requester's side.
//!
//! ```text
//! for index in 0..max_chunk_count:
//!     header  ── clean EOF ──► done (index chunks)
//!     size check ──► payload segment ──► handler(chunk, reply)
//!     reply bytes ──► compress ──► write + flush
//! exhausted ──► peer still sending? ──► ChunkBudgetExceeded
//! ```
//!
//! The reader never consumes bytes past the chunk it is working on, and it
//! stops at the first error. Nothing after a failing chunk is read.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::compression::Compression;
use crate::error::{ReqRespError, Result};
use crate::protocol::{read_chunk_header, read_payload, ResponseChunk};

/// How long the reader waits for the peer to close the stream after the
/// last permitted chunk.
pub const DEFAULT_END_OF_STREAM_GRACE: Duration = Duration::from_millis(500);

/// Bytes a handler wants to send back to the peer after its chunk.
///
/// Whatever is written here is compressed as one segment and flushed before
/// the next chunk is read. Most handlers leave it empty.
#[derive(Debug, Default)]
pub struct ChunkReply {
    buf: BytesMut,
}

impl ChunkReply {
    /// Append raw bytes to the reply.
    pub fn write(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Check if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Reply length in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

/// Per-chunk callback driven by the reader.
///
/// Returning an error stops the exchange immediately.
#[async_trait]
pub trait ChunkHandler: Send {
    /// Handle one chunk.
    async fn handle_chunk(&mut self, chunk: ResponseChunk, reply: &mut ChunkReply) -> Result<()>;
}

#[async_trait]
impl<F> ChunkHandler for F
where
    F: FnMut(ResponseChunk, &mut ChunkReply) -> Result<()> + Send,
{
    async fn handle_chunk(&mut self, chunk: ResponseChunk, reply: &mut ChunkReply) -> Result<()> {
        self(chunk, reply)
    }
}

/// Chunk loop with fixed limits.
#[derive(Debug, Clone, Copy)]
pub struct ResponseReader<'a> {
    max_chunk_count: u64,
    max_chunk_size: u64,
    end_of_stream_grace: Duration,
    compression: &'a dyn Compression,
}

impl<'a> ResponseReader<'a> {
    /// Create a reader with the default end-of-stream grace period.
    pub fn new(max_chunk_count: u64, max_chunk_size: u64, compression: &'a dyn Compression) -> Self {
        Self {
            max_chunk_count,
            max_chunk_size,
            end_of_stream_grace: DEFAULT_END_OF_STREAM_GRACE,
            compression,
        }
    }

    /// Set how long to wait for a close after the last permitted chunk.
    pub fn with_end_of_stream_grace(mut self, grace: Duration) -> Self {
        self.end_of_stream_grace = grace;
        self
    }

    /// Read chunks until clean end-of-stream, an error, or the chunk budget.
    ///
    /// Returns the number of chunks handled.
    pub async fn read<S, H>(&self, stream: &mut S, handler: &mut H) -> Result<u64>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
        H: ChunkHandler + ?Sized,
    {
        for index in 0..self.max_chunk_count {
            let header = read_chunk_header(stream)
                .await
                .map_err(|e| ReqRespError::framing(index, e))?;
            let Some((result_code, size)) = header else {
                trace!(chunks = index, "response ended");
                return Ok(index);
            };
            trace!(chunk_index = index, chunk_size = size, result_code = %result_code, "read chunk header");

            let payload = read_payload(stream, size, self.max_chunk_size, self.compression)
                .await
                .map_err(|e| ReqRespError::framing(index, e))?;

            let mut reply = ChunkReply::default();
            handler
                .handle_chunk(
                    ResponseChunk {
                        index,
                        result_code,
                        size,
                        payload,
                    },
                    &mut reply,
                )
                .await?;

            if !reply.is_empty() {
                let segment = self
                    .compression
                    .compress(&reply.buf)
                    .map_err(|e| ReqRespError::framing(index, e))?;
                stream.write_all(&segment).await?;
                stream.flush().await?;
            }
        }

        self.expect_end(stream).await?;
        Ok(self.max_chunk_count)
    }

    /// After the last permitted chunk the peer must close. More bytes, or
    /// silence past the grace period, violate the budget. A failing stream is
    /// reported as I/O.
    async fn expect_end<S>(&self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + Unpin + Send,
    {
        let mut probe = [0u8; 1];
        match tokio::time::timeout(self.end_of_stream_grace, stream.read(&mut probe)).await {
            Ok(Ok(0)) => Ok(()),
            Ok(Err(e)) => Err(ReqRespError::Io(e)),
            Ok(Ok(_)) | Err(_) => Err(ReqRespError::ChunkBudgetExceeded {
                max_chunks: self.max_chunk_count,
            }),
        }
    }
}

/// Read a response with the default end-of-stream grace period.
pub async fn read_response<S, H>(
    stream: &mut S,
    max_chunk_count: u64,
    max_chunk_size: u64,
    compression: &dyn Compression,
    handler: &mut H,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: ChunkHandler + ?Sized,
{
    ResponseReader::new(max_chunk_count, max_chunk_size, compression)
        .read(stream, handler)
        .await
}
