//! Response writer: encodes chunks and puts them on the responder's stream.
//!
//! Two entry points:
//!
//! - [`write_response`] writes a finite sequence of chunks inline
//! - [`spawn_response_writer`] runs a dedicated task fed through an mpsc
//!   channel, so handler code can emit chunks while it is still producing them
//!
//! # Architecture
//!
//! ```text
//! Handler ─► ResponseSender ─► mpsc<EncodedChunk> ─► Writer Task ─► Stream
//!            (encode + compress)                     (writev + flush)
//! ```
//!
//! Each chunk is finalized (compressed and flushed) before the next one is
//! started. Any write failure aborts the remaining sequence and the stream is
//! shut down. Closing the channel ends the response with a clean close.

use std::io::IoSlice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::codec::ErrorMessage;
use crate::compression::Compression;
use crate::error::{ReqRespError, Result};
use crate::protocol::{EncodedChunk, ResultCode, DEFAULT_MAX_ERROR_MESSAGE_LEN};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum chunks to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// One response chunk before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseItem {
    /// Success chunk with an already serialized payload.
    Success(Bytes),
    /// Error chunk with a human-readable message.
    Error(ResultCode, String),
}

impl ResponseItem {
    /// Encode into wire form.
    pub fn encode(
        &self,
        compression: &dyn Compression,
        max_error_message_len: usize,
    ) -> std::result::Result<EncodedChunk, crate::error::FramingError> {
        match self {
            Self::Success(payload) => EncodedChunk::new(ResultCode::Success, payload, compression),
            Self::Error(code, message) => {
                let payload = ErrorMessage::encode(message, max_error_message_len);
                EncodedChunk::new(*code, &payload, compression)
            }
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the chunk queue.
    pub channel_capacity: usize,
    /// Error messages longer than this are truncated.
    pub max_error_message_len: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_error_message_len: DEFAULT_MAX_ERROR_MESSAGE_LEN,
        }
    }
}

/// Handle for sending chunks to the writer task. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::Sender<EncodedChunk>,
    compression: Arc<dyn Compression>,
    max_error_message_len: usize,
    next_index: Arc<AtomicU64>,
}

impl ResponseSender {
    /// Encode a chunk and queue it behind the ones already sent.
    pub async fn send(&self, item: ResponseItem) -> Result<()> {
        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        let chunk = item
            .encode(&*self.compression, self.max_error_message_len)
            .map_err(|e| ReqRespError::framing(index, e))?;
        trace!(chunk_index = index, chunk_size = chunk.size(), "queue response chunk");
        self.tx
            .send(chunk)
            .await
            .map_err(|_| ReqRespError::StreamClosed)
    }

    /// Queue a success chunk.
    pub async fn send_success(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.send(ResponseItem::Success(payload.into())).await
    }

    /// Queue an error chunk.
    pub async fn send_error(&self, code: ResultCode, message: impl Into<String>) -> Result<()> {
        self.send(ResponseItem::Error(code, message.into())).await
    }

    /// Chunks queued so far.
    pub fn chunks_sent(&self) -> u64 {
        self.next_index.load(Ordering::Acquire)
    }

    /// Check if the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending chunks.
///
/// The task resolves to the number of chunks written once every sender is
/// dropped and the stream has been shut down.
pub fn spawn_response_writer<W>(
    writer: W,
    compression: Arc<dyn Compression>,
    config: WriterConfig,
) -> (ResponseSender, JoinHandle<Result<u64>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let sender = ResponseSender {
        tx,
        compression,
        max_error_message_len: config.max_error_message_len,
        next_index: Arc::new(AtomicU64::new(0)),
    };
    let task = tokio::spawn(writer_loop(rx, writer));
    (sender, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<EncodedChunk>, mut writer: W) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(first) = rx.recv().await {
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(chunk) => batch.push(chunk),
                Err(_) => break,
            }
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            warn!(chunk_index = written, error = %e, "response write failed");
            rx.close();
            let _ = writer.shutdown().await;
            return Err(e);
        }
        written += batch.len() as u64;
    }

    writer.shutdown().await?;
    debug!(chunks = written, "response stream closed");
    Ok(written)
}

/// Write a finite response inline, then close the stream.
///
/// Stops at the first failure and still attempts the close.
pub async fn write_response<W, I>(
    writer: &mut W,
    items: I,
    compression: &dyn Compression,
    max_error_message_len: usize,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
    I: IntoIterator<Item = ResponseItem>,
{
    let mut written = 0u64;
    for item in items {
        let outcome = match item.encode(compression, max_error_message_len) {
            Ok(chunk) => write_batch(writer, std::slice::from_ref(&chunk)).await,
            Err(e) => Err(ReqRespError::framing(written, e)),
        };
        if let Err(e) = outcome {
            let _ = writer.shutdown().await;
            return Err(e);
        }
        written += 1;
    }
    writer.shutdown().await?;
    Ok(written)
}

/// Write a batch of chunks using scatter/gather I/O, then flush.
async fn write_batch<W>(writer: &mut W, batch: &[EncodedChunk]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let total_size: usize = batch.iter().map(EncodedChunk::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let n = writer.write_vectored(&slices).await?;
        if n == 0 {
            return Err(ReqRespError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += n;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices(batch: &[EncodedChunk], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 2);
    let mut offset = 0;

    for chunk in batch {
        for part in [chunk.header.as_bytes(), &chunk.payload[..]] {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(offset)..]));
            }
            offset = end;
        }
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{NoCompression, SnappyCompression};
    use crate::protocol::{read_chunk_header, read_payload};
    use std::io::Cursor;
    use tokio::io::{duplex, AsyncReadExt};

    fn chunk(code: ResultCode, payload: &'static [u8]) -> EncodedChunk {
        EncodedChunk::new(code, payload, &NoCompression).unwrap()
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![chunk(ResultCode::Success, b"hello")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let mut big = vec![0u8; 300];
        big[0] = 1;
        let batch = vec![EncodedChunk::new(ResultCode::Success, &big, &NoCompression).unwrap()];
        // 300 needs a two byte varint, so the header is 3 bytes.
        let slices = build_remaining_slices(&batch, 1);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 2);
        assert_eq!(slices[1].len(), 300);
    }

    #[test]
    fn test_build_remaining_slices_across_chunks() {
        let batch = vec![
            chunk(ResultCode::Success, b"abc"),
            chunk(ResultCode::ServerError, b"xy"),
        ];
        // First chunk is 2 + 3 bytes.
        let slices = build_remaining_slices(&batch, 6);
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 1);
        assert_eq!(&slices[1][..], b"xy");
    }

    #[test]
    fn test_empty_payload_has_header_only() {
        let batch = vec![chunk(ResultCode::Success, b"")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 1);
        assert_eq!(&slices[0][..], &[0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<_> = (0..5).map(|_| chunk(ResultCode::Success, b"abc")).collect();
        write_batch(&mut buf, &batch).await.unwrap();
        assert_eq!(buf.into_inner().len(), 5 * (2 + 3));
    }

    #[tokio::test]
    async fn test_write_response_closes_stream() {
        let (mut client, mut server) = duplex(4096);
        let items = vec![
            ResponseItem::Success(Bytes::from_static(b"one")),
            ResponseItem::Error(ResultCode::InvalidRequest, "bad".to_string()),
        ];
        let n = write_response(&mut client, items, &NoCompression, 256)
            .await
            .unwrap();
        assert_eq!(n, 2);

        let mut wire = Vec::new();
        server.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire, vec![0x00, 3, b'o', b'n', b'e', 0x01, 3, b'b', b'a', b'd']);
    }

    #[tokio::test]
    async fn test_error_message_truncated() {
        let (mut client, mut server) = duplex(4096);
        let long = "x".repeat(1000);
        write_response(
            &mut client,
            [ResponseItem::Error(ResultCode::ServerError, long)],
            &NoCompression,
            16,
        )
        .await
        .unwrap();

        let (code, size) = read_chunk_header(&mut server).await.unwrap().unwrap();
        assert_eq!(code, ResultCode::ServerError);
        assert_eq!(size, 16);
    }

    #[tokio::test]
    async fn test_writer_task_preserves_order() {
        let (client, mut server) = duplex(64 * 1024);
        let (sender, task) =
            spawn_response_writer(client, Arc::new(SnappyCompression), WriterConfig::default());

        for i in 0..10u8 {
            sender.send_success(vec![i; 100]).await.unwrap();
        }
        assert_eq!(sender.chunks_sent(), 10);
        drop(sender);
        assert_eq!(task.await.unwrap().unwrap(), 10);

        for i in 0..10u8 {
            let (code, size) = read_chunk_header(&mut server).await.unwrap().unwrap();
            assert!(code.is_success());
            let payload = read_payload(&mut server, size, 1024, &SnappyCompression)
                .await
                .unwrap();
            assert_eq!(&payload[..], &[i; 100][..]);
        }
        assert!(read_chunk_header(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, mut server) = duplex(4096);
        let (sender, task) =
            spawn_response_writer(client, Arc::new(NoCompression), WriterConfig::default());
        drop(sender);
        assert_eq!(task.await.unwrap().unwrap(), 0);

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_send_after_peer_gone_fails() {
        let (client, server) = duplex(16);
        drop(server);
        let (sender, task) =
            spawn_response_writer(client, Arc::new(NoCompression), WriterConfig::default());

        assert!(!sender.is_closed());
        sender.send_success(vec![0u8; 64]).await.unwrap();
        assert!(task.await.unwrap().is_err());
        assert!(sender.is_closed());
        let err = sender.send_success(vec![0u8; 64]).await.unwrap_err();
        assert!(matches!(err, ReqRespError::StreamClosed));
    }
}
