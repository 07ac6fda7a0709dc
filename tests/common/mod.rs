//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use beacon_reqresp::codec::SszCodec;
use beacon_reqresp::compression::Compression;
use beacon_reqresp::handler::{HandlerRegistry, ResponseContext};
use beacon_reqresp::methods::{
    BeaconBlock, BlocksByRangeRequest, SignedBeaconBlock, Status, BLOCKS_BY_RANGE_V1, STATUS_V1,
};
use beacon_reqresp::protocol::{encode_chunk, ProtocolId, ResultCode};
use beacon_reqresp::transport::{CapabilitySource, PeerId, StreamOpener};
use beacon_reqresp::Result;
use parking_lot::Mutex;
use tokio::io::{duplex, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::task::JoinHandle;

pub fn block(slot: u64) -> SignedBeaconBlock {
    SignedBeaconBlock {
        message: BeaconBlock {
            slot,
            proposer_index: slot % 64,
            parent_root: [slot as u8; 32],
            state_root: [0x11; 32],
            body: vec![0x42; 128],
        },
        signature: vec![0x99; 96],
    }
}

pub fn remote_status() -> Status {
    Status {
        fork_digest: [0xAA, 0xBB, 0xCC, 0xDD],
        finalized_root: [0x01; 32],
        finalized_epoch: 3,
        head_root: [0x02; 32],
        head_slot: 120,
    }
}

/// Wire bytes of one success chunk carrying the block at `slot`.
pub fn block_chunk(slot: u64, compression: &dyn Compression) -> Vec<u8> {
    encode_chunk(ResultCode::Success, &SszCodec::encode(&block(slot)), compression)
        .unwrap()
        .to_vec()
}

/// Wire bytes of one error chunk.
pub fn error_chunk(code: ResultCode, message: &str, compression: &dyn Compression) -> Vec<u8> {
    encode_chunk(code, message.as_bytes(), compression)
        .unwrap()
        .to_vec()
}

/// Responder that serves its blocks from `start_slot` on, in stored order,
/// up to `count`. Serving in stored order lets tests plant bad sequences.
pub fn block_server(slots: &[u64]) -> HandlerRegistry {
    let blocks: Arc<Vec<SignedBeaconBlock>> = Arc::new(slots.iter().map(|&s| block(s)).collect());
    let mut registry = HandlerRegistry::new();
    registry.register(
        BLOCKS_BY_RANGE_V1,
        move |req: BlocksByRangeRequest, ctx: ResponseContext| {
            let blocks = blocks.clone();
            async move {
                let served = blocks
                    .iter()
                    .filter(|b| b.slot() >= req.start_slot)
                    .take(req.count as usize);
                for b in served {
                    ctx.respond(b).await?;
                }
                Ok(())
            }
        },
    );
    registry.register(STATUS_V1, |_: Status, ctx: ResponseContext| async move {
        ctx.respond(&remote_status()).await
    });
    registry
}

/// Stream wrapper counting every byte the engine reads and every completed
/// shutdown.
pub struct Counting<S> {
    inner: S,
    read: Arc<AtomicU64>,
    closes: Arc<AtomicU32>,
}

impl<S: AsyncRead + Unpin> AsyncRead for Counting<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &res {
            let n = (buf.filled().len() - before) as u64;
            self.read.fetch_add(n, Ordering::Relaxed);
        }
        res
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Counting<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let res = Pin::new(&mut self.inner).poll_shutdown(cx);
        if let Poll::Ready(Ok(())) = &res {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
        res
    }
}

/// Peer that answers every stream with a fixed byte script.
pub struct ScriptedPeer {
    script: Vec<u8>,
    supports: bool,
    close_after_script: bool,
    pub opened: AtomicU32,
    pub bytes_read: Arc<AtomicU64>,
    closes: Arc<AtomicU32>,
    /// Remote halves; each resolves to the request bytes once the requester
    /// closes its side.
    remotes: Mutex<Vec<JoinHandle<io::Result<Vec<u8>>>>>,
}

impl ScriptedPeer {
    pub fn new(script: Vec<u8>) -> Self {
        Self {
            script,
            supports: true,
            close_after_script: true,
            opened: AtomicU32::new(0),
            bytes_read: Arc::new(AtomicU64::new(0)),
            closes: Arc::new(AtomicU32::new(0)),
            remotes: Mutex::new(Vec::new()),
        }
    }

    /// Advertise no protocols at all.
    pub fn unsupported(mut self) -> Self {
        self.supports = false;
        self
    }

    /// Keep the response side open after the script.
    pub fn hold_open(mut self) -> Self {
        self.close_after_script = false;
        self
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Shutdowns completed by the requester on its streams.
    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Wait for every remote half to see end-of-stream and return the
    /// request bytes each one received. Panics if a remote is still waiting
    /// after a second, i.e. the requester left a stream open.
    pub async fn requests_after_close(&self) -> Vec<Vec<u8>> {
        let remotes: Vec<_> = self.remotes.lock().drain(..).collect();
        let mut requests = Vec::with_capacity(remotes.len());
        for remote in remotes {
            let request = tokio::time::timeout(Duration::from_secs(1), remote)
                .await
                .expect("requester did not close the stream")
                .expect("remote task panicked")
                .expect("remote stream failed");
            requests.push(request);
        }
        requests
    }
}

#[async_trait]
impl StreamOpener for ScriptedPeer {
    type Stream = Counting<DuplexStream>;

    async fn open_stream(&self, _: &PeerId, _: &ProtocolId) -> Result<Self::Stream> {
        self.opened.fetch_add(1, Ordering::Relaxed);
        let (local, mut remote) = duplex(1 << 20);
        let script = self.script.clone();
        let close = self.close_after_script;
        let remote_task = tokio::spawn(async move {
            remote.write_all(&script).await?;
            if close {
                remote.shutdown().await?;
            }
            // Drain the request until the requester closes its side.
            let mut request = Vec::new();
            remote.read_to_end(&mut request).await?;
            Ok::<_, io::Error>(request)
        });
        self.remotes.lock().push(remote_task);
        Ok(Counting {
            inner: local,
            read: self.bytes_read.clone(),
            closes: self.closes.clone(),
        })
    }
}

impl CapabilitySource for ScriptedPeer {
    fn supports_protocol(&self, _: &PeerId, _: &ProtocolId) -> Result<bool> {
        Ok(self.supports)
    }
}
