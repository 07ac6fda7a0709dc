//! Requester side: one exchange per call.
//!
//! [`run_request`] is the orchestrator every method goes through:
//!
//! 1. check the peer advertises the exact protocol identifier
//! 2. open a stream under the exchange context
//! 3. write the request once and flush
//! 4. read the response with the expected chunk count as the bound
//! 5. close the stream, whatever happened
//!
//! [`ReqRespClient`] wraps it with typed methods.
//!
//! # Example
//!
//! ```ignore
//! let client = ReqRespClient::builder()
//!     .request_timeout(Duration::from_secs(10))
//!     .build(network.clone(), network);
//!
//! let summary = client
//!     .blocks_by_range(
//!         &client.context(),
//!         &peer,
//!         BlocksByRangeRequest::new(100, 64, 1),
//!         RangeSyncOptions::default().store(&store),
//!     )
//!     .await?;
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::codec::{ErrorMessage, SszCodec};
use crate::compression::Compression;
use crate::config::ReqRespConfig;
use crate::context::ExchangeContext;
use crate::error::{ReqRespError, Result};
use crate::methods::{BlocksByRangeRequest, Status, BLOCKS_BY_RANGE_V1, STATUS_V1};
use crate::protocol::{encode_request, MethodDescriptor, ProtocolId, ResponseChunk};
use crate::reader::{ChunkHandler, ChunkReply, ResponseReader};
use crate::sync::{BlockStore, BlocksByRangeHandler, ChainSink, RangeSyncSummary};
use crate::transport::{CapabilitySource, PeerId, StreamOpener};

/// Upper bound on closing a stream once the exchange is over.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Where an exchange is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    CapabilityChecked,
    StreamOpen,
    RequestSent,
    /// Chunks handled so far.
    ReadingChunks(u64),
    Closed,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::CapabilityChecked => f.write_str("capability-checked"),
            Self::StreamOpen => f.write_str("stream-open"),
            Self::RequestSent => f.write_str("request-sent"),
            Self::ReadingChunks(n) => write!(f, "reading-chunks({})", n),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// A request ready to send.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: MethodDescriptor,
    pub compression: Arc<dyn Compression>,
    /// Serialized (uncompressed) request object.
    pub payload: Bytes,
    /// Chunk bound for the response.
    pub expected_chunks: u64,
}

impl OutboundRequest {
    /// SSZ-encode `body` for `method`.
    pub fn ssz<T: ssz::Encode>(
        method: MethodDescriptor,
        body: &T,
        compression: Arc<dyn Compression>,
        expected_chunks: u64,
    ) -> Self {
        Self {
            method,
            compression,
            payload: Bytes::from(SszCodec::encode(body)),
            expected_chunks,
        }
    }

    /// Protocol identifier the request goes out on.
    pub fn protocol(&self) -> ProtocolId {
        ProtocolId::new(&self.method, self.compression.as_ref())
    }
}

/// Outcome of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSummary {
    pub protocol: ProtocolId,
    pub chunks_read: u64,
}

/// Traces every chunk the inner handler accepts.
struct Tracked<'h, H: ?Sized> {
    inner: &'h mut H,
    handled: u64,
}

#[async_trait]
impl<H: ChunkHandler + ?Sized> ChunkHandler for Tracked<'_, H> {
    async fn handle_chunk(&mut self, chunk: ResponseChunk, reply: &mut ChunkReply) -> Result<()> {
        self.inner.handle_chunk(chunk, reply).await?;
        self.handled += 1;
        trace!(state = %ExchangeState::ReadingChunks(self.handled), "exchange state");
        Ok(())
    }
}

/// Run one exchange with a peer.
///
/// The capability check happens before anything touches the network. Once a
/// stream is open it is closed on every path, including cancellation.
pub async fn run_request<O, C, H>(
    ctx: &ExchangeContext,
    opener: &O,
    capabilities: &C,
    peer: &PeerId,
    request: &OutboundRequest,
    config: &ReqRespConfig,
    handler: &mut H,
) -> Result<ExchangeSummary>
where
    O: StreamOpener + ?Sized,
    C: CapabilitySource + ?Sized,
    H: ChunkHandler + ?Sized,
{
    let protocol = request.protocol();
    trace!(peer = %peer, protocol = %protocol, state = %ExchangeState::Idle, "exchange state");

    if ctx.is_cancelled() {
        return Err(ReqRespError::Cancelled);
    }
    if !capabilities.supports_protocol(peer, &protocol)? {
        debug!(peer = %peer, protocol = %protocol, "peer lacks protocol");
        return Err(ReqRespError::Capability {
            peer: peer.to_string(),
            protocol: protocol.to_string(),
        });
    }
    trace!(state = %ExchangeState::CapabilityChecked, "exchange state");

    let wire = encode_request(&request.payload, request.compression.as_ref())
        .map_err(|e| ReqRespError::InvalidRequest(format!("request encoding: {}", e)))?;

    let mut stream = ctx.run(opener.open_stream(peer, &protocol)).await?;
    trace!(state = %ExchangeState::StreamOpen, "exchange state");

    let mut tracked = Tracked {
        inner: handler,
        handled: 0,
    };
    let reader = ResponseReader::new(
        request.expected_chunks,
        config.max_chunk_size,
        request.compression.as_ref(),
    )
    .with_end_of_stream_grace(config.end_of_stream_grace);

    let outcome = ctx
        .run(async {
            stream.write_all(&wire).await?;
            stream.flush().await?;
            trace!(state = %ExchangeState::RequestSent, "exchange state");
            reader.read(&mut stream, &mut tracked).await
        })
        .await;

    match tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => trace!(peer = %peer, error = %e, "stream close failed"),
        Err(_) => trace!(peer = %peer, "stream close timed out"),
    }
    trace!(state = %ExchangeState::Closed, "exchange state");

    match outcome {
        Ok(chunks_read) => {
            debug!(peer = %peer, protocol = %protocol, chunks = chunks_read, "exchange complete");
            Ok(ExchangeSummary {
                protocol,
                chunks_read,
            })
        }
        Err(e) => {
            warn!(
                peer = %peer,
                protocol = %protocol,
                chunks = tracked.handled,
                chunk_index = ?e.chunk_index(),
                error = %e,
                "exchange failed"
            );
            Err(e)
        }
    }
}

/// Per-call options for [`ReqRespClient::blocks_by_range`].
#[derive(Default, Clone)]
pub struct RangeSyncOptions<'a> {
    compression: Option<Arc<dyn Compression>>,
    store: Option<&'a dyn BlockStore>,
    chain: Option<&'a dyn ChainSink>,
}

impl<'a> RangeSyncOptions<'a> {
    /// Override the configured compression.
    pub fn compression(mut self, compression: Arc<dyn Compression>) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Persist received blocks.
    pub fn store(mut self, store: &'a dyn BlockStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply received blocks to the chain.
    pub fn chain(mut self, chain: &'a dyn ChainSink) -> Self {
        self.chain = Some(chain);
        self
    }
}

/// Builder for [`ReqRespClient`].
#[derive(Debug, Clone, Default)]
pub struct ReqRespClientBuilder {
    config: ReqRespConfig,
}

impl ReqRespClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: ReqRespConfig) -> Self {
        self.config = config;
        self
    }

    /// Largest accepted chunk. Default: 1 MiB
    pub fn max_chunk_size(mut self, size: u64) -> Self {
        self.config.max_chunk_size = size;
        self
    }

    /// Exchange deadline. Default: 20 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Run exchanges without a deadline.
    pub fn no_request_timeout(mut self) -> Self {
        self.config.request_timeout = None;
        self
    }

    /// Compression for outbound requests. Default: snappy
    pub fn compression(mut self, compression: Arc<dyn Compression>) -> Self {
        self.config.compression = compression;
        self
    }

    /// Wait for the peer to close after the last permitted chunk.
    pub fn end_of_stream_grace(mut self, grace: Duration) -> Self {
        self.config.end_of_stream_grace = grace;
        self
    }

    pub fn build<O, C>(self, opener: O, capabilities: C) -> ReqRespClient<O, C>
    where
        O: StreamOpener,
        C: CapabilitySource,
    {
        ReqRespClient {
            opener,
            capabilities,
            config: self.config,
        }
    }
}

/// Typed request/response client.
pub struct ReqRespClient<O, C> {
    opener: O,
    capabilities: C,
    config: ReqRespConfig,
}

impl ReqRespClient<(), ()> {
    pub fn builder() -> ReqRespClientBuilder {
        ReqRespClientBuilder::new()
    }
}

impl<O, C> ReqRespClient<O, C>
where
    O: StreamOpener,
    C: CapabilitySource,
{
    pub fn config(&self) -> &ReqRespConfig {
        &self.config
    }

    /// Fresh context carrying the configured deadline.
    pub fn context(&self) -> ExchangeContext {
        self.context_with_timeout(self.config.request_timeout)
    }

    /// Fresh context with an explicit deadline, `None` for no deadline.
    pub fn context_with_timeout(&self, timeout: Option<Duration>) -> ExchangeContext {
        match timeout {
            Some(timeout) => ExchangeContext::new().with_timeout(timeout),
            None => ExchangeContext::new(),
        }
    }

    /// Run an arbitrary request through the orchestrator.
    pub async fn request<H>(
        &self,
        ctx: &ExchangeContext,
        peer: &PeerId,
        request: &OutboundRequest,
        handler: &mut H,
    ) -> Result<ExchangeSummary>
    where
        H: ChunkHandler + ?Sized,
    {
        run_request(
            ctx,
            &self.opener,
            &self.capabilities,
            peer,
            request,
            &self.config,
            handler,
        )
        .await
    }

    /// Fetch `request.count` blocks starting at `request.start_slot`.
    ///
    /// Invalid ranges fail before any capability check or stream.
    pub async fn blocks_by_range(
        &self,
        ctx: &ExchangeContext,
        peer: &PeerId,
        request: BlocksByRangeRequest,
        options: RangeSyncOptions<'_>,
    ) -> Result<RangeSyncSummary> {
        request.validate()?;

        let compression = options
            .compression
            .unwrap_or_else(|| self.config.compression.clone());
        let outbound = OutboundRequest::ssz(BLOCKS_BY_RANGE_V1, &request, compression, request.count);

        let mut handler = BlocksByRangeHandler::new(peer, request);
        if let Some(store) = options.store {
            handler = handler.with_store(store);
        }
        if let Some(chain) = options.chain {
            handler = handler.with_chain(chain);
        }

        self.request(ctx, peer, &outbound, &mut handler).await?;
        Ok(handler.summary())
    }

    /// Exchange status with a peer. The peer must answer with exactly one chunk.
    pub async fn status(
        &self,
        ctx: &ExchangeContext,
        peer: &PeerId,
        local: &Status,
        compression: Option<Arc<dyn Compression>>,
    ) -> Result<Status> {
        let compression = compression.unwrap_or_else(|| self.config.compression.clone());
        let outbound = OutboundRequest::ssz(STATUS_V1, local, compression, 1);

        let mut remote = None;
        let mut handler = |chunk: ResponseChunk, _reply: &mut ChunkReply| -> Result<()> {
            if !chunk.is_success() {
                let message = ErrorMessage::decode(&chunk.payload);
                warn!(peer = %peer, result_code = %chunk.result_code, message = %message, "status rejected");
                return Err(ReqRespError::PeerProtocol {
                    chunk_index: chunk.index,
                    code: chunk.result_code,
                    message,
                });
            }
            let status: Status = SszCodec::decode(&chunk.payload)
                .map_err(|e| ReqRespError::framing(chunk.index, e))?;
            remote = Some(status);
            Ok(())
        };

        self.request(ctx, peer, &outbound, &mut handler).await?;
        remote.ok_or(ReqRespError::EmptyResponse)
    }
}
