//! Response context for inbound request handlers.
//!
//! - `respond` - send one SSZ success chunk
//! - `respond_raw` / `respond_bytes` - send a pre-serialized success chunk
//! - `error` - send an error chunk with a message
//!
//! The response ends when the handler returns and every clone of the context
//! is dropped.
//!
//! # Example
//!
//! ```ignore
//! async fn range(req: BlocksByRangeRequest, ctx: ResponseContext) -> Result<()> {
//!     for block in blocks_in(req) {
//!         ctx.respond(&block).await?;
//!     }
//!     Ok(())
//! }
//! ```

use bytes::Bytes;

use crate::codec::SszCodec;
use crate::error::Result;
use crate::protocol::{ProtocolId, ResultCode};
use crate::writer::{ResponseItem, ResponseSender};

/// Context passed to inbound request handlers.
///
/// `Clone` and safe to share across tasks. Chunks from all clones go through
/// one writer task in send order.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    protocol: ProtocolId,
    sender: Option<ResponseSender>,
}

impl ResponseContext {
    /// Create a context without a writer (for testing).
    pub fn new(protocol: ProtocolId) -> Self {
        Self {
            protocol,
            sender: None,
        }
    }

    /// Create a context that sends through a writer task.
    pub fn with_sender(protocol: ProtocolId, sender: ResponseSender) -> Self {
        Self {
            protocol,
            sender: Some(sender),
        }
    }

    /// Protocol the request arrived on.
    #[inline]
    pub fn protocol(&self) -> &ProtocolId {
        &self.protocol
    }

    /// Send a success chunk with an SSZ-encoded value.
    pub async fn respond<T: ssz::Encode>(&self, value: &T) -> Result<()> {
        self.send(ResponseItem::Success(Bytes::from(SszCodec::encode(value))))
            .await
    }

    /// Send a success chunk with raw bytes.
    pub async fn respond_raw(&self, payload: &[u8]) -> Result<()> {
        self.send(ResponseItem::Success(Bytes::copy_from_slice(payload)))
            .await
    }

    /// Send a success chunk with pre-allocated Bytes.
    pub async fn respond_bytes(&self, payload: Bytes) -> Result<()> {
        self.send(ResponseItem::Success(payload)).await
    }

    /// Send an error chunk.
    pub async fn error(&self, code: ResultCode, message: &str) -> Result<()> {
        self.send(ResponseItem::Error(code, message.to_string()))
            .await
    }

    /// Chunks sent so far on this response, across all clones.
    pub fn chunks_sent(&self) -> u64 {
        self.sender.as_ref().map_or(0, ResponseSender::chunks_sent)
    }

    async fn send(&self, item: ResponseItem) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.send(item).await,
            // No writer configured (testing mode)
            None => Ok(()),
        }
    }
}
