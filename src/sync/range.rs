//! Per-chunk handling for `beacon_blocks_by_range`.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{BlockStore, ChainSink};
use crate::codec::{ErrorMessage, SszCodec};
use crate::error::{ReqRespError, Result};
use crate::methods::{BlocksByRangeRequest, SignedBeaconBlock};
use crate::protocol::ResponseChunk;
use crate::reader::{ChunkHandler, ChunkReply};
use crate::transport::PeerId;

/// Counters collected over one range exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSyncSummary {
    /// Blocks that passed the slot check.
    pub received: u64,
    /// Blocks the store did not know before.
    pub newly_stored: u64,
    /// Blocks handed to the chain.
    pub processed: u64,
}

/// Validates and forwards range response chunks.
///
/// The chunk at index `i` must carry the block at
/// `start_slot + i * step`. The first mismatch aborts the exchange.
pub struct BlocksByRangeHandler<'a> {
    peer: &'a PeerId,
    request: BlocksByRangeRequest,
    store: Option<&'a dyn BlockStore>,
    chain: Option<&'a dyn ChainSink>,
    summary: RangeSyncSummary,
}

impl<'a> BlocksByRangeHandler<'a> {
    pub fn new(peer: &'a PeerId, request: BlocksByRangeRequest) -> Self {
        Self {
            peer,
            request,
            store: None,
            chain: None,
            summary: RangeSyncSummary::default(),
        }
    }

    /// Persist every accepted block.
    pub fn with_store(mut self, store: &'a dyn BlockStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply every accepted block to the chain.
    pub fn with_chain(mut self, chain: &'a dyn ChainSink) -> Self {
        self.chain = Some(chain);
        self
    }

    pub fn summary(&self) -> RangeSyncSummary {
        self.summary
    }

    fn peer_error(&self, chunk: &ResponseChunk) -> ReqRespError {
        let message = ErrorMessage::decode(&chunk.payload);
        warn!(
            peer = %self.peer,
            chunk_index = chunk.index,
            result_code = %chunk.result_code,
            message = %message,
            "peer returned error chunk"
        );
        ReqRespError::PeerProtocol {
            chunk_index: chunk.index,
            code: chunk.result_code,
            message,
        }
    }
}

#[async_trait]
impl ChunkHandler for BlocksByRangeHandler<'_> {
    async fn handle_chunk(&mut self, chunk: ResponseChunk, _reply: &mut ChunkReply) -> Result<()> {
        if !chunk.is_success() {
            return Err(self.peer_error(&chunk));
        }

        let index = chunk.index;
        let block: SignedBeaconBlock =
            SszCodec::decode(&chunk.payload).map_err(|e| ReqRespError::framing(index, e))?;

        let expected = self
            .request
            .expected_slot(index)
            .ok_or(ReqRespError::ChunkBudgetExceeded {
                max_chunks: self.request.count,
            })?;
        if block.slot() != expected {
            return Err(ReqRespError::Consistency {
                chunk_index: index,
                expected,
                actual: block.slot(),
            });
        }
        self.summary.received += 1;

        if let Some(store) = self.store {
            let known = store
                .store(&block)
                .await
                .map_err(|e| ReqRespError::collaborator(index, e))?;
            if !known {
                self.summary.newly_stored += 1;
            }
            debug!(peer = %self.peer, chunk_index = index, slot = block.slot(), known, "received block");
        } else {
            debug!(peer = %self.peer, chunk_index = index, slot = block.slot(), "received block");
        }

        if let Some(chain) = self.chain {
            chain
                .add_block(&block)
                .await
                .map_err(|e| ReqRespError::collaborator(index, e))?;
            self.summary.processed += 1;
        }
        Ok(())
    }
}
