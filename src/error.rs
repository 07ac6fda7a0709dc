//! Error types for beacon-reqresp.

use thiserror::Error;

use crate::protocol::ResultCode;

/// Boxed error returned by storage and chain collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Malformed or over-bound bytes on the wire.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Declared chunk size exceeds the configured maximum.
    #[error("declared size {declared} exceeds limit {max}")]
    Oversized { declared: u64, max: u64 },

    /// Stream ended in the middle of a chunk.
    #[error("stream ended mid-chunk")]
    Truncated,

    /// Size prefix is not a valid unsigned varint.
    #[error("invalid varint size prefix: {0}")]
    InvalidVarint(String),

    /// Compressed payload could not be decoded.
    #[error("compression: {0}")]
    Compression(String),

    /// Payload bytes do not decode into the expected object.
    #[error("payload decode: {0}")]
    Decode(String),

    /// Stream failed while a chunk was being read or written.
    #[error("stream I/O: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for FramingError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err)
        }
    }
}

/// Main error type for all request/response operations.
#[derive(Debug, Error)]
pub enum ReqRespError {
    /// Peer does not advertise the exact protocol identifier.
    #[error("peer {peer} does not support protocol {protocol}")]
    Capability { peer: String, protocol: String },

    /// Malformed or over-bound chunk.
    #[error("framing error on chunk {chunk_index}: {source}")]
    Framing {
        chunk_index: u64,
        #[source]
        source: FramingError,
    },

    /// Malformed request as seen by the responder.
    #[error("malformed request: {0}")]
    MalformedRequest(#[source] FramingError),

    /// Peer answered with a non-success result code.
    #[error("peer returned {code} on chunk {chunk_index}: {message}")]
    PeerProtocol {
        chunk_index: u64,
        code: ResultCode,
        message: String,
    },

    /// Decoded block is outside the requested slot sequence.
    #[error("bad block on chunk {chunk_index}: expected slot {expected}, got {actual}")]
    Consistency {
        chunk_index: u64,
        expected: u64,
        actual: u64,
    },

    /// Storage or chain collaborator failed while handling a chunk.
    #[error("collaborator failed on chunk {chunk_index}: {source}")]
    Collaborator {
        chunk_index: u64,
        #[source]
        source: BoxError,
    },

    /// Peer sent the maximum number of chunks without closing the stream.
    #[error("reached maximum chunk count: {max_chunks}")]
    ChunkBudgetExceeded { max_chunks: u64 },

    /// Peer closed the stream before sending a required chunk.
    #[error("empty response from peer")]
    EmptyResponse,

    /// Exchange was cancelled by the caller.
    #[error("exchange cancelled")]
    Cancelled,

    /// Exchange deadline expired.
    #[error("exchange timed out")]
    Timeout,

    /// Request rejected locally before anything was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Stream could not be opened, or capability lookup failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response writer task is gone.
    #[error("response stream closed")]
    StreamClosed,

    /// Invalid configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error on the stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (control plane and config).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReqRespError {
    /// Wrap a framing failure with the index of the chunk it happened on.
    pub fn framing(chunk_index: u64, source: FramingError) -> Self {
        Self::Framing {
            chunk_index,
            source,
        }
    }

    /// Wrap a collaborator failure with chunk context.
    pub fn collaborator(chunk_index: u64, source: impl Into<BoxError>) -> Self {
        Self::Collaborator {
            chunk_index,
            source: source.into(),
        }
    }

    /// Chunk index this error is attached to, if any.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            Self::Framing { chunk_index, .. }
            | Self::PeerProtocol { chunk_index, .. }
            | Self::Consistency { chunk_index, .. }
            | Self::Collaborator { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }
}

/// Result type alias using ReqRespError.
pub type Result<T> = std::result::Result<T, ReqRespError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_index_accessor() {
        let err = ReqRespError::framing(3, FramingError::Truncated);
        assert_eq!(err.chunk_index(), Some(3));
        assert_eq!(ReqRespError::Timeout.chunk_index(), None);
    }

    #[test]
    fn test_peer_protocol_message_in_display() {
        let err = ReqRespError::PeerProtocol {
            chunk_index: 0,
            code: ResultCode::ServerError,
            message: "rate limited".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("rate limited"));
        assert!(text.contains("chunk 0"));
    }

    #[test]
    fn test_collaborator_keeps_source() {
        let err = ReqRespError::collaborator(7, "disk full");
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
