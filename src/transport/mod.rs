//! Transport module - stream opening and capability lookup.
//!
//! The engine never talks to a concrete network stack. It needs two things
//! from the host:
//!
//! - [`StreamOpener`] opens a bidirectional stream to a peer on a protocol
//! - [`CapabilitySource`] answers whether a peer advertises a protocol
//!
//! [`MemoryNetwork`] implements both over in-process duplex pipes.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::protocol::ProtocolId;

pub use memory::{MemoryNetwork, DEFAULT_PIPE_CAPACITY};

/// Opaque peer identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Create from any string-like identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opens one stream per exchange.
#[async_trait]
pub trait StreamOpener: Send + Sync {
    /// Stream type handed back to the engine.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a stream to `peer` negotiated on `protocol`.
    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<Self::Stream>;
}

/// Answers capability questions from the host's peer store.
pub trait CapabilitySource: Send + Sync {
    /// Check if `peer` advertises the exact `protocol` identifier.
    fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<bool>;
}

#[async_trait]
impl<T: StreamOpener + ?Sized> StreamOpener for std::sync::Arc<T> {
    type Stream = T::Stream;

    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<Self::Stream> {
        (**self).open_stream(peer, protocol).await
    }
}

impl<T: CapabilitySource + ?Sized> CapabilitySource for std::sync::Arc<T> {
    fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<bool> {
        (**self).supports_protocol(peer, protocol)
    }
}
