//! In-process network over duplex pipes.
//!
//! Each registered peer is a [`HandlerRegistry`]. Opening a stream creates a
//! duplex pair, hands one end to the caller and serves the other end with
//! [`serve_inbound`] on a spawned task.
//!
//! # Example
//!
//! ```ignore
//! let network = MemoryNetwork::new(ReqRespConfig::default());
//! network.add_peer(PeerId::from("peer-a"), Arc::new(registry));
//! let stream = network.open_stream(&"peer-a".into(), &protocol).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{duplex, DuplexStream};
use tracing::{debug, trace};

use super::{CapabilitySource, PeerId, StreamOpener};
use crate::config::ReqRespConfig;
use crate::error::{ReqRespError, Result};
use crate::handler::{serve_inbound, HandlerRegistry};
use crate::protocol::ProtocolId;

/// Default buffer size of each duplex pipe.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Peers reachable in this process, keyed by identity.
pub struct MemoryNetwork {
    peers: RwLock<HashMap<PeerId, Arc<HandlerRegistry>>>,
    config: Arc<ReqRespConfig>,
    pipe_capacity: usize,
}

impl MemoryNetwork {
    /// Create an empty network whose responders use `config`.
    pub fn new(config: ReqRespConfig) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    /// Set the duplex buffer size.
    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity;
        self
    }

    /// Register or replace a peer.
    pub fn add_peer(&self, peer: PeerId, registry: Arc<HandlerRegistry>) {
        debug!(peer = %peer, protocols = registry.protocols().len(), "memory peer added");
        self.peers.write().insert(peer, registry);
    }

    /// Remove a peer. Streams already open keep running.
    pub fn remove_peer(&self, peer: &PeerId) -> bool {
        self.peers.write().remove(peer).is_some()
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    fn registry(&self, peer: &PeerId) -> Option<Arc<HandlerRegistry>> {
        self.peers.read().get(peer).cloned()
    }
}

#[async_trait]
impl StreamOpener for MemoryNetwork {
    type Stream = DuplexStream;

    async fn open_stream(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<DuplexStream> {
        let registry = self
            .registry(peer)
            .ok_or_else(|| ReqRespError::Transport(format!("unknown peer {}", peer)))?;

        let (local, remote) = duplex(self.pipe_capacity);
        let config = self.config.clone();
        let protocol = protocol.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            match serve_inbound(remote, protocol.clone(), registry, &config).await {
                Ok(chunks) => trace!(peer = %peer, protocol = %protocol, chunks, "memory stream served"),
                Err(e) => debug!(peer = %peer, protocol = %protocol, error = %e, "memory stream failed"),
            }
        });
        Ok(local)
    }
}

impl CapabilitySource for MemoryNetwork {
    fn supports_protocol(&self, peer: &PeerId, protocol: &ProtocolId) -> Result<bool> {
        Ok(self
            .registry(peer)
            .is_some_and(|registry| registry.supports(protocol)))
    }
}
