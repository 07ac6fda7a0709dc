//! Handler registry for dispatching inbound requests by protocol.
//!
//! A method is registered once and served under one protocol identifier per
//! supported compression, so a registry with both built-in strategies answers
//! on both `.../ssz` and `.../ssz_snappy`.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = HandlerRegistry::new();
//! registry.register(STATUS_V1, |_: Status, ctx| async move {
//!     ctx.respond(&local_status()).await
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use super::ResponseContext;
use crate::codec::SszCodec;
use crate::compression::{self, Compression};
use crate::error::{ReqRespError, Result};
use crate::protocol::{MethodDescriptor, ProtocolId};

/// Result type for handler functions.
pub type HandlerResult = Result<()>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request with raw (decompressed) payload bytes.
    fn call(&self, data: &[u8], ctx: ResponseContext) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the SSZ request before calling the handler.
pub struct TypedHandler<F, T, Fut>
where
    F: Fn(T, ResponseContext) -> Fut + Send + Sync + 'static,
    T: ssz::Decode + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedHandler<F, T, Fut>
where
    F: Fn(T, ResponseContext) -> Fut + Send + Sync + 'static,
    T: ssz::Decode + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Handler for TypedHandler<F, T, Fut>
where
    F: Fn(T, ResponseContext) -> Fut + Send + Sync + 'static,
    T: ssz::Decode + Send + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, data: &[u8], ctx: ResponseContext) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match SszCodec::decode(data) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(ReqRespError::MalformedRequest(e)) }),
        };
        Box::pin((self.handler)(parsed, ctx))
    }
}

/// Entry for a registered method.
struct MethodEntry {
    method: MethodDescriptor,
    handler: Arc<dyn Handler>,
}

/// Handler and compression resolved for one inbound protocol.
#[derive(Clone)]
pub struct Route {
    /// Method behind the protocol.
    pub method: MethodDescriptor,
    /// Handler to run.
    pub handler: Arc<dyn Handler>,
    /// Compression implied by the protocol suffix.
    pub compression: Arc<dyn Compression>,
}

/// Registry mapping protocol identifiers to handlers.
pub struct HandlerRegistry {
    /// Methods by protocol string without compression suffix.
    methods: HashMap<String, MethodEntry>,
    /// Compressions served for every method.
    compressions: Vec<Arc<dyn Compression>>,
}

impl HandlerRegistry {
    /// Create an empty registry serving every built-in compression.
    pub fn new() -> Self {
        Self::with_compressions(compression::all())
    }

    /// Create an empty registry serving only the given compressions.
    pub fn with_compressions(compressions: Vec<Arc<dyn Compression>>) -> Self {
        Self {
            methods: HashMap::new(),
            compressions,
        }
    }

    /// Register a method handler. A later registration of the same method
    /// replaces the earlier one.
    pub fn register<F, T, Fut>(&mut self, method: MethodDescriptor, handler: F)
    where
        F: Fn(T, ResponseContext) -> Fut + Send + Sync + 'static,
        T: ssz::Decode + Send + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.methods.insert(
            method.protocol(),
            MethodEntry {
                method,
                handler: Arc::new(TypedHandler::new(handler)),
            },
        );
    }

    /// Every protocol identifier this registry answers on, sorted.
    pub fn protocols(&self) -> Vec<ProtocolId> {
        let mut ids: Vec<_> = self
            .methods
            .values()
            .flat_map(|entry| {
                self.compressions
                    .iter()
                    .map(move |c| ProtocolId::new(&entry.method, c.as_ref()))
            })
            .collect();
        ids.sort();
        ids
    }

    /// Check if the exact protocol identifier is served.
    pub fn supports(&self, protocol: &ProtocolId) -> bool {
        self.resolve(protocol).is_some()
    }

    /// Find the handler and compression for a protocol identifier.
    pub fn resolve(&self, protocol: &ProtocolId) -> Option<Route> {
        self.compressions.iter().find_map(|c| {
            let base = match c.protocol_suffix() {
                Some(suffix) => protocol
                    .as_str()
                    .strip_suffix(suffix)?
                    .strip_suffix('_')?,
                None => protocol.as_str(),
            };
            self.methods.get(base).map(|entry| Route {
                method: entry.method,
                handler: entry.handler.clone(),
                compression: c.clone(),
            })
        })
    }

    /// Dispatch a request to the handler for `protocol`.
    pub async fn dispatch(
        &self,
        protocol: &ProtocolId,
        payload: &[u8],
        ctx: ResponseContext,
    ) -> Result<()> {
        let route = self
            .resolve(protocol)
            .ok_or_else(|| ReqRespError::InvalidRequest(format!("unknown protocol {}", protocol)))?;
        route.handler.call(payload, ctx).await
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{NoCompression, SnappyCompression};

    const PING: MethodDescriptor = MethodDescriptor::ssz("ping", 1);

    #[test]
    fn test_register_serves_every_compression() {
        let mut registry = HandlerRegistry::new();
        registry.register(PING, |_: u64, _ctx| async { Ok(()) });

        let ids: Vec<_> = registry.protocols().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "/eth2/beacon_chain/req/ping/1/ssz",
                "/eth2/beacon_chain/req/ping/1/ssz_snappy",
            ]
        );
    }

    #[test]
    fn test_resolve_picks_compression_from_suffix() {
        let mut registry = HandlerRegistry::new();
        registry.register(PING, |_: u64, _ctx| async { Ok(()) });

        let snappy = registry
            .resolve(&ProtocolId::new(&PING, &SnappyCompression))
            .unwrap();
        assert_eq!(snappy.compression.name(), "snappy");
        let plain = registry
            .resolve(&ProtocolId::new(&PING, &NoCompression))
            .unwrap();
        assert_eq!(plain.compression.name(), "none");
    }

    #[test]
    fn test_restricted_compressions() {
        let mut registry = HandlerRegistry::with_compressions(vec![Arc::new(SnappyCompression)]);
        registry.register(PING, |_: u64, _ctx| async { Ok(()) });

        assert!(registry.supports(&ProtocolId::new(&PING, &SnappyCompression)));
        assert!(!registry.supports(&ProtocolId::new(&PING, &NoCompression)));
    }

    #[test]
    fn test_unknown_protocol() {
        let registry = HandlerRegistry::new();
        assert!(registry
            .resolve(&ProtocolId::from_raw("/eth2/beacon_chain/req/ping/1/ssz"))
            .is_none());
    }

    #[tokio::test]
    async fn test_dispatch_rejects_bad_ssz() {
        let mut registry = HandlerRegistry::new();
        registry.register(PING, |_: u64, _ctx| async { Ok(()) });

        let protocol = ProtocolId::new(&PING, &NoCompression);
        let err = registry
            .dispatch(&protocol, &[1, 2, 3], ResponseContext::new(protocol.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReqRespError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_dispatch_runs_handler() {
        let mut registry = HandlerRegistry::new();
        registry.register(PING, |n: u64, _ctx| async move {
            if n == 9 {
                Ok(())
            } else {
                Err(ReqRespError::InvalidRequest("wrong".into()))
            }
        });

        let protocol = ProtocolId::new(&PING, &NoCompression);
        registry
            .dispatch(&protocol, &9u64.to_le_bytes(), ResponseContext::new(protocol.clone()))
            .await
            .unwrap();
    }
}
