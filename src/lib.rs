//! # beacon-reqresp
//!
//! Chunked request/response protocol engine for beacon-chain peer-to-peer
//! networking.
//!
//! Each exchange runs over its own bidirectional stream:
//!
//! ```text
//! requester                                   responder
//!   │── varint(len) | compressed request ──────►│
//!   │◄─ result | varint(len) | payload ─────────│  chunk 0
//!   │◄─ result | varint(len) | payload ─────────│  chunk 1
//!   │◄─ close ──────────────────────────────────│
//! ```
//!
//! ## Architecture
//!
//! - **Protocol**: result codes, chunk headers, request framing, protocol ids
//! - **Compression**: identity and snappy framing, chosen per protocol id
//! - **Reader / Writer**: bounded chunk loop and the responder's writer task
//! - **Client**: the request orchestrator and typed methods
//! - **Control**: JSON operator commands over the client
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use beacon_reqresp::{methods::BlocksByRangeRequest, transport::MemoryNetwork};
//! use beacon_reqresp::{RangeSyncOptions, ReqRespClient, ReqRespConfig};
//!
//! #[tokio::main]
//! async fn main() -> beacon_reqresp::Result<()> {
//!     let network = Arc::new(MemoryNetwork::new(ReqRespConfig::default()));
//!     network.add_peer("peer-a".into(), Arc::new(registry));
//!
//!     let client = ReqRespClient::builder().build(network.clone(), network);
//!     let summary = client
//!         .blocks_by_range(
//!             &client.context(),
//!             &"peer-a".into(),
//!             BlocksByRangeRequest::new(100, 3, 1),
//!             RangeSyncOptions::default(),
//!         )
//!         .await?;
//!     assert_eq!(summary.received, 3);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod compression;
pub mod config;
pub mod context;
pub mod control;
pub mod error;
pub mod handler;
pub mod methods;
pub mod protocol;
pub mod reader;
pub mod sync;
pub mod transport;
pub mod writer;

mod client;

pub use client::{
    run_request, ExchangeState, ExchangeSummary, OutboundRequest, RangeSyncOptions,
    ReqRespClient, ReqRespClientBuilder,
};
pub use config::ReqRespConfig;
pub use error::{FramingError, ReqRespError, Result};
pub use handler::ResponseContext;
