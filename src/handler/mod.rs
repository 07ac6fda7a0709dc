//! Handler module - inbound request handling and dispatch.
//!
//! Provides:
//! - [`HandlerRegistry`] - maps protocol identifiers to handlers
//! - [`ResponseContext`] - lets handlers emit response chunks
//! - [`serve_inbound`] - runs one inbound stream end to end
//!
//! # Example
//!
//! ```ignore
//! use beacon_reqresp::handler::{HandlerRegistry, ResponseContext};
//! use beacon_reqresp::methods::{BlocksByRangeRequest, BLOCKS_BY_RANGE_V1};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register(BLOCKS_BY_RANGE_V1, |req: BlocksByRangeRequest, ctx: ResponseContext| async move {
//!     for block in chain.blocks_in(&req) {
//!         ctx.respond(&block).await?;
//!     }
//!     Ok(())
//! });
//! ```

mod context;
mod registry;
mod serve;

pub use context::ResponseContext;
pub use registry::{BoxFuture, Handler, HandlerRegistry, HandlerResult, Route, TypedHandler};
pub use serve::serve_inbound;
