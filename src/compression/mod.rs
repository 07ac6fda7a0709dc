//! Compression strategies applied to chunk and request payloads.
//!
//! - [`NoCompression`] - identity transform, no protocol suffix
//! - [`SnappyCompression`] - snappy framing format, `_snappy` suffix
//!
//! # Design
//!
//! A strategy is stateless and shared as `Arc<dyn Compression>` across
//! concurrent exchanges. Writing goes through [`Compression::compress`], which
//! returns one finalized segment per payload, so a chunk can never be left with
//! an unflushed compressor behind it. Reading goes through
//! [`Compression::read_decompressed`], which consumes exactly the bytes of one
//! segment from the stream and nothing past it.
//!
//! # Example
//!
//! ```
//! use beacon_reqresp::compression::{by_name, Compression};
//!
//! let snappy = by_name("snappy").unwrap();
//! assert_eq!(snappy.protocol_suffix(), Some("snappy"));
//! assert!(by_name("none").unwrap().protocol_suffix().is_none());
//! ```

mod none;
mod snappy;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::FramingError;

pub use none::NoCompression;
pub use snappy::SnappyCompression;

/// Byte source handed to strategies when reading a payload.
pub type DynReader<'a> = dyn AsyncRead + Unpin + Send + 'a;

/// Pluggable, stateless payload transform.
#[async_trait]
pub trait Compression: Send + Sync + fmt::Debug {
    /// Name used in configuration and logs.
    fn name(&self) -> &'static str;

    /// Suffix appended to protocol identifiers, `None` for identity.
    fn protocol_suffix(&self) -> Option<&'static str>;

    /// Compress a whole payload into one finalized segment.
    fn compress(&self, raw: &[u8]) -> Result<Bytes, FramingError>;

    /// Read one segment that decompresses to exactly `uncompressed_len` bytes.
    async fn read_decompressed(
        &self,
        reader: &mut DynReader<'_>,
        uncompressed_len: usize,
    ) -> Result<Bytes, FramingError>;
}

/// Look up a built-in strategy by its configuration name.
pub fn by_name(name: &str) -> Option<Arc<dyn Compression>> {
    match name {
        "none" => Some(Arc::new(NoCompression)),
        "snappy" => Some(Arc::new(SnappyCompression)),
        _ => None,
    }
}

/// All built-in strategies, identity first.
pub fn all() -> Vec<Arc<dyn Compression>> {
    vec![Arc::new(NoCompression), Arc::new(SnappyCompression)]
}
