//! Identity strategy - payload bytes go on the wire as-is.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::{Compression, DynReader};
use crate::error::FramingError;

/// Identity transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

#[async_trait]
impl Compression for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn protocol_suffix(&self) -> Option<&'static str> {
        None
    }

    #[inline]
    fn compress(&self, raw: &[u8]) -> Result<Bytes, FramingError> {
        Ok(Bytes::copy_from_slice(raw))
    }

    async fn read_decompressed(
        &self,
        reader: &mut DynReader<'_>,
        uncompressed_len: usize,
    ) -> Result<Bytes, FramingError> {
        let mut buf = vec![0u8; uncompressed_len];
        reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}
