//! Response chunk and request framing.
//!
//! Decoding is split in two steps so the size bound is enforced before any
//! payload byte is consumed:
//!
//! 1. [`read_chunk_header`] reads the result byte and the size varint
//! 2. [`read_payload`] checks the declared size and reads one payload segment
//!
//! # Example
//!
//! ```
//! use beacon_reqresp::compression::NoCompression;
//! use beacon_reqresp::protocol::{encode_chunk, ResultCode};
//!
//! let bytes = encode_chunk(ResultCode::Success, b"abc", &NoCompression).unwrap();
//! assert_eq!(&bytes[..], &[0x00, 0x03, b'a', b'b', b'c']);
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{
    check_size, decode_varint, encode_varint, ChunkHeader, ResultCode, MAX_VARINT_LEN,
};
use crate::compression::{Compression, DynReader};
use crate::error::FramingError;

/// One decoded response chunk, owned by whoever receives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseChunk {
    /// 0-based position in the response, assigned by read order.
    pub index: u64,
    /// Result code from the first byte.
    pub result_code: ResultCode,
    /// Uncompressed size declared on the wire.
    pub size: u64,
    /// Decompressed payload.
    pub payload: Bytes,
}

impl ResponseChunk {
    /// Check if this chunk carries a success payload.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.result_code.is_success()
    }
}

/// An encoded chunk ready for the wire: header plus finalized payload segment.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Result byte and size varint.
    pub header: ChunkHeader,
    /// Payload after compression.
    pub payload: Bytes,
}

impl EncodedChunk {
    /// Frame a payload with the given compression strategy.
    pub fn new(
        code: ResultCode,
        payload: &[u8],
        compression: &dyn Compression,
    ) -> Result<Self, FramingError> {
        Ok(Self {
            header: ChunkHeader::new(code, payload.len() as u64),
            payload: compression.compress(payload)?,
        })
    }

    /// Total bytes on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.header.len() + self.payload.len()
    }

    /// Copy header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(self.header.as_bytes());
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Encode one chunk as a contiguous byte buffer.
pub fn encode_chunk(
    code: ResultCode,
    payload: &[u8],
    compression: &dyn Compression,
) -> Result<Bytes, FramingError> {
    Ok(EncodedChunk::new(code, payload, compression)?.to_bytes())
}

/// Encode a request: size varint followed by the (compressed) payload.
pub fn encode_request(payload: &[u8], compression: &dyn Compression) -> Result<Bytes, FramingError> {
    let prefix = encode_varint(payload.len() as u64);
    let body = compression.compress(payload)?;
    let mut buf = BytesMut::with_capacity(prefix.len() + body.len());
    buf.put_slice(&prefix);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

/// Read a varint byte by byte so nothing past it is consumed.
async fn read_varint<R>(reader: &mut R) -> Result<u64, FramingError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; MAX_VARINT_LEN];
    for i in 0..MAX_VARINT_LEN {
        buf[i] = reader.read_u8().await?;
        if buf[i] & 0x80 == 0 {
            return decode_varint(&buf[..=i]);
        }
    }
    Err(FramingError::InvalidVarint(format!(
        "longer than {} bytes",
        MAX_VARINT_LEN
    )))
}

/// Read a chunk header.
///
/// Returns `Ok(None)` when the stream is cleanly closed before the result
/// byte of a new chunk. EOF anywhere after that is [`FramingError::Truncated`].
pub async fn read_chunk_header<R>(reader: &mut R) -> Result<Option<(ResultCode, u64)>, FramingError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let code = match reader.read_u8().await {
        Ok(byte) => ResultCode::from_byte(byte),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(FramingError::Io(e)),
    };
    let size = read_varint(reader).await?;
    Ok(Some((code, size)))
}

/// Read a payload of `declared` uncompressed bytes, rejecting it up front if
/// it exceeds `max_size`.
pub async fn read_payload(
    reader: &mut DynReader<'_>,
    declared: u64,
    max_size: u64,
    compression: &dyn Compression,
) -> Result<Bytes, FramingError> {
    let len = check_size(declared, max_size)?;
    compression.read_decompressed(reader, len).await
}

/// Read a request written by [`encode_request`].
pub async fn read_request(
    reader: &mut DynReader<'_>,
    max_size: u64,
    compression: &dyn Compression,
) -> Result<Bytes, FramingError> {
    let declared = read_varint(reader).await?;
    read_payload(reader, declared, max_size, compression).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{NoCompression, SnappyCompression};

    #[tokio::test]
    async fn test_clean_eof_before_header_is_end() {
        let mut reader: &[u8] = &[];
        assert!(read_chunk_header(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_varint_is_truncated() {
        let mut reader: &[u8] = &[0x00, 0x80];
        let err = read_chunk_header(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::Truncated));
    }

    #[tokio::test]
    async fn test_overlong_varint_rejected() {
        let mut wire = vec![0x00];
        wire.extend_from_slice(&[0xFF; 11]);
        let mut reader: &[u8] = &wire;
        let err = read_chunk_header(&mut reader).await.unwrap_err();
        assert!(matches!(err, FramingError::InvalidVarint(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_not_consumed() {
        let wire = encode_chunk(ResultCode::Success, &[9u8; 64], &NoCompression).unwrap();
        let mut reader: &[u8] = &wire;
        let (_, size) = read_chunk_header(&mut reader).await.unwrap().unwrap();
        let before = reader.len();
        let err = read_payload(&mut reader, size, 32, &NoCompression)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::Oversized { declared: 64, max: 32 }));
        assert_eq!(reader.len(), before);
    }

    #[tokio::test]
    async fn test_request_roundtrip_snappy() {
        let wire = encode_request(b"range request", &SnappyCompression).unwrap();
        let mut reader: &[u8] = &wire;
        let out = read_request(&mut reader, 1024, &SnappyCompression)
            .await
            .unwrap();
        assert_eq!(&out[..], b"range request");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_request_over_limit() {
        let wire = encode_request(&[0u8; 100], &NoCompression).unwrap();
        let mut reader: &[u8] = &wire;
        let err = read_request(&mut reader, 10, &NoCompression)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::Oversized { .. }));
    }

    #[test]
    fn test_encoded_chunk_size() {
        let chunk = EncodedChunk::new(ResultCode::ServerError, b"oops", &NoCompression).unwrap();
        assert_eq!(chunk.size(), 2 + 4);
        assert_eq!(&chunk.to_bytes()[..], &[0x02, 0x04, b'o', b'o', b'p', b's']);
    }
}
