//! Snappy framing-format strategy.
//!
//! Each payload becomes its own framed stream: a stream identifier followed by
//! compressed or uncompressed data frames of at most 64 KiB uncompressed each.
//!
//! ```text
//! ┌──────┬──────────────┬──────────────────────────────┐
//! │ Type │ Length (LE)  │ Body                         │
//! │ 1 B  │ 3 bytes      │ masked CRC-32C + block data  │
//! └──────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! Reading walks frame headers on the async stream and stops as soon as the
//! frames cover the declared uncompressed size, so the next chunk is never
//! touched. The collected frames are then verified and decoded by `snap`.

use std::io::{Read, Write};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::{Compression, DynReader};
use crate::error::FramingError;

const FRAME_HEADER_LEN: usize = 4;
const CRC_LEN: usize = 4;
const MAX_BLOCK_SIZE: usize = 65_536;
const STREAM_IDENTIFIER: &[u8] = b"sNaPpY";

const CHUNK_COMPRESSED: u8 = 0x00;
const CHUNK_UNCOMPRESSED: u8 = 0x01;
const CHUNK_STREAM_IDENTIFIER: u8 = 0xFF;
/// Types 0x02..=0x7F are reserved and must not be skipped.
const UNSKIPPABLE_MAX: u8 = 0x7F;

/// Streaming snappy (framing format).
#[derive(Debug, Clone, Copy, Default)]
pub struct SnappyCompression;

/// Upper bound on the framed size of a payload of `uncompressed_len` bytes.
fn max_framed_len(uncompressed_len: usize) -> usize {
    let frames = uncompressed_len / MAX_BLOCK_SIZE + 1;
    FRAME_HEADER_LEN
        + STREAM_IDENTIFIER.len()
        + frames * (FRAME_HEADER_LEN + CRC_LEN + 32)
        + snap::raw::max_compress_len(uncompressed_len)
}

fn compression_err(err: impl std::fmt::Display) -> FramingError {
    FramingError::Compression(err.to_string())
}

#[async_trait]
impl Compression for SnappyCompression {
    fn name(&self) -> &'static str {
        "snappy"
    }

    fn protocol_suffix(&self) -> Option<&'static str> {
        Some("snappy")
    }

    fn compress(&self, raw: &[u8]) -> Result<Bytes, FramingError> {
        if raw.is_empty() {
            return Ok(Bytes::new());
        }
        let mut encoder = snap::write::FrameEncoder::new(Vec::with_capacity(raw.len() / 2 + 16));
        encoder.write_all(raw).map_err(compression_err)?;
        let framed = encoder.into_inner().map_err(compression_err)?;
        Ok(Bytes::from(framed))
    }

    async fn read_decompressed(
        &self,
        reader: &mut DynReader<'_>,
        uncompressed_len: usize,
    ) -> Result<Bytes, FramingError> {
        if uncompressed_len == 0 {
            return Ok(Bytes::new());
        }

        let limit = max_framed_len(uncompressed_len);
        let mut framed = Vec::new();
        let mut covered = 0usize;

        while covered < uncompressed_len {
            let mut header = [0u8; FRAME_HEADER_LEN];
            reader.read_exact(&mut header).await?;
            let kind = header[0];
            let len = u32::from_le_bytes([header[1], header[2], header[3], 0]) as usize;

            if framed.is_empty() && kind != CHUNK_STREAM_IDENTIFIER {
                return Err(FramingError::Compression(
                    "missing stream identifier".to_string(),
                ));
            }
            if framed.len() + FRAME_HEADER_LEN + len > limit {
                return Err(FramingError::Compression(format!(
                    "framed segment exceeds {} bytes for {} uncompressed",
                    limit, uncompressed_len
                )));
            }

            let start = framed.len();
            framed.extend_from_slice(&header);
            framed.resize(start + FRAME_HEADER_LEN + len, 0);
            reader
                .read_exact(&mut framed[start + FRAME_HEADER_LEN..])
                .await?;
            let body = &framed[start + FRAME_HEADER_LEN..];

            match kind {
                CHUNK_STREAM_IDENTIFIER => {
                    if body != STREAM_IDENTIFIER {
                        return Err(FramingError::Compression(
                            "bad stream identifier".to_string(),
                        ));
                    }
                }
                CHUNK_COMPRESSED => {
                    if body.len() < CRC_LEN {
                        return Err(FramingError::Compression("short frame".to_string()));
                    }
                    covered += snap::raw::decompress_len(&body[CRC_LEN..]).map_err(compression_err)?;
                }
                CHUNK_UNCOMPRESSED => {
                    if body.len() < CRC_LEN {
                        return Err(FramingError::Compression("short frame".to_string()));
                    }
                    covered += body.len() - CRC_LEN;
                }
                0x02..=UNSKIPPABLE_MAX => {
                    return Err(FramingError::Compression(format!(
                        "unskippable frame type {:#04x}",
                        kind
                    )));
                }
                // Padding and skippable frames.
                _ => {}
            }
        }

        if covered != uncompressed_len {
            return Err(FramingError::Compression(format!(
                "frames decompress to {} bytes, expected {}",
                covered, uncompressed_len
            )));
        }

        let mut out = Vec::with_capacity(uncompressed_len);
        snap::read::FrameDecoder::new(&framed[..])
            .read_to_end(&mut out)
            .map_err(compression_err)?;
        if out.len() != uncompressed_len {
            return Err(FramingError::Compression(format!(
                "decoded {} bytes, expected {}",
                out.len(),
                uncompressed_len
            )));
        }
        Ok(Bytes::from(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_small() {
        let framed = SnappyCompression.compress(b"hello hello hello").unwrap();
        let mut reader: &[u8] = &framed;
        let out = SnappyCompression
            .read_decompressed(&mut reader, 17)
            .await
            .unwrap();
        assert_eq!(&out[..], b"hello hello hello");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_multi_block_payload_stops_at_segment_end() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut wire = SnappyCompression.compress(&payload).unwrap().to_vec();
        wire.extend_from_slice(b"NEXT");

        let mut reader: &[u8] = &wire;
        let out = SnappyCompression
            .read_decompressed(&mut reader, payload.len())
            .await
            .unwrap();
        assert_eq!(&out[..], &payload[..]);
        assert_eq!(reader, b"NEXT");
    }

    #[tokio::test]
    async fn test_declared_size_smaller_than_frames() {
        let framed = SnappyCompression.compress(&[7u8; 100]).unwrap();
        let mut reader: &[u8] = &framed;
        let err = SnappyCompression
            .read_decompressed(&mut reader, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::Compression(_)));
    }

    #[tokio::test]
    async fn test_missing_stream_identifier() {
        let mut reader: &[u8] = &[0x00, 0x05, 0x00, 0x00, 1, 2, 3, 4, 5];
        let err = SnappyCompression
            .read_decompressed(&mut reader, 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stream identifier"));
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        let framed = SnappyCompression.compress(&[1u8; 1000]).unwrap();
        let mut reader: &[u8] = &framed[..framed.len() - 3];
        let err = SnappyCompression
            .read_decompressed(&mut reader, 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, FramingError::Truncated));
    }

    #[tokio::test]
    async fn test_endless_padding_is_bounded() {
        let mut wire = vec![CHUNK_STREAM_IDENTIFIER, 6, 0, 0];
        wire.extend_from_slice(STREAM_IDENTIFIER);
        for _ in 0..64 {
            wire.extend_from_slice(&[0xFE, 0x00, 0x01, 0x00]);
            wire.extend_from_slice(&[0u8; 256]);
        }
        let mut reader: &[u8] = &wire;
        let err = SnappyCompression
            .read_decompressed(&mut reader, 8)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn test_empty_payload_compresses_to_nothing() {
        assert!(SnappyCompression.compress(b"").unwrap().is_empty());
    }
}
