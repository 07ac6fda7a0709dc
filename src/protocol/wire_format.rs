//! Wire format encoding and decoding.
//!
//! Every response chunk starts with a result byte followed by an unsigned
//! LEB128 varint declaring the uncompressed payload size:
//! ```text
//! ┌────────┬──────────────────┬──────────────────────────────┐
//! │ Result │ Size (varint)    │ Payload (raw or compressed)  │
//! │ 1 byte │ 1..=10 bytes     │ decompresses to Size bytes   │
//! └────────┴──────────────────┴──────────────────────────────┘
//! ```
//!
//! Requests carry the same size prefix but no result byte.

use std::fmt;

use crate::error::FramingError;

/// Maximum encoded length of a u64 varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Maximum encoded length of a chunk header (result byte + varint).
pub const MAX_CHUNK_HEADER_LEN: usize = 1 + MAX_VARINT_LEN;

/// Default maximum uncompressed chunk payload (1 MiB).
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 1_048_576;

/// Default maximum error message carried by a non-success chunk.
pub const DEFAULT_MAX_ERROR_MESSAGE_LEN: usize = 256;

/// Result code carried in the first byte of every response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Payload is the encoded response object.
    Success,
    /// Peer rejected the request; payload is an error message.
    InvalidRequest,
    /// Peer failed to serve the request; payload is an error message.
    ServerError,
    /// Any other code, kept raw.
    Unknown(u8),
}

impl ResultCode {
    /// Decode from the wire byte.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Success,
            1 => Self::InvalidRequest,
            2 => Self::ServerError,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the wire byte.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::InvalidRequest => 1,
            Self::ServerError => 2,
            Self::Unknown(raw) => raw,
        }
    }

    /// Check if this is the success code.
    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::InvalidRequest => f.write_str("invalid request"),
            Self::ServerError => f.write_str("server error"),
            Self::Unknown(raw) => write!(f, "unknown result code {}", raw),
        }
    }
}

/// Encoded chunk header, stack-allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    buf: [u8; MAX_CHUNK_HEADER_LEN],
    len: usize,
}

impl ChunkHeader {
    /// Encode a chunk header for a payload of `size` uncompressed bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use beacon_reqresp::protocol::{ChunkHeader, ResultCode};
    ///
    /// let header = ChunkHeader::new(ResultCode::Success, 300);
    /// assert_eq!(header.as_bytes(), &[0x00, 0xAC, 0x02]);
    /// ```
    pub fn new(code: ResultCode, size: u64) -> Self {
        let mut buf = [0u8; MAX_CHUNK_HEADER_LEN];
        buf[0] = code.as_byte();
        let len = 1 + encode_varint_into(size, &mut buf[1..]);
        Self { buf, len }
    }

    /// Header bytes as written on the wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Encoded length (2..=11 bytes).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; a header holds at least the result byte and one varint byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Encode `value` as a varint into `out`, returning the number of bytes written.
///
/// `out` must hold at least [`MAX_VARINT_LEN`] bytes.
pub fn encode_varint_into(value: u64, out: &mut [u8]) -> usize {
    let mut scratch = unsigned_varint::encode::u64_buffer();
    let encoded = unsigned_varint::encode::u64(value, &mut scratch);
    out[..encoded.len()].copy_from_slice(encoded);
    encoded.len()
}

/// Encode `value` as a standalone varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut scratch = unsigned_varint::encode::u64_buffer();
    unsigned_varint::encode::u64(value, &mut scratch).to_vec()
}

/// Decode a complete varint held in `bytes`.
///
/// Rejects overlong, overflowing and non-minimal encodings, and trailing bytes.
pub fn decode_varint(bytes: &[u8]) -> Result<u64, FramingError> {
    let (value, rest) = unsigned_varint::decode::u64(bytes)
        .map_err(|e| FramingError::InvalidVarint(e.to_string()))?;
    if !rest.is_empty() {
        return Err(FramingError::InvalidVarint(format!(
            "{} trailing bytes",
            rest.len()
        )));
    }
    Ok(value)
}

/// Check a declared size against a limit before any payload byte is read.
#[inline]
pub fn check_size(declared: u64, max: u64) -> Result<usize, FramingError> {
    if declared > max {
        return Err(FramingError::Oversized { declared, max });
    }
    usize::try_from(declared).map_err(|_| FramingError::Oversized { declared, max })
}
