//! Protocol module - wire format, chunk framing, and protocol identifiers.
//!
//! This module implements the binary request/response format:
//! - result codes and the varint chunk header
//! - chunk and request encode/decode with size bounds
//! - `ProtocolId` and `MethodDescriptor`

mod chunk;
mod protocol_id;
mod wire_format;

pub use chunk::{
    encode_chunk, encode_request, read_chunk_header, read_payload, read_request, EncodedChunk,
    ResponseChunk,
};
pub use protocol_id::{MethodDescriptor, ProtocolId, PROTOCOL_PREFIX};
pub use wire_format::{
    check_size, decode_varint, encode_varint, encode_varint_into, ChunkHeader, ResultCode,
    DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_ERROR_MESSAGE_LEN, MAX_CHUNK_HEADER_LEN, MAX_VARINT_LEN,
};
