//! Codec module - encoding of chunk payloads.
//!
//! - [`SszCodec`] - SSZ for request and response objects
//! - [`ErrorMessage`] - UTF-8 message carried by non-success chunks
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the object type is fixed at compile time per method.
//!
//! # Example
//!
//! ```
//! use beacon_reqresp::codec::{ErrorMessage, SszCodec};
//!
//! let encoded = SszCodec::encode(&42u64);
//! let decoded: u64 = SszCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, 42);
//!
//! let msg = ErrorMessage::encode("rate limited", 256);
//! assert_eq!(ErrorMessage::decode(&msg), "rate limited");
//! ```

mod error_message;
mod ssz_codec;

pub use self::error_message::ErrorMessage;
pub use self::ssz_codec::SszCodec;
