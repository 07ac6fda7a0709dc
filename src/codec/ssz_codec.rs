//! SSZ codec using `ethereum_ssz`.

use crate::error::FramingError;

/// Simple Serialize codec for beacon-chain objects.
pub struct SszCodec;

impl SszCodec {
    /// Encode a value to SSZ bytes.
    #[inline]
    pub fn encode<T: ssz::Encode>(value: &T) -> Vec<u8> {
        value.as_ssz_bytes()
    }

    /// Decode SSZ bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Decode`] if the bytes are not a valid `T`.
    #[inline]
    pub fn decode<T: ssz::Decode>(bytes: &[u8]) -> Result<T, FramingError> {
        T::from_ssz_bytes(bytes).map_err(|e| FramingError::Decode(format!("{:?}", e)))
    }
}
