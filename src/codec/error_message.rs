//! Error message payload for non-success chunks.
//!
//! Messages are plain UTF-8, capped at a configured byte length. Decoding is
//! lossy so a peer sending invalid UTF-8 still yields a readable message.

/// UTF-8 error message codec.
pub struct ErrorMessage;

impl ErrorMessage {
    /// Encode a message, truncated to at most `max_len` bytes on a char boundary.
    pub fn encode(message: &str, max_len: usize) -> Vec<u8> {
        let mut end = message.len().min(max_len);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.as_bytes()[..end].to_vec()
    }

    /// Decode a message, replacing invalid UTF-8 sequences.
    pub fn decode(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}
