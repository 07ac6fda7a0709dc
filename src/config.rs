//! Engine configuration.
//!
//! Built in code through [`ReqRespConfig::default`] plus setters, or loaded
//! from JSON. Durations are milliseconds in JSON and compression is given by
//! name:
//!
//! ```json
//! { "max_chunk_size": 1048576, "request_timeout_ms": 20000, "compression": "snappy" }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::compression::{self, Compression, SnappyCompression};
use crate::error::{ReqRespError, Result};
use crate::protocol::{DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MAX_ERROR_MESSAGE_LEN};
use crate::reader::DEFAULT_END_OF_STREAM_GRACE;
use crate::writer::{WriterConfig, DEFAULT_CHANNEL_CAPACITY};

/// Default maximum size of an inbound request payload.
pub const DEFAULT_MAX_REQUEST_SIZE: u64 = 1_048_576;

/// Default deadline for a whole exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration shared by requester and responder.
#[derive(Debug, Clone)]
pub struct ReqRespConfig {
    /// Largest uncompressed chunk accepted.
    pub max_chunk_size: u64,
    /// Largest uncompressed request accepted by the responder.
    pub max_request_size: u64,
    /// Exchange deadline. `None` disables it.
    pub request_timeout: Option<Duration>,
    /// Compression used for outbound requests.
    pub compression: Arc<dyn Compression>,
    /// Error messages longer than this are truncated on the wire.
    pub max_error_message_len: usize,
    /// Queue depth of the responder's writer task.
    pub writer_channel_capacity: usize,
    /// How long to wait for the peer to close after the last permitted chunk.
    pub end_of_stream_grace: Duration,
}

impl Default for ReqRespConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            compression: Arc::new(SnappyCompression),
            max_error_message_len: DEFAULT_MAX_ERROR_MESSAGE_LEN,
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            end_of_stream_grace: DEFAULT_END_OF_STREAM_GRACE,
        }
    }
}

/// JSON form. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    max_chunk_size: Option<u64>,
    max_request_size: Option<u64>,
    request_timeout_ms: Option<u64>,
    compression: Option<String>,
    max_error_message_len: Option<usize>,
    writer_channel_capacity: Option<usize>,
    end_of_stream_grace_ms: Option<u64>,
}

impl ReqRespConfig {
    /// Parse from JSON, filling missing fields with defaults.
    ///
    /// A `request_timeout_ms` of 0 disables the deadline.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        let mut config = Self::default();

        if let Some(v) = file.max_chunk_size {
            config.max_chunk_size = v;
        }
        if let Some(v) = file.max_request_size {
            config.max_request_size = v;
        }
        if let Some(ms) = file.request_timeout_ms {
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(name) = file.compression {
            config.compression = compression_by_name(&name)?;
        }
        if let Some(v) = file.max_error_message_len {
            config.max_error_message_len = v;
        }
        if let Some(v) = file.writer_channel_capacity {
            config.writer_channel_capacity = v;
        }
        if let Some(ms) = file.end_of_stream_grace_ms {
            config.end_of_stream_grace = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values no exchange could work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(ReqRespError::Config("max_chunk_size must be > 0".into()));
        }
        if self.max_request_size == 0 {
            return Err(ReqRespError::Config("max_request_size must be > 0".into()));
        }
        if self.writer_channel_capacity == 0 {
            return Err(ReqRespError::Config(
                "writer_channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Writer settings derived from this config.
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            channel_capacity: self.writer_channel_capacity,
            max_error_message_len: self.max_error_message_len,
        }
    }
}

/// Resolve a compression name, mapping unknown names to a config error.
pub fn compression_by_name(name: &str) -> Result<Arc<dyn Compression>> {
    compression::by_name(name)
        .ok_or_else(|| ReqRespError::Config(format!("unknown compression: {}", name)))
}
