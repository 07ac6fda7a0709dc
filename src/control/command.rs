//! Operator commands and their outcomes, as JSON.
//!
//! ```json
//! {"command":"blocks_by_range","peer":"peer-a","start_slot":100,"count":3}
//! {"command":"status","peer":"peer-a","timeout_ms":5000}
//! {"command":"watch_status","peer":"peer-a","interval_ms":12000}
//! {"command":"unwatch","peer":"peer-a"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ReqRespError;
use crate::methods::Status;
use crate::sync::RangeSyncSummary;
use crate::transport::PeerId;

fn default_step() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

/// `blocks_by_range` flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlocksByRangeCommand {
    pub peer: PeerId,
    pub start_slot: u64,
    pub count: u64,
    #[serde(default = "default_step")]
    pub step: u64,
    /// Deadline for the whole exchange. 0 disables it, absent uses the config.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// `none` or `snappy`. Absent uses the config.
    #[serde(default)]
    pub compression: Option<String>,
    /// Persist received blocks.
    #[serde(default = "default_true")]
    pub store: bool,
    /// Apply received blocks to the chain.
    #[serde(default = "default_true")]
    pub process: bool,
}

/// `status` flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusCommand {
    pub peer: PeerId,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub compression: Option<String>,
}

/// `watch_status` flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchStatusCommand {
    pub peer: PeerId,
    pub interval_ms: u64,
}

/// Every command the controller understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    BlocksByRange(BlocksByRangeCommand),
    Status(StatusCommand),
    /// Poll a peer's status in the background until unwatched.
    WatchStatus(WatchStatusCommand),
    Unwatch { peer: PeerId },
}

impl Command {
    /// Parse one JSON command.
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// [`Status`] with roots as hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub fork_digest: String,
    pub finalized_root: String,
    pub finalized_epoch: u64,
    pub head_root: String,
    pub head_slot: u64,
}

fn prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

impl From<&Status> for StatusView {
    fn from(status: &Status) -> Self {
        Self {
            fork_digest: prefixed_hex(&status.fork_digest),
            finalized_root: prefixed_hex(&status.finalized_root),
            finalized_epoch: status.finalized_epoch,
            head_root: prefixed_hex(&status.head_root),
            head_slot: status.head_slot,
        }
    }
}

/// Result of one command, written back as one JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    BlocksByRange {
        peer: PeerId,
        received: u64,
        newly_stored: u64,
        processed: u64,
    },
    Status {
        peer: PeerId,
        status: StatusView,
    },
    Watching {
        peer: PeerId,
        interval_ms: u64,
    },
    Unwatched {
        peer: PeerId,
        was_watching: bool,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        chunk_index: Option<u64>,
    },
}

impl CommandOutcome {
    pub(crate) fn blocks_by_range(peer: PeerId, summary: RangeSyncSummary) -> Self {
        Self::BlocksByRange {
            peer,
            received: summary.received,
            newly_stored: summary.newly_stored,
            processed: summary.processed,
        }
    }

    /// Terminal error with its chunk context.
    pub fn failed(err: &ReqRespError) -> Self {
        Self::Failed {
            error: err.to_string(),
            chunk_index: err.chunk_index(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}
