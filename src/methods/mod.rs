//! Request/response methods and their SSZ objects.
//!
//! | Method                   | Request                  | Response chunks              |
//! |--------------------------|--------------------------|------------------------------|
//! | `beacon_blocks_by_range` | [`BlocksByRangeRequest`] | `count` x [`SignedBeaconBlock`] |
//! | `status`                 | [`Status`]               | 1 x [`Status`]               |

mod block;
mod range;
mod status;

use crate::protocol::MethodDescriptor;

pub use block::{BeaconBlock, Root, SignedBeaconBlock};
pub use range::BlocksByRangeRequest;
pub use status::Status;

/// `beacon_blocks_by_range` version 1.
pub const BLOCKS_BY_RANGE_V1: MethodDescriptor = MethodDescriptor::ssz("beacon_blocks_by_range", 1);

/// `status` version 1.
pub const STATUS_V1: MethodDescriptor = MethodDescriptor::ssz("status", 1);
