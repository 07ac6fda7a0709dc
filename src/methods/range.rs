use ssz_derive::{Decode, Encode};

use crate::error::{ReqRespError, Result};

/// `beacon_blocks_by_range` request.
///
/// Asks for up to `count` blocks at slots `start_slot`, `start_slot + step`,
/// and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct BlocksByRangeRequest {
    pub start_slot: u64,
    pub count: u64,
    pub step: u64,
}

impl BlocksByRangeRequest {
    pub fn new(start_slot: u64, count: u64, step: u64) -> Self {
        Self {
            start_slot,
            count,
            step,
        }
    }

    /// Reject requests no peer could answer.
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(ReqRespError::InvalidRequest("count must be > 0".into()));
        }
        if self.step == 0 {
            return Err(ReqRespError::InvalidRequest("step must be > 0".into()));
        }
        if self.last_slot().is_none() {
            return Err(ReqRespError::InvalidRequest(format!(
                "slot range from {} overflows",
                self.start_slot
            )));
        }
        Ok(())
    }

    /// Slot expected at response chunk `index`.
    pub fn expected_slot(&self, index: u64) -> Option<u64> {
        index
            .checked_mul(self.step)
            .and_then(|offset| self.start_slot.checked_add(offset))
    }

    /// Slot of the last requested block.
    pub fn last_slot(&self) -> Option<u64> {
        self.expected_slot(self.count.checked_sub(1)?)
    }

    /// Requested slots in order.
    pub fn slots(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.count).map_while(move |i| self.expected_slot(i))
    }
}
