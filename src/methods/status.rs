use ssz_derive::{Decode, Encode};

use super::Root;

/// Chain summary exchanged in a `status` handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Encode, Decode)]
pub struct Status {
    pub fork_digest: [u8; 4],
    pub finalized_root: Root,
    pub finalized_epoch: u64,
    pub head_root: Root,
    pub head_slot: u64,
}
