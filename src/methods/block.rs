use sha2::{Digest, Sha256};
use ssz::Encode;
use ssz_derive::{Decode, Encode};

/// 32-byte block or state root.
pub type Root = [u8; 32];

/// Beacon block as carried by range responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BeaconBlock {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: Root,
    pub state_root: Root,
    /// Opaque block body.
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct SignedBeaconBlock {
    pub message: BeaconBlock,
    pub signature: Vec<u8>,
}

impl BeaconBlock {
    /// SHA-256 over the SSZ encoding. Identifies the block in stores.
    pub fn root(&self) -> Root {
        let mut hasher = Sha256::new();
        hasher.update(self.as_ssz_bytes());
        hasher.finalize().into()
    }
}

impl SignedBeaconBlock {
    #[inline]
    pub fn slot(&self) -> u64 {
        self.message.slot
    }

    #[inline]
    pub fn root(&self) -> Root {
        self.message.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SszCodec;

    fn block(slot: u64) -> SignedBeaconBlock {
        SignedBeaconBlock {
            message: BeaconBlock {
                slot,
                proposer_index: 7,
                parent_root: [1; 32],
                state_root: [2; 32],
                body: vec![0xAB; 40],
            },
            signature: vec![0xCD; 96],
        }
    }

    #[test]
    fn test_ssz_roundtrip() {
        let original = block(100);
        let decoded: SignedBeaconBlock = SszCodec::decode(&SszCodec::encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_root_depends_on_slot() {
        assert_ne!(block(1).root(), block(2).root());
        assert_eq!(block(1).root(), block(1).root());
    }

    #[test]
    fn test_truncated_block_fails_decode() {
        let bytes = SszCodec::encode(&block(5));
        assert!(SszCodec::decode::<SignedBeaconBlock>(&bytes[..bytes.len() / 2]).is_err());
    }
}
