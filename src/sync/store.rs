//! Collaborators that receive synced blocks.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BoxError;
use crate::methods::{Root, SignedBeaconBlock};

/// Block persistence.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block. Returns `true` if the block was already known.
    async fn store(&self, block: &SignedBeaconBlock) -> Result<bool, BoxError>;
}

/// Chain-state processing.
#[async_trait]
pub trait ChainSink: Send + Sync {
    /// Apply a block to the local chain.
    async fn add_block(&self, block: &SignedBeaconBlock) -> Result<(), BoxError>;
}

/// Blocks kept in a map keyed by root.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<Root, SignedBeaconBlock>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    pub fn get(&self, root: &Root) -> Option<SignedBeaconBlock> {
        self.blocks.lock().get(root).cloned()
    }

    /// Slots of all stored blocks, ascending.
    pub fn slots(&self) -> Vec<u64> {
        let mut slots: Vec<_> = self.blocks.lock().values().map(|b| b.slot()).collect();
        slots.sort_unstable();
        slots
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn store(&self, block: &SignedBeaconBlock) -> Result<bool, BoxError> {
        let mut blocks = self.blocks.lock();
        let root = block.root();
        if blocks.contains_key(&root) {
            return Ok(true);
        }
        blocks.insert(root, block.clone());
        Ok(false)
    }
}

/// Linear chain that only accepts blocks above its head.
#[derive(Debug, Default)]
pub struct MemoryChain {
    slots: Mutex<Vec<u64>>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of the newest block, if any.
    pub fn head_slot(&self) -> Option<u64> {
        self.slots.lock().last().copied()
    }

    /// All applied slots in order.
    pub fn slots(&self) -> Vec<u64> {
        self.slots.lock().clone()
    }
}

#[async_trait]
impl ChainSink for MemoryChain {
    async fn add_block(&self, block: &SignedBeaconBlock) -> Result<(), BoxError> {
        let mut slots = self.slots.lock();
        if let Some(&head) = slots.last() {
            if block.slot() <= head {
                return Err(format!("block at slot {} is not above head {}", block.slot(), head).into());
            }
        }
        slots.push(block.slot());
        Ok(())
    }
}
