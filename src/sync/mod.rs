//! Block-range sync: the canonical consumer of the response reader.
//!
//! [`BlocksByRangeHandler`] checks each decoded block against the requested
//! slot sequence, then hands it to the optional [`BlockStore`] and
//! [`ChainSink`] collaborators.

mod range;
mod store;

pub use range::{BlocksByRangeHandler, RangeSyncSummary};
pub use store::{BlockStore, ChainSink, MemoryBlockStore, MemoryChain};
