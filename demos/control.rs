//! Control plane demo - JSON commands on stdin, one JSON outcome per line on stdout.
//!
//! This example demonstrates:
//! - Serving `beacon_blocks_by_range` and `status` from an in-process peer
//! - Building a client with the builder pattern
//! - Driving range sync and status watches through the controller
//!
//! # Running
//!
//! ```text
//! $ cargo run --example control
//! {"command":"blocks_by_range","peer":"peer-a","start_slot":10,"count":4}
//! {"outcome":"blocks_by_range","peer":"peer-a","received":4,"newly_stored":4,"processed":4}
//! {"command":"status","peer":"peer-a"}
//! {"outcome":"status","peer":"peer-a","status":{...}}
//! ```

use std::sync::Arc;
use std::time::Duration;

use beacon_reqresp::control::Controller;
use beacon_reqresp::handler::{HandlerRegistry, ResponseContext};
use beacon_reqresp::methods::{
    BeaconBlock, BlocksByRangeRequest, SignedBeaconBlock, Status, BLOCKS_BY_RANGE_V1, STATUS_V1,
};
use beacon_reqresp::sync::{MemoryBlockStore, MemoryChain};
use beacon_reqresp::transport::{MemoryNetwork, PeerId};
use beacon_reqresp::{ReqRespClient, ReqRespConfig};
use tokio::io::BufReader;

/// Head of the demo peer's chain.
const HEAD_SLOT: u64 = 256;

fn block_at(slot: u64) -> SignedBeaconBlock {
    SignedBeaconBlock {
        message: BeaconBlock {
            slot,
            proposer_index: slot % 32,
            parent_root: [0; 32],
            state_root: [0; 32],
            body: slot.to_le_bytes().to_vec(),
        },
        signature: vec![0; 96],
    }
}

fn demo_peer() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(
        BLOCKS_BY_RANGE_V1,
        |req: BlocksByRangeRequest, ctx: ResponseContext| async move {
            for slot in req.slots().take_while(|&s| s <= HEAD_SLOT) {
                ctx.respond(&block_at(slot)).await?;
            }
            Ok(())
        },
    );

    registry.register(STATUS_V1, |_: Status, ctx: ResponseContext| async move {
        let head = block_at(HEAD_SLOT).root();
        ctx.respond(&Status {
            fork_digest: [0x6a, 0x95, 0xa1, 0xa9],
            finalized_root: head,
            finalized_epoch: HEAD_SLOT / 32,
            head_root: head,
            head_slot: HEAD_SLOT,
        })
        .await
    });

    registry
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ReqRespConfig::default();
    let network = Arc::new(MemoryNetwork::new(config.clone()));
    network.add_peer(PeerId::from("peer-a"), Arc::new(demo_peer()));

    let client = ReqRespClient::builder()
        .config(config)
        .request_timeout(Duration::from_secs(5))
        .build(network.clone(), network);
    let controller = Controller::new(
        client,
        Arc::new(MemoryBlockStore::new()),
        Arc::new(MemoryChain::new()),
    );

    // Serve until stdin closes
    let mut stdout = tokio::io::stdout();
    controller
        .serve_lines(BufReader::new(tokio::io::stdin()), &mut stdout)
        .await?;
    controller.shutdown().await;

    Ok(())
}
