// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Optional heartbeat-based liveness detection
//!
//! When enabled, a background task pings every TWO_WAY neighbor with a
//! HEARTBEAT envelope on a fixed cadence. A neighbor that fails all
//! retries is considered dead: its port is detached, its stored LSA is
//! tombstoned with a bumped sequence number, the self-LSA is rewritten,
//! and the change is flooded to the surviving neighbors.
//!
//! The request handler answers probes regardless of whether this task is
//! running, so heartbeat-enabled and heartbeat-disabled nodes interoperate.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::error::{ProtocolError, SospfError};
use crate::node::Node;
use crate::packet::{PacketKind, SospfPacket};
use crate::ports::{NeighborStatus, NodeDescriptor};

/// Interval between heartbeat cycles.
pub const HEARTBEAT_WAIT: Duration = Duration::from_secs(5);

/// Number of failed probes after which a neighbor is declared dead.
pub const HEARTBEAT_MAX_RETRY: u32 = 5;

/// Spawns the heartbeat prober for the given node.
pub fn spawn(node: Arc<Node>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_WAIT);
        // The first tick fires immediately; skip it so freshly-started
        // nodes get a full interval before the first probe.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_cycle(&node).await;
        }
    })
}

/// Probes every TWO_WAY neighbor once, detaching those that stay silent.
async fn run_cycle(node: &Node) {
    let mut changed = false;
    let slots = node.ports().snapshot().await;

    for (index, slot) in slots.iter().enumerate() {
        let Some(link) = slot else {
            continue;
        };
        if link.target.status != NeighborStatus::TwoWay {
            continue;
        }

        let mut alive = false;
        for _ in 0..HEARTBEAT_MAX_RETRY {
            if ping(node, &link.target).await.is_ok() {
                alive = true;
                break;
            }
        }
        if alive {
            continue;
        }

        // The link may have been detached explicitly while we were probing.
        if node
            .ports()
            .find_attached_slot(&link.target.node_id)
            .await
            .is_none()
        {
            continue;
        }

        println!(
            "No heartbeat heard for neighbor with id {}",
            link.target.node_id
        );
        if let Err(error) = node.ports().detach(index).await {
            eprintln!(
                "Error: failed to detach dead neighbor {}: {}",
                link.target.node_id, error
            );
            continue;
        }

        node.refresh_self_lsa().await;
        node.lsd().mark_shutdown(&link.target.node_id).await;
        changed = true;
    }

    if changed {
        node.flood_excluding(None).await;
    }
}

/// Sends one HEARTBEAT probe and waits for the echo.
async fn ping(node: &Node, remote: &NodeDescriptor) -> Result<(), SospfError> {
    let mut stream = TcpStream::connect((remote.process_ip.as_str(), remote.process_port)).await?;
    SospfPacket::heartbeat(node.descriptor(), &remote.node_id)
        .write_to(&mut stream)
        .await?;
    let reply = SospfPacket::read_from(&mut stream).await?;
    if reply.kind != PacketKind::Heartbeat {
        return Err(ProtocolError::UnexpectedPacket {
            expected: PacketKind::Heartbeat.to_string(),
            got: reply.kind.to_string(),
        }
        .into());
    }
    Ok(())
}
