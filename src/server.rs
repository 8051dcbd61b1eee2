// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Server loop and per-connection request handlers
//!
//! Every node runs one accept loop for the lifetime of the process. Each
//! accepted connection is served by its own spawned task, which handles
//! exactly one protocol request and then closes. Handler failures are
//! logged and never reach the accept loop: a misbehaving peer stalls only
//! its own connection.

use std::io;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::error::{ProtocolError, SospfError, WireError};
use crate::node::Node;
use crate::packet::{PacketKind, SospfPacket};
use crate::ports::{Link, NeighborStatus, NodeDescriptor, SlotLookup};
use crate::{MAX_PROCESS_PORT, MIN_PROCESS_PORT};

/// Binds the node's listening socket by scanning the permitted port range
/// upward and claiming the first free port.
///
/// Exhausting the whole range without a successful bind is the one fatal
/// startup condition of a node.
pub async fn bind_listener(host: &str) -> Result<(TcpListener, u16), SospfError> {
    for port in MIN_PROCESS_PORT..=MAX_PROCESS_PORT {
        if let Ok(listener) = TcpListener::bind((host, port)).await {
            return Ok((listener, port));
        }
    }
    Err(SospfError::Io(io::Error::new(
        io::ErrorKind::AddrInUse,
        "no process ports available to start a node at this time",
    )))
}

/// Accepts inbound connections until process exit, spawning an independent
/// handler task per connection.
pub async fn run(node: Arc<Node>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, _peer)) => {
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(node, stream).await {
                        eprintln!("Error: request handler failed: {}", error);
                    }
                });
            }
            Err(error) => {
                eprintln!("Error: failed to accept incoming connection: {}", error);
            }
        }
    }
}

/// Serves exactly one protocol request on the accepted connection.
async fn handle_connection(node: Arc<Node>, mut stream: TcpStream) -> Result<(), SospfError> {
    let request = SospfPacket::read_from(&mut stream).await?;
    match request.kind {
        PacketKind::Hello => {
            handle_hello_conversation(&node, &mut stream, request, PacketKind::Hello).await
        }
        PacketKind::Connect => {
            handle_hello_conversation(&node, &mut stream, request, PacketKind::Connect).await
        }
        PacketKind::LsaUpdate => handle_lsa_update(&node, request).await,
        PacketKind::Disconnect => handle_disconnect(&node, &mut stream, request).await,
        PacketKind::Heartbeat => handle_heartbeat(&node, &mut stream, request).await,
        PacketKind::NoPortsAvailable => Err(ProtocolError::UnexpectedPacket {
            expected: "a request kind".to_string(),
            got: request.kind.to_string(),
        }
        .into()),
    }
}

/// Server side of the three-message handshake shared by HELLO and CONNECT.
async fn handle_hello_conversation(
    node: &Node,
    stream: &mut TcpStream,
    request: SospfPacket,
    kind: PacketKind,
) -> Result<(), SospfError> {
    let client_id = request.src_id.clone();
    let Some(weight) = request.weight else {
        return Err(WireError::MalformedEnvelope(format!(
            "{} without a transmission weight",
            kind
        ))
        .into());
    };

    println!("received HELLO from {}", client_id);

    let index = match node.ports().find_free_slot(&client_id).await {
        SlotLookup::Exhausted => {
            println!("No free port available on current node at this time.");
            SospfPacket::no_ports_available(node.descriptor(), &client_id)
                .write_to(stream)
                .await?;
            return Ok(());
        }
        SlotLookup::Duplicate => {
            // Rerunning the handshake against an existing attachment is
            // permitted and resets the link to INIT.
            println!(
                "(Found existing attachment for node {}; proceeding with the handshake.)",
                client_id
            );
            node.ports()
                .find_attached_slot(&client_id)
                .await
                .ok_or_else(|| ProtocolError::UnknownNeighbor(client_id.clone()))?
        }
        SlotLookup::Free(index) => {
            let target = NodeDescriptor::remote(
                request.src_process_ip.clone(),
                request.src_process_port,
                client_id.clone(),
                weight,
            );
            node.ports()
                .attach(index, Link::new(node.descriptor().clone(), target))
                .await?;
            index
        }
    };

    node.ports()
        .set_link_status(index, NeighborStatus::Init)
        .await?;
    println!("set {} state to INIT", client_id);

    SospfPacket::handshake(kind, node.descriptor(), &client_id, weight)
        .write_to(stream)
        .await?;

    let echo = SospfPacket::read_from(stream).await?;
    if echo.kind != kind {
        return Err(ProtocolError::UnexpectedPacket {
            expected: kind.to_string(),
            got: echo.kind.to_string(),
        }
        .into());
    }

    node.ports()
        .set_link_status(index, NeighborStatus::TwoWay)
        .await?;
    println!("set {} state to TWO_WAY", client_id);

    sync_lsd_with_client(node, stream, &client_id).await?;

    node.flood_excluding(Some(&client_id)).await;
    Ok(())
}

/// Server half of the inline database synchronization: wait for the
/// client's LSAUPDATE, apply it, rewrite the self-LSA to pick up any local
/// topology change, then answer with our own snapshot.
async fn sync_lsd_with_client(
    node: &Node,
    stream: &mut TcpStream,
    client_id: &str,
) -> Result<(), SospfError> {
    let update = SospfPacket::read_from(stream).await?;
    if update.kind != PacketKind::LsaUpdate {
        return Err(ProtocolError::UnexpectedPacket {
            expected: PacketKind::LsaUpdate.to_string(),
            got: update.kind.to_string(),
        }
        .into());
    }
    node.ingest_lsa_update(&update).await;

    node.refresh_self_lsa().await;

    let snapshot = node.lsd().snapshot().await;
    SospfPacket::lsa_update(node.descriptor(), client_id, snapshot)
        .write_to(stream)
        .await?;
    Ok(())
}

/// Handles a standalone LSAUPDATE arriving outside any synchronization.
///
/// The first update ever seen from a sender is answered by broadcasting to
/// all neighbors including the sender, so the sender learns this node's
/// state. Repeat contact broadcasts only when something changed, excluding
/// the sender to prevent update storms.
async fn handle_lsa_update(node: &Node, request: SospfPacket) -> Result<(), SospfError> {
    let first_contact = node.lsd().get(&request.src_id).await.is_none();
    let changed = node.ingest_lsa_update(&request).await;

    if first_contact {
        node.flood_excluding(None).await;
    } else if changed {
        node.flood_excluding(Some(&request.src_id)).await;
    }
    Ok(())
}

/// Acknowledges a DISCONNECT, detaches the slot, and resynchronizes the
/// databases over the same connection.
async fn handle_disconnect(
    node: &Node,
    stream: &mut TcpStream,
    request: SospfPacket,
) -> Result<(), SospfError> {
    let client_id = request.src_id.clone();
    let index = node
        .ports()
        .find_attached_slot(&client_id)
        .await
        .ok_or_else(|| ProtocolError::UnknownNeighbor(client_id.clone()))?;

    node.ports().detach(index).await?;
    println!(
        "Successfully detached from remote neighbor at port index {}.",
        index
    );

    SospfPacket::disconnect(node.descriptor(), &client_id)
        .write_to(stream)
        .await?;

    sync_lsd_with_client(node, stream, &client_id).await?;

    node.flood_excluding(Some(&client_id)).await;
    Ok(())
}

/// Echoes a HEARTBEAT iff the sender is a currently-attached neighbor;
/// probes from strangers fail silently.
async fn handle_heartbeat(
    node: &Node,
    stream: &mut TcpStream,
    request: SospfPacket,
) -> Result<(), SospfError> {
    if node
        .ports()
        .find_attached_slot(&request.src_id)
        .await
        .is_none()
    {
        return Ok(());
    }
    SospfPacket::heartbeat(node.descriptor(), &request.src_id)
        .write_to(stream)
        .await?;
    Ok(())
}
