// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Per-node state and client-initiated protocol flows
//!
//! A [`Node`] bundles the singletons of one simulated router: its own
//! descriptor, the link-state database, the ports table, and the one-shot
//! `start` gate. Nothing here is process-global, so a test suite can run
//! several nodes inside one process.
//!
//! The client sides of the protocol live here as well: `start`, `connect`,
//! `attach`, `disconnect`, and `quit` all originate outbound connections,
//! while [`crate::server`] hosts the corresponding request handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;

use crate::error::{PortsError, ProtocolError, SospfError};
use crate::lsa::{LinkDescription, LinkStateAdvertisement};
use crate::lsd::LinkStateDatabase;
use crate::packet::{PacketKind, SospfPacket};
use crate::ports::{self, Link, NeighborStatus, NodeDescriptor, PortsTable, SlotLookup};
use crate::{NUM_PORTS, NodeId};

/// One simulated router in the overlay
#[derive(Debug)]
pub struct Node {
    descriptor: NodeDescriptor,
    lsd: LinkStateDatabase,
    ports: PortsTable,
    has_run_start: AtomicBool,
}

impl Node {
    /// Creates a node identified by `node_id` whose server listens at the
    /// given process endpoint.
    pub fn new(node_id: NodeId, process_ip: String, process_port: u16) -> Self {
        let descriptor = NodeDescriptor::local(process_ip, process_port, node_id.clone());
        Self {
            descriptor,
            lsd: LinkStateDatabase::new(node_id),
            ports: PortsTable::new(),
            has_run_start: AtomicBool::new(false),
        }
    }

    /// Simulated identity of this node.
    pub fn id(&self) -> &str {
        &self.descriptor.node_id
    }

    /// Descriptor of this node itself.
    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    /// Process port at which this node's server listens.
    pub fn process_port(&self) -> u16 {
        self.descriptor.process_port
    }

    /// This node's link-state database.
    pub fn lsd(&self) -> &LinkStateDatabase {
        &self.lsd
    }

    /// This node's ports table.
    pub fn ports(&self) -> &PortsTable {
        &self.ports
    }

    /// Installs a link to a remote node at a free port slot.
    ///
    /// Purely local: no network traffic is triggered, and the new link
    /// starts out with `UNKNOWN` status until a handshake runs.
    pub async fn attach(
        &self,
        remote_process_ip: &str,
        remote_process_port: u16,
        remote_id: &str,
        weight: u32,
    ) -> Result<usize, SospfError> {
        ports::verify_attachment_args(
            &self.descriptor,
            remote_process_ip,
            remote_process_port,
            remote_id,
            weight,
        )?;

        match self.ports.find_free_slot(remote_id).await {
            SlotLookup::Exhausted => Err(PortsError::Exhausted.into()),
            SlotLookup::Duplicate => {
                Err(PortsError::DuplicateNeighbor(remote_id.to_string()).into())
            }
            SlotLookup::Free(index) => {
                let target = NodeDescriptor::remote(
                    remote_process_ip.to_string(),
                    remote_process_port,
                    remote_id.to_string(),
                    weight,
                );
                self.ports
                    .attach(index, Link::new(self.descriptor.clone(), target))
                    .await?;
                println!(
                    "Successfully attached to remote node {} at {}:{}",
                    remote_id, remote_process_ip, remote_process_port
                );
                Ok(index)
            }
        }
    }

    /// Runs the client side of the HELLO handshake on every attached slot.
    ///
    /// Failures on one link are reported and do not stop the broadcast to
    /// the remaining links.
    pub async fn start(&self) {
        self.has_run_start.store(true, Ordering::SeqCst);

        let slots = self.ports.snapshot().await;
        let mut attempted = false;
        for (index, slot) in slots.iter().enumerate() {
            let Some(link) = slot else {
                continue;
            };
            attempted = true;
            if let Err(error) = self.run_handshake(index, PacketKind::Hello).await {
                eprintln!(
                    "Error: failed to broadcast HELLO to {}: {}",
                    link.target.node_id, error
                );
            }
        }
        if !attempted {
            println!("No attached links for which to start a HELLO broadcast.");
        }
    }

    /// Attaches to a remote node and immediately runs a CONNECT handshake,
    /// making the given weight authoritative for the link.
    ///
    /// Requires that `start` has run at least once.
    pub async fn connect(
        &self,
        remote_process_ip: &str,
        remote_process_port: u16,
        remote_id: &str,
        weight: u32,
    ) -> Result<(), SospfError> {
        if !self.has_run_start.load(Ordering::SeqCst) {
            println!("Please run start at least once before running connect.");
            return Ok(());
        }
        let index = self
            .attach(remote_process_ip, remote_process_port, remote_id, weight)
            .await?;
        self.run_handshake(index, PacketKind::Connect).await
    }

    /// Client side of the three-message handshake on one connection.
    async fn run_handshake(&self, index: usize, kind: PacketKind) -> Result<(), SospfError> {
        let link = self
            .ports
            .link_at(index)
            .await?
            .ok_or(PortsError::SlotEmpty(index))?;
        let remote = link.target.clone();

        let mut stream =
            TcpStream::connect((remote.process_ip.as_str(), remote.process_port)).await?;
        let opening = SospfPacket::handshake(kind, &self.descriptor, &remote.node_id, link.weight);
        opening.write_to(&mut stream).await?;

        let reply = SospfPacket::read_from(&mut stream).await?;
        if reply.kind == PacketKind::NoPortsAvailable {
            return Err(ProtocolError::RemotePortsExhausted(remote.node_id.clone()).into());
        }
        if reply.kind != kind {
            return Err(ProtocolError::UnexpectedPacket {
                expected: kind.to_string(),
                got: reply.kind.to_string(),
            }
            .into());
        }

        self.ports
            .set_link_status(index, NeighborStatus::TwoWay)
            .await?;
        println!("set {} state to TWO_WAY", remote.node_id);

        // Echo the opening envelope so the server promotes us as well.
        opening.write_to(&mut stream).await?;

        self.refresh_self_lsa().await;
        self.sync_lsd_as_client(&mut stream, &remote.node_id).await?;
        drop(stream);

        self.flood_excluding(Some(&remote.node_id)).await;
        Ok(())
    }

    /// Tears down the link at the given port index.
    ///
    /// A TWO_WAY link is disconnected over the wire and the databases are
    /// resynchronized; anything less is detached locally without traffic.
    /// With `is_shutdown` set, the self-LSA is tombstoned before the final
    /// synchronization so peers learn this node is going away.
    pub async fn disconnect(&self, index: usize, is_shutdown: bool) -> Result<(), SospfError> {
        let Some(link) = self.ports.link_at(index).await? else {
            println!("No link to detach at port index {}.", index);
            return Ok(());
        };
        let remote = link.target.clone();

        if remote.status != NeighborStatus::TwoWay {
            self.ports.detach(index).await?;
            println!("Detached uninitialized link at port index {}.", index);
            return Ok(());
        }

        let mut stream =
            TcpStream::connect((remote.process_ip.as_str(), remote.process_port)).await?;
        SospfPacket::disconnect(&self.descriptor, &remote.node_id)
            .write_to(&mut stream)
            .await?;

        let reply = SospfPacket::read_from(&mut stream).await?;
        if reply.kind != PacketKind::Disconnect {
            return Err(ProtocolError::UnexpectedPacket {
                expected: PacketKind::Disconnect.to_string(),
                got: reply.kind.to_string(),
            }
            .into());
        }

        self.ports.detach(index).await?;
        println!(
            "Successfully detached from remote neighbor at port index {}.",
            index
        );

        self.refresh_self_lsa().await;
        if is_shutdown {
            self.lsd.mark_shutdown(self.id()).await;
        }

        self.sync_lsd_as_client(&mut stream, &remote.node_id).await?;
        drop(stream);

        self.flood_excluding(Some(&remote.node_id)).await;
        Ok(())
    }

    /// Disconnects every TWO_WAY neighbor ahead of process exit.
    pub async fn quit(&self) {
        for index in 0..NUM_PORTS {
            let link = self.ports.link_at(index).await.ok().flatten();
            if let Some(link) = link
                && link.target.status == NeighborStatus::TwoWay
                && let Err(error) = self.disconnect(index, true).await
            {
                eprintln!(
                    "Error: failed to disconnect port {} while quitting: {}",
                    index, error
                );
            }
        }
    }

    /// Prints the attached slots and their peering status.
    pub async fn print_neighbors(&self) {
        let slots = self.ports.snapshot().await;
        let mut found = false;
        for (index, slot) in slots.iter().enumerate() {
            let Some(link) = slot else {
                continue;
            };
            found = true;
            if link.target.status == NeighborStatus::TwoWay {
                println!(
                    "TWO_WAY neighbor '{}' linked at outbound port index {} with link weight {}",
                    link.target.node_id, index, link.weight
                );
            } else {
                println!(
                    "Attached node '{}' ({}) at outbound port index {} with link weight {}",
                    link.target.node_id, link.target.status, index, link.weight
                );
            }
        }
        if !found {
            println!("No neighboring nodes are currently linked to our outbound ports.");
        }
    }

    /// Shortest path from this node to the destination, if one exists.
    pub async fn detect(&self, destination: &str) -> Option<String> {
        self.lsd.shortest_path(destination).await
    }

    /// Rewrites this node's own LSA from the current ports table. Only
    /// TWO_WAY links are advertised.
    pub(crate) async fn refresh_self_lsa(&self) -> LinkStateAdvertisement {
        let slots = self.ports.snapshot().await;
        let links = slots
            .iter()
            .enumerate()
            .filter_map(|(port_index, slot)| {
                slot.as_ref()
                    .filter(|link| link.target.status == NeighborStatus::TwoWay)
                    .map(|link| LinkDescription {
                        neighbor_id: link.target.node_id.clone(),
                        port_index,
                        weight: link.weight,
                    })
            })
            .collect();
        self.lsd.refresh_self(links).await
    }

    /// Applies the LSAs carried by an LSAUPDATE envelope, returning whether
    /// the local state changed.
    ///
    /// When the sender is a directly-attached neighbor whose freshly stored
    /// LSA advertises a different weight for the link back to this node,
    /// the local port weight is updated to match and the self-LSA is
    /// rewritten. This is the authoritative path by which weight changes
    /// propagate through the overlay.
    pub(crate) async fn ingest_lsa_update(&self, packet: &SospfPacket) -> bool {
        let mut changed = false;
        if let Some(lsa_array) = &packet.lsa_array {
            for lsa in lsa_array {
                if self.lsd.apply(lsa).await {
                    changed = true;
                }
            }
        }

        if let Some(index) = self.ports.find_attached_slot(&packet.src_id).await
            && let Some(sender_lsa) = self.lsd.get(&packet.src_id).await
            && let Some(local_link) = self.ports.link_at(index).await.ok().flatten()
        {
            for advertised in &sender_lsa.links {
                if advertised.neighbor_id == self.id() && advertised.weight != local_link.weight {
                    let _ = self.ports.set_link_weight(index, advertised.weight).await;
                    self.refresh_self_lsa().await;
                    changed = true;
                    break;
                }
            }
        }

        changed
    }

    /// Sends one LSAUPDATE carrying the current database snapshot to every
    /// TWO_WAY neighbor, skipping shut-down peers and the excluded id.
    ///
    /// No reply is awaited; a failing peer does not stop the broadcast to
    /// the remaining ones.
    pub(crate) async fn flood_excluding(&self, excluded_id: Option<&str>) {
        let slots = self.ports.snapshot().await;
        for link in slots.iter().flatten() {
            let remote = &link.target;
            if let Some(excluded) = excluded_id
                && remote.node_id == excluded
            {
                continue;
            }
            if remote.status != NeighborStatus::TwoWay {
                continue;
            }
            if let Some(lsa) = self.lsd.get(&remote.node_id).await
                && lsa.has_shutdown
            {
                continue;
            }
            if let Err(error) = self.send_lsa_update_to(remote).await {
                eprintln!(
                    "Error: failed to broadcast LSAUPDATE to {}: {}",
                    remote.node_id, error
                );
            }
        }
    }

    async fn send_lsa_update_to(&self, remote: &NodeDescriptor) -> Result<(), SospfError> {
        let mut stream =
            TcpStream::connect((remote.process_ip.as_str(), remote.process_port)).await?;
        let snapshot = self.lsd.snapshot().await;
        SospfPacket::lsa_update(&self.descriptor, &remote.node_id, snapshot)
            .write_to(&mut stream)
            .await?;
        Ok(())
    }

    /// Client half of the inline database synchronization: send our
    /// snapshot first, then apply the peer's. The server side deliberately
    /// waits for ours before answering, so the two ends never step on each
    /// other's socket setup.
    pub(crate) async fn sync_lsd_as_client(
        &self,
        stream: &mut TcpStream,
        remote_id: &str,
    ) -> Result<(), SospfError> {
        let snapshot = self.lsd.snapshot().await;
        SospfPacket::lsa_update(&self.descriptor, remote_id, snapshot)
            .write_to(stream)
            .await?;

        let response = SospfPacket::read_from(stream).await?;
        if response.kind != PacketKind::LsaUpdate {
            return Err(ProtocolError::UnexpectedPacket {
                expected: PacketKind::LsaUpdate.to_string(),
                got: response.kind.to_string(),
            }
            .into());
        }
        self.ingest_lsa_update(&response).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node() -> Node {
        Node::new("1.1.1.1".to_string(), "127.0.0.1".to_string(), 20000)
    }

    #[tokio::test]
    async fn test_attach_validates_and_installs() {
        let node = test_node();

        let index = node.attach("127.0.0.1", 20001, "2.2.2.2", 7).await.unwrap();
        assert_eq!(index, 0);

        let link = node.ports().link_at(0).await.unwrap().unwrap();
        assert_eq!(link.target.node_id, "2.2.2.2");
        assert_eq!(link.target.status, NeighborStatus::Unknown);
        assert_eq!(link.weight, 7);
    }

    #[tokio::test]
    async fn test_attach_rejects_self_and_duplicates() {
        let node = test_node();

        let result = node.attach("127.0.0.1", 20001, "1.1.1.1", 7).await;
        assert!(matches!(
            result,
            Err(SospfError::Ports(PortsError::SelfAttachment(_)))
        ));

        node.attach("127.0.0.1", 20001, "2.2.2.2", 7).await.unwrap();
        let result = node.attach("127.0.0.1", 20002, "2.2.2.2", 9).await;
        assert!(matches!(
            result,
            Err(SospfError::Ports(PortsError::DuplicateNeighbor(_)))
        ));
    }

    #[tokio::test]
    async fn test_fifth_attachment_rejected_without_mutation() {
        let node = test_node();
        for (offset, id) in ["2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5"]
            .iter()
            .enumerate()
        {
            node.attach("127.0.0.1", 20001 + offset as u16, id, 1)
                .await
                .unwrap();
        }

        let result = node.attach("127.0.0.1", 20009, "6.6.6.6", 1).await;
        assert!(matches!(
            result,
            Err(SospfError::Ports(PortsError::Exhausted))
        ));

        let slots = node.ports().snapshot().await;
        assert!(slots.iter().all(|slot| {
            slot.as_ref()
                .is_some_and(|link| link.target.node_id != "6.6.6.6")
        }));
    }

    #[tokio::test]
    async fn test_self_lsa_advertises_only_two_way_links() {
        let node = test_node();
        node.attach("127.0.0.1", 20001, "2.2.2.2", 7).await.unwrap();
        node.attach("127.0.0.1", 20002, "3.3.3.3", 2).await.unwrap();
        node.ports()
            .set_link_status(1, NeighborStatus::TwoWay)
            .await
            .unwrap();

        let lsa = node.refresh_self_lsa().await;
        assert_eq!(lsa.seq_number, 0);
        assert_eq!(lsa.links.len(), 1);
        assert_eq!(lsa.links[0].neighbor_id, "3.3.3.3");
        assert_eq!(lsa.links[0].port_index, 1);
    }

    #[tokio::test]
    async fn test_ingest_mirrors_advertised_weight_change() {
        let node = test_node();
        node.attach("127.0.0.1", 20001, "2.2.2.2", 7).await.unwrap();
        node.ports()
            .set_link_status(0, NeighborStatus::TwoWay)
            .await
            .unwrap();
        node.refresh_self_lsa().await;

        // The neighbor advertises the shared link at weight 1.
        let neighbor_lsa = LinkStateAdvertisement {
            origin_id: "2.2.2.2".to_string(),
            seq_number: 3,
            has_shutdown: false,
            links: vec![LinkDescription {
                neighbor_id: "1.1.1.1".to_string(),
                port_index: 0,
                weight: 1,
            }],
        };
        let remote =
            NodeDescriptor::remote("127.0.0.1".to_string(), 20001, "2.2.2.2".to_string(), 1);
        let update = SospfPacket::lsa_update(&remote, "1.1.1.1", vec![neighbor_lsa]);

        let changed = node.ingest_lsa_update(&update).await;
        assert!(changed);

        let link = node.ports().link_at(0).await.unwrap().unwrap();
        assert_eq!(link.weight, 1);

        let own = node.lsd().get("1.1.1.1").await.unwrap();
        assert_eq!(own.links[0].weight, 1);

        // A second, identical update changes nothing further.
        assert!(!node.ingest_lsa_update(&update).await);
    }
}
