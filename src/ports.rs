// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Neighbor descriptors and the fixed-size ports table
//!
//! A node exposes exactly [`NUM_PORTS`](crate::NUM_PORTS) slots, each either
//! empty or holding a [`Link`] to one neighbor. The table is the local
//! source of truth for peering status and link weights; the self-LSA is
//! derived from it after every change.

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::PortsError;
use crate::{MAX_PROCESS_PORT, MIN_PROCESS_PORT, NUM_PORTS, NodeId, WEIGHT_TO_SELF};

/// Discrete peering status of one end of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStatus {
    /// No handshake traffic observed yet
    Unknown,
    /// First HELLO sent or received
    Init,
    /// Handshake complete; the link carries advertisements and traffic
    TwoWay,
}

impl fmt::Display for NeighborStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NeighborStatus::Unknown => write!(f, "UNKNOWN"),
            NeighborStatus::Init => write!(f, "INIT"),
            NeighborStatus::TwoWay => write!(f, "TWO_WAY"),
        }
    }
}

/// Description summarizing the state of one node in the overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    /// Process address of the node's listening socket
    pub process_ip: String,
    /// Process port of the node's listening socket
    pub process_port: u16,
    /// Simulated identity of the node in the overlay
    pub node_id: NodeId,
    /// Current peering status of this descriptor's end of a link
    pub status: NeighborStatus,
    /// Cost of transmitting a packet to this node
    pub weight: u32,
}

impl NodeDescriptor {
    /// Creates the descriptor of the local node itself.
    pub fn local(process_ip: String, process_port: u16, node_id: NodeId) -> Self {
        Self {
            process_ip,
            process_port,
            node_id,
            status: NeighborStatus::Unknown,
            weight: WEIGHT_TO_SELF,
        }
    }

    /// Creates the descriptor of a remote neighbor reached at the given
    /// weight. Remote descriptors start out with `UNKNOWN` status.
    pub fn remote(process_ip: String, process_port: u16, node_id: NodeId, weight: u32) -> Self {
        Self {
            process_ip,
            process_port,
            node_id,
            status: NeighborStatus::Unknown,
            weight,
        }
    }
}

/// A bound slot in the ports table: an attested, weighted relationship
/// from the local node to one neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Descriptor of the local node
    pub origin: NodeDescriptor,
    /// Descriptor of the neighbor at the far end
    pub target: NodeDescriptor,
    /// Authoritative cost for outbound traffic over this link
    pub weight: u32,
}

impl Link {
    /// Binds origin and target descriptors into a link. The link weight is
    /// taken from the target descriptor.
    pub fn new(origin: NodeDescriptor, target: NodeDescriptor) -> Self {
        let weight = target.weight;
        Self {
            origin,
            target,
            weight,
        }
    }
}

/// Outcome of looking for a slot at which to attach a remote node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLookup {
    /// An empty slot is available at this index
    Free(usize),
    /// A slot already holds a link to the requested node id
    Duplicate,
    /// Every slot is occupied
    Exhausted,
}

/// Validates the arguments of an attempted attachment against the local
/// node's own descriptor.
pub fn verify_attachment_args(
    local: &NodeDescriptor,
    remote_process_ip: &str,
    remote_process_port: u16,
    remote_id: &str,
    weight: u32,
) -> Result<(), PortsError> {
    if remote_process_ip.is_empty() {
        return Err(PortsError::EmptyProcessAddress);
    }
    if remote_id.is_empty() {
        return Err(PortsError::EmptyNodeId);
    }
    if !(MIN_PROCESS_PORT..=MAX_PROCESS_PORT).contains(&remote_process_port) {
        return Err(PortsError::PortOutOfRange(remote_process_port));
    }
    if weight <= WEIGHT_TO_SELF {
        return Err(PortsError::InvalidWeight(weight));
    }
    if remote_id == local.node_id {
        return Err(PortsError::SelfAttachment(remote_id.to_string()));
    }
    if remote_process_port == local.process_port {
        return Err(PortsError::OwnProcessPort(remote_process_port));
    }
    Ok(())
}

/// Fixed-size array of neighbor slots
///
/// Thread-safe and cheaply cloneable; all clones share the same slots.
/// Readers may observe a snapshot that is stale relative to concurrent
/// attach/detach, but never a partially-initialized link.
#[derive(Debug, Clone)]
pub struct PortsTable {
    slots: Arc<RwLock<[Option<Link>; NUM_PORTS]>>,
}

impl PortsTable {
    /// Creates a table with every slot empty.
    pub fn new() -> Self {
        Self {
            slots: Arc::new(RwLock::new(std::array::from_fn(|_| None))),
        }
    }

    /// Looks for a slot at which the given remote node could attach.
    ///
    /// A duplicate attachment is reported before exhaustion: at most one
    /// link per remote node id may exist across the table.
    pub async fn find_free_slot(&self, remote_id: &str) -> SlotLookup {
        let slots = self.slots.read().await;
        if slots
            .iter()
            .flatten()
            .any(|link| link.target.node_id == remote_id)
        {
            return SlotLookup::Duplicate;
        }
        match slots.iter().position(|slot| slot.is_none()) {
            Some(index) => SlotLookup::Free(index),
            None => SlotLookup::Exhausted,
        }
    }

    /// Returns the index of the slot attached to the given remote node.
    pub async fn find_attached_slot(&self, remote_id: &str) -> Option<usize> {
        let slots = self.slots.read().await;
        slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|link| link.target.node_id == remote_id)
        })
    }

    /// Installs a link at the given index.
    pub async fn attach(&self, index: usize, link: Link) -> Result<(), PortsError> {
        if index >= NUM_PORTS {
            return Err(PortsError::BadIndex(index));
        }
        let mut slots = self.slots.write().await;
        slots[index] = Some(link);
        Ok(())
    }

    /// Clears the slot at the given index, returning the detached link.
    pub async fn detach(&self, index: usize) -> Result<Link, PortsError> {
        if index >= NUM_PORTS {
            return Err(PortsError::BadIndex(index));
        }
        let mut slots = self.slots.write().await;
        slots[index].take().ok_or(PortsError::SlotEmpty(index))
    }

    /// Reads the link at the given index, if any.
    pub async fn link_at(&self, index: usize) -> Result<Option<Link>, PortsError> {
        if index >= NUM_PORTS {
            return Err(PortsError::BadIndex(index));
        }
        let slots = self.slots.read().await;
        Ok(slots[index].clone())
    }

    /// Sets both endpoints of the link at the given index to one status.
    pub async fn set_link_status(
        &self,
        index: usize,
        status: NeighborStatus,
    ) -> Result<(), PortsError> {
        if index >= NUM_PORTS {
            return Err(PortsError::BadIndex(index));
        }
        let mut slots = self.slots.write().await;
        let link = slots[index].as_mut().ok_or(PortsError::SlotEmpty(index))?;
        link.origin.status = status;
        link.target.status = status;
        Ok(())
    }

    /// Overwrites the authoritative weight of the link at the given index.
    pub async fn set_link_weight(&self, index: usize, weight: u32) -> Result<(), PortsError> {
        if index >= NUM_PORTS {
            return Err(PortsError::BadIndex(index));
        }
        let mut slots = self.slots.write().await;
        let link = slots[index].as_mut().ok_or(PortsError::SlotEmpty(index))?;
        link.weight = weight;
        link.target.weight = weight;
        Ok(())
    }

    /// Clones the current state of every slot.
    pub async fn snapshot(&self) -> [Option<Link>; NUM_PORTS] {
        self.slots.read().await.clone()
    }
}

impl Default for PortsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_descriptor() -> NodeDescriptor {
        NodeDescriptor::local("127.0.0.1".to_string(), 20000, "1.1.1.1".to_string())
    }

    fn link_to(id: &str, weight: u32) -> Link {
        let origin = local_descriptor();
        let target = NodeDescriptor::remote("127.0.0.1".to_string(), 20001, id.to_string(), weight);
        Link::new(origin, target)
    }

    #[tokio::test]
    async fn test_find_free_slot_prefers_lowest_index() {
        let ports = PortsTable::new();
        assert_eq!(ports.find_free_slot("2.2.2.2").await, SlotLookup::Free(0));

        ports.attach(0, link_to("2.2.2.2", 3)).await.unwrap();
        assert_eq!(ports.find_free_slot("3.3.3.3").await, SlotLookup::Free(1));
    }

    #[tokio::test]
    async fn test_duplicate_attachment_detected() {
        let ports = PortsTable::new();
        ports.attach(0, link_to("2.2.2.2", 3)).await.unwrap();
        assert_eq!(ports.find_free_slot("2.2.2.2").await, SlotLookup::Duplicate);
        assert_eq!(ports.find_attached_slot("2.2.2.2").await, Some(0));
        assert_eq!(ports.find_attached_slot("9.9.9.9").await, None);
    }

    #[tokio::test]
    async fn test_table_exhaustion() {
        let ports = PortsTable::new();
        for (index, id) in ["2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5"]
            .iter()
            .enumerate()
        {
            ports.attach(index, link_to(id, 1)).await.unwrap();
        }
        assert_eq!(ports.find_free_slot("6.6.6.6").await, SlotLookup::Exhausted);

        // Detaching restores a free slot at the same index.
        ports.detach(2).await.unwrap();
        assert_eq!(ports.find_free_slot("6.6.6.6").await, SlotLookup::Free(2));
    }

    #[tokio::test]
    async fn test_detach_empty_slot_fails() {
        let ports = PortsTable::new();
        assert_eq!(ports.detach(1).await, Err(PortsError::SlotEmpty(1)));
        assert_eq!(ports.detach(7).await, Err(PortsError::BadIndex(7)));
    }

    #[tokio::test]
    async fn test_status_applies_to_both_endpoints() {
        let ports = PortsTable::new();
        ports.attach(0, link_to("2.2.2.2", 3)).await.unwrap();
        ports
            .set_link_status(0, NeighborStatus::TwoWay)
            .await
            .unwrap();

        let link = ports.link_at(0).await.unwrap().unwrap();
        assert_eq!(link.origin.status, NeighborStatus::TwoWay);
        assert_eq!(link.target.status, NeighborStatus::TwoWay);
    }

    #[test]
    fn test_attachment_validation() {
        let local = local_descriptor();

        assert!(verify_attachment_args(&local, "127.0.0.1", 20001, "2.2.2.2", 5).is_ok());

        assert_eq!(
            verify_attachment_args(&local, "", 20001, "2.2.2.2", 5),
            Err(PortsError::EmptyProcessAddress)
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 20001, "", 5),
            Err(PortsError::EmptyNodeId)
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 19999, "2.2.2.2", 5),
            Err(PortsError::PortOutOfRange(19999))
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 40000, "2.2.2.2", 5),
            Err(PortsError::PortOutOfRange(40000))
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 20001, "2.2.2.2", 0),
            Err(PortsError::InvalidWeight(0))
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 20001, "1.1.1.1", 5),
            Err(PortsError::SelfAttachment("1.1.1.1".to_string()))
        );
        assert_eq!(
            verify_attachment_args(&local, "127.0.0.1", 20000, "2.2.2.2", 5),
            Err(PortsError::OwnProcessPort(20000))
        );
    }
}
