// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Wire envelope shared by every protocol interaction
//!
//! A single [`SospfPacket`] shape carries all six packet kinds over any
//! connection. Fields irrelevant to a given kind stay unset, and
//! [`SospfPacket::validate`] rejects envelopes whose optional fields are
//! inconsistent with their kind. Envelopes travel as bincode frames with a
//! big-endian `u32` length prefix, so a stream can carry several envelopes
//! back to back.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::NodeId;
use crate::error::WireError;
use crate::lsa::LinkStateAdvertisement;
use crate::ports::NodeDescriptor;

/// Largest frame the node will accept off a connection.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Discriminant of a protocol interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketKind {
    /// Peering handshake message
    Hello,
    /// Link-state database payload
    LsaUpdate,
    /// Handshake carrying an authoritative link weight
    Connect,
    /// Teardown of an established link
    Disconnect,
    /// Liveness probe and its echo
    Heartbeat,
    /// Rejection reply from a node whose ports table is full
    NoPortsAvailable,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Hello => write!(f, "HELLO"),
            PacketKind::LsaUpdate => write!(f, "LSAUPDATE"),
            PacketKind::Connect => write!(f, "CONNECT"),
            PacketKind::Disconnect => write!(f, "DISCONNECT"),
            PacketKind::Heartbeat => write!(f, "HEARTBEAT"),
            PacketKind::NoPortsAvailable => write!(f, "NO_PORTS_AVAILABLE"),
        }
    }
}

/// The one message envelope used for all protocol kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SospfPacket {
    /// Process address at which the sender's server listens
    pub src_process_ip: String,
    /// Process port at which the sender's server listens
    pub src_process_port: u16,
    /// Simulated identity of the sender
    pub src_id: NodeId,
    /// Simulated identity of the intended receiver
    pub dst_id: NodeId,
    /// Discriminant selecting the interaction
    pub kind: PacketKind,
    /// Database payload; present only for `LsaUpdate`
    pub lsa_array: Option<Vec<LinkStateAdvertisement>>,
    /// Announced link weight; present only for `Hello` and `Connect`
    pub weight: Option<u32>,
}

impl SospfPacket {
    fn from_local(
        local: &NodeDescriptor,
        dst_id: &str,
        kind: PacketKind,
        lsa_array: Option<Vec<LinkStateAdvertisement>>,
        weight: Option<u32>,
    ) -> Self {
        Self {
            src_process_ip: local.process_ip.clone(),
            src_process_port: local.process_port,
            src_id: local.node_id.clone(),
            dst_id: dst_id.to_string(),
            kind,
            lsa_array,
            weight,
        }
    }

    /// Creates a handshake packet of the given conversation kind
    /// (`Hello` or `Connect`) announcing a link weight.
    pub fn handshake(
        kind: PacketKind,
        local: &NodeDescriptor,
        dst_id: &str,
        weight: u32,
    ) -> Self {
        debug_assert!(matches!(kind, PacketKind::Hello | PacketKind::Connect));
        Self::from_local(local, dst_id, kind, None, Some(weight))
    }

    /// Creates an LSAUPDATE packet carrying a database snapshot.
    pub fn lsa_update(
        local: &NodeDescriptor,
        dst_id: &str,
        lsa_array: Vec<LinkStateAdvertisement>,
    ) -> Self {
        Self::from_local(local, dst_id, PacketKind::LsaUpdate, Some(lsa_array), None)
    }

    /// Creates a DISCONNECT packet (request and acknowledgment share it).
    pub fn disconnect(local: &NodeDescriptor, dst_id: &str) -> Self {
        Self::from_local(local, dst_id, PacketKind::Disconnect, None, None)
    }

    /// Creates a HEARTBEAT packet (probe and echo share it).
    pub fn heartbeat(local: &NodeDescriptor, dst_id: &str) -> Self {
        Self::from_local(local, dst_id, PacketKind::Heartbeat, None, None)
    }

    /// Creates the rejection reply of a node whose ports table is full.
    pub fn no_ports_available(local: &NodeDescriptor, dst_id: &str) -> Self {
        Self::from_local(local, dst_id, PacketKind::NoPortsAvailable, None, None)
    }

    /// Rejects envelopes carrying fields inconsistent with their kind.
    pub fn validate(&self) -> Result<(), WireError> {
        match self.kind {
            PacketKind::LsaUpdate => {
                if self.lsa_array.is_none() {
                    return Err(WireError::MalformedEnvelope(
                        "LSAUPDATE without an LSA payload".to_string(),
                    ));
                }
                if self.weight.is_some() {
                    return Err(WireError::MalformedEnvelope(
                        "LSAUPDATE carrying a transmission weight".to_string(),
                    ));
                }
            }
            PacketKind::Hello | PacketKind::Connect => {
                if self.weight.is_none() {
                    return Err(WireError::MalformedEnvelope(format!(
                        "{} without a transmission weight",
                        self.kind
                    )));
                }
                if self.lsa_array.is_some() {
                    return Err(WireError::MalformedEnvelope(format!(
                        "{} carrying an LSA payload",
                        self.kind
                    )));
                }
            }
            PacketKind::Disconnect | PacketKind::Heartbeat | PacketKind::NoPortsAvailable => {
                if self.lsa_array.is_some() || self.weight.is_some() {
                    return Err(WireError::MalformedEnvelope(format!(
                        "{} carrying handshake-only fields",
                        self.kind
                    )));
                }
            }
        }
        if self.src_id.is_empty() {
            return Err(WireError::MalformedEnvelope(
                "envelope without a source node id".to_string(),
            ));
        }
        Ok(())
    }

    /// Writes this envelope as one length-prefixed frame.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin,
    {
        self.validate()?;
        let body = bincode::serialize(self)?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(WireError::FrameTooLarge(body.len()));
        }
        writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
        writer.write_all(&body).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads one length-prefixed frame and deserializes the envelope.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, WireError>
    where
        R: AsyncRead + Unpin,
    {
        let mut prefix = [0u8; 4];
        reader.read_exact(&mut prefix).await?;
        let frame_len = u32::from_be_bytes(prefix) as usize;
        if frame_len > MAX_FRAME_BYTES {
            return Err(WireError::FrameTooLarge(frame_len));
        }
        let mut body = vec![0u8; frame_len];
        reader.read_exact(&mut body).await?;
        let packet: SospfPacket = bincode::deserialize(&body)?;
        packet.validate()?;
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::LinkDescription;

    fn local() -> NodeDescriptor {
        NodeDescriptor::local("127.0.0.1".to_string(), 20000, "1.1.1.1".to_string())
    }

    #[test]
    fn test_handshake_packet_shape() {
        let hello = SospfPacket::handshake(PacketKind::Hello, &local(), "2.2.2.2", 7);
        assert_eq!(hello.kind, PacketKind::Hello);
        assert_eq!(hello.weight, Some(7));
        assert!(hello.lsa_array.is_none());
        assert!(hello.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_inconsistent_fields() {
        let mut hello = SospfPacket::handshake(PacketKind::Hello, &local(), "2.2.2.2", 7);
        hello.weight = None;
        assert!(hello.validate().is_err());

        let mut update = SospfPacket::lsa_update(&local(), "2.2.2.2", Vec::new());
        update.weight = Some(3);
        assert!(update.validate().is_err());
        update.weight = None;
        update.lsa_array = None;
        assert!(update.validate().is_err());

        let mut probe = SospfPacket::heartbeat(&local(), "2.2.2.2");
        assert!(probe.validate().is_ok());
        probe.lsa_array = Some(Vec::new());
        assert!(probe.validate().is_err());
    }

    #[tokio::test]
    async fn test_frame_roundtrip() {
        let lsa = LinkStateAdvertisement {
            origin_id: "1.1.1.1".to_string(),
            seq_number: 4,
            has_shutdown: false,
            links: vec![LinkDescription {
                neighbor_id: "2.2.2.2".to_string(),
                port_index: 0,
                weight: 7,
            }],
        };
        let sent = SospfPacket::lsa_update(&local(), "2.2.2.2", vec![lsa]);

        let (mut client, mut server) = tokio::io::duplex(4096);
        sent.write_to(&mut client).await.unwrap();
        let received = SospfPacket::read_from(&mut server).await.unwrap();
        assert_eq!(received, sent);
    }

    #[tokio::test]
    async fn test_consecutive_frames_on_one_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let first = SospfPacket::handshake(PacketKind::Connect, &local(), "2.2.2.2", 1);
        let second = SospfPacket::disconnect(&local(), "2.2.2.2");
        first.write_to(&mut client).await.unwrap();
        second.write_to(&mut client).await.unwrap();

        assert_eq!(SospfPacket::read_from(&mut server).await.unwrap(), first);
        assert_eq!(SospfPacket::read_from(&mut server).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let handle = tokio::spawn(async move {
            let prefix = ((MAX_FRAME_BYTES + 1) as u32).to_be_bytes();
            let _ = tokio::io::AsyncWriteExt::write_all(&mut client, &prefix).await;
        });
        let result = SospfPacket::read_from(&mut server).await;
        assert!(matches!(result, Err(WireError::FrameTooLarge(_))));
        handle.await.unwrap();
    }
}
