// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Error types for the link-state node
//!
//! This module provides typed errors for all node components,
//! replacing string-based errors with structured error types.

use thiserror::Error;

use crate::{MAX_PROCESS_PORT, MIN_PROCESS_PORT};

/// Main error type for node operations
#[derive(Error, Debug)]
pub enum SospfError {
    #[error("Ports table error: {0}")]
    Ports(#[from] PortsError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the ports table and attachment validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortsError {
    #[error("Cannot attach to empty remote process address")]
    EmptyProcessAddress,

    #[error("Cannot attach to empty remote node id")]
    EmptyNodeId,

    #[error(
        "Remote process port {0} is out of range; all process ports in the \
         overlay must fall in {MIN_PROCESS_PORT} to {MAX_PROCESS_PORT}"
    )]
    PortOutOfRange(u16),

    #[error("Invalid link weight {0}; attached neighbors must have weight greater than 0")]
    InvalidWeight(u32),

    #[error("Cannot attach to own node id: {0}")]
    SelfAttachment(String),

    #[error("Cannot attach to own process port: {0}")]
    OwnProcessPort(u16),

    #[error("No free port available on current node at this time")]
    Exhausted,

    #[error("Already attached to remote node: {0}")]
    DuplicateNeighbor(String),

    #[error("Port index {0} is invalid")]
    BadIndex(usize),

    #[error("No link attached at port index {0}")]
    SlotEmpty(usize),
}

/// Errors raised while conversing with a peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unexpected packet kind {got} (expected {expected})")]
    UnexpectedPacket { expected: String, got: String },

    #[error("Remote node {0} has no ports available")]
    RemotePortsExhausted(String),

    #[error("Received request from unattached node: {0}")]
    UnknownNeighbor(String),
}

/// Serialization and framing errors on the wire
#[derive(Error, Debug)]
pub enum WireError {
    #[error("Packet serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Frame of {0} bytes exceeds the permitted envelope size")]
    FrameTooLarge(usize),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("I/O error on connection: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("A node id must be provided via --id or a configuration file")]
    MissingNodeId,

    #[error("Node id must not be empty")]
    EmptyNodeId,

    #[error("Failed to read configuration file: {0}")]
    ReadFailed(std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    ParseFailed(#[from] toml::de::Error),
}
