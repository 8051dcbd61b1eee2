// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Configuration management for node instances
//!
//! Supports both command-line arguments and TOML configuration files. The
//! only required value is the node's simulated id; the process endpoint is
//! derived at startup by scanning the permitted port range.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Default host on which the node binds and advertises its server.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Command-line arguments for a node process
#[derive(Parser, Debug)]
#[command(name = "sospf-node")]
#[command(version = "0.1.0")]
#[command(about = "Simulated link-state routing node", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file (overrides other arguments)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Simulated node id (e.g. "1.1.1.1")
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Host on which to bind the listening socket
    #[arg(long, value_name = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Enable the heartbeat liveness prober
    #[arg(long)]
    pub heartbeat: bool,
}

/// TOML configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub node: NodeSection,
}

/// Node section of the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Simulated node id
    pub id: String,
    /// Host on which to bind the listening socket
    #[serde(default = "default_host")]
    pub host: String,
    /// Enable the heartbeat liveness prober
    #[serde(default)]
    pub heartbeat: bool,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Unified configuration after parsing CLI or file
#[derive(Debug, Clone)]
pub struct NodeConfiguration {
    pub node_id: String,
    pub host: String,
    pub heartbeat: bool,
}

impl NodeConfiguration {
    /// Creates configuration from command-line arguments.
    pub fn from_cli(args: CliArgs) -> Result<Self, ConfigError> {
        if let Some(config_path) = args.config {
            return Self::from_file(&config_path);
        }

        let node_id = args.id.ok_or(ConfigError::MissingNodeId)?;
        let configuration = Self {
            node_id,
            host: args.host,
            heartbeat: args.heartbeat,
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(ConfigError::ReadFailed)?;
        let config: TomlConfig = toml::from_str(&contents)?;

        let configuration = Self {
            node_id: config.node.id,
            host: config.node.host,
            heartbeat: config.node.heartbeat,
        };
        configuration.validate()?;
        Ok(configuration)
    }

    /// Validates the parsed configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        Ok(())
    }
}
