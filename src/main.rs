// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

use clap::Parser;
use std::sync::Arc;

use sospf::config::{CliArgs, NodeConfiguration};
use sospf::node::Node;
use sospf::{heartbeat, repl, server};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let configuration = match NodeConfiguration::from_cli(args) {
        Ok(configuration) => configuration,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    // Failing to claim any port in the permitted range is the one fatal
    // startup condition.
    let (listener, process_port) = match server::bind_listener(&configuration.host).await {
        Ok(bound) => bound,
        Err(error) => {
            eprintln!("Error: {}", error);
            std::process::exit(1);
        }
    };

    let node = Arc::new(Node::new(
        configuration.node_id.clone(),
        configuration.host.clone(),
        process_port,
    ));

    println!("Successfully started node instance at:");
    println!("Simulated id = {}", node.id());
    println!("Process host = {}", configuration.host);
    println!("Process port = {}", process_port);
    println!();

    tokio::spawn(server::run(Arc::clone(&node), listener));
    if configuration.heartbeat {
        heartbeat::spawn(Arc::clone(&node));
    }

    repl::run(node).await;
}
