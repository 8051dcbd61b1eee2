// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Interactive terminal of a node
//!
//! One command per line at a `>> ` prompt. Unknown commands and bad
//! arguments print an error and return to the prompt; failures inside a
//! command are caught and logged, so the terminal never crashes.

use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::node::Node;

enum Outcome {
    Continue,
    Quit,
}

/// Runs the terminal until `quit` or end of input.
pub async fn run(node: Arc<Node>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!(">> ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // End of input: leave the terminal without tearing links down.
            Ok(None) => break,
            Err(error) => {
                eprintln!("Error: node terminal failed to read input: {}", error);
                break;
            }
        };

        match dispatch(&node, line.trim()).await {
            Outcome::Continue => {}
            Outcome::Quit => break,
        }
    }
}

async fn dispatch(node: &Node, line: &str) -> Outcome {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some(&command) = tokens.first() else {
        return Outcome::Continue;
    };

    match command {
        "attach" => {
            let Some((ip, port, id, weight)) = parse_link_args(&tokens) else {
                println!("Usage: attach <processIp> <processPort> <nodeId> <weight>");
                return Outcome::Continue;
            };
            if let Err(error) = node.attach(ip, port, id, weight).await {
                println!("Error: failed to attach: {}", error);
            }
        }
        "start" => {
            node.start().await;
        }
        "connect" => {
            let Some((ip, port, id, weight)) = parse_link_args(&tokens) else {
                println!("Usage: connect <processIp> <processPort> <nodeId> <weight>");
                return Outcome::Continue;
            };
            if let Err(error) = node.connect(ip, port, id, weight).await {
                println!("Error: failed to connect: {}", error);
            }
        }
        "disconnect" => {
            let Some(index) = tokens.get(1).and_then(|raw| raw.parse::<usize>().ok()) else {
                println!("Usage: disconnect <portIndex>");
                return Outcome::Continue;
            };
            if let Err(error) = node.disconnect(index, false).await {
                println!("Error: failed to disconnect: {}", error);
            }
        }
        "neighbors" => {
            node.print_neighbors().await;
        }
        "detect" => {
            let Some(destination) = tokens.get(1) else {
                println!("Usage: detect <nodeId>");
                return Outcome::Continue;
            };
            match node.detect(destination).await {
                Some(path) => println!("{}", path),
                None => println!("No shortest path to destination found."),
            }
        }
        "quit" => {
            node.quit().await;
            println!("Successfully quit node at id {}.", node.id());
            return Outcome::Quit;
        }
        _ => {
            println!("Command '{}' was not recognized.", line);
            println!("Please enter a valid command.");
        }
    }
    Outcome::Continue
}

/// Parses the shared `<processIp> <processPort> <nodeId> <weight>` argument
/// shape of `attach` and `connect`.
fn parse_link_args<'a>(tokens: &[&'a str]) -> Option<(&'a str, u16, &'a str, u32)> {
    if tokens.len() != 5 {
        return None;
    }
    let port = tokens[2].parse::<u16>().ok()?;
    let weight = tokens[4].parse::<u32>().ok()?;
    Some((tokens[1], port, tokens[3], weight))
}
