// SPDX-License-Identifier: EUPL-1.2-or-later
// Copyright © 2026-present SOSPF Contributors

//! Link-State Database (LSD)
//!
//! The LSD maps each known node id to the latest advertisement observed for
//! that origin, and answers shortest-path queries over the weighted graph
//! the advertisements induce. It always holds a self-entry for the local
//! node, derived from the current ports table.
//!
//! Every operation, including the compound "read self-LSA, bump sequence,
//! write" steps, is serialized under a single lock so that concurrent
//! request handlers and originators never interleave partial updates.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::NodeId;
use crate::lsa::{LinkDescription, LinkStateAdvertisement};

/// Per-node store of the latest LSA observed per origin
///
/// Cheaply cloneable; all clones share the same entries.
#[derive(Debug, Clone)]
pub struct LinkStateDatabase {
    entries: Arc<RwLock<HashMap<NodeId, LinkStateAdvertisement>>>,
    local_id: NodeId,
}

impl LinkStateDatabase {
    /// Creates a database seeded with the never-advertised self-entry for
    /// the given local node.
    pub fn new(local_id: NodeId) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            local_id.clone(),
            LinkStateAdvertisement::initial(local_id.clone()),
        );
        Self {
            entries: Arc::new(RwLock::new(entries)),
            local_id,
        }
    }

    /// Node id of the local node owning this database.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Returns the latest stored LSA for the given origin.
    pub async fn get(&self, origin_id: &str) -> Option<LinkStateAdvertisement> {
        let entries = self.entries.read().await;
        entries.get(origin_id).cloned()
    }

    /// Unconditionally stores an LSA for the given origin, replacing any
    /// previous entry wholesale.
    pub async fn put(&self, origin_id: NodeId, lsa: LinkStateAdvertisement) {
        let mut entries = self.entries.write().await;
        entries.insert(origin_id, lsa);
    }

    /// Stores the advertisement iff it supersedes the current entry for its
    /// origin, returning whether the database changed.
    pub async fn apply(&self, lsa: &LinkStateAdvertisement) -> bool {
        let mut entries = self.entries.write().await;
        if lsa.supersedes(entries.get(&lsa.origin_id)) {
            entries.insert(lsa.origin_id.clone(), lsa.clone());
            true
        } else {
            false
        }
    }

    /// Snapshot of every stored advertisement, ordered by origin id so
    /// LSAUPDATE payloads are deterministic for a given database state.
    pub async fn snapshot(&self) -> Vec<LinkStateAdvertisement> {
        let entries = self.entries.read().await;
        let mut values: Vec<LinkStateAdvertisement> = entries.values().cloned().collect();
        values.sort_by(|a, b| a.origin_id.cmp(&b.origin_id));
        values
    }

    /// Rewrites the self-entry from the given link set, bumping the
    /// sequence number past the previous advertisement.
    pub async fn refresh_self(&self, links: Vec<LinkDescription>) -> LinkStateAdvertisement {
        let mut entries = self.entries.write().await;
        let seq_number = entries
            .get(&self.local_id)
            .map(LinkStateAdvertisement::next_seq_number)
            .unwrap_or(crate::lsa::MIN_SEQ_NUMBER);
        let lsa = LinkStateAdvertisement {
            origin_id: self.local_id.clone(),
            seq_number,
            has_shutdown: false,
            links,
        };
        entries.insert(self.local_id.clone(), lsa.clone());
        lsa
    }

    /// Flags the stored entry for the given origin as shut down, bumping
    /// its sequence number. Used for the local node on `quit` and for dead
    /// neighbors detected by the heartbeat prober.
    pub async fn mark_shutdown(&self, origin_id: &str) -> Option<LinkStateAdvertisement> {
        let mut entries = self.entries.write().await;
        let lsa = entries.get_mut(origin_id)?;
        lsa.seq_number = lsa.next_seq_number();
        lsa.has_shutdown = true;
        Some(lsa.clone())
    }

    /// Computes the shortest path from the local node to the destination by
    /// Dijkstra's algorithm over the stored advertisements.
    ///
    /// Shut-down origins contribute no edges and are excluded as endpoints.
    /// Ties between equal-cost paths break on node id, so the result is
    /// deterministic for a given database state. Returns the rendered path
    /// `a ->(w1) b ->(w2) c`, or `None` when the destination is unknown or
    /// unreachable.
    pub async fn shortest_path(&self, destination: &str) -> Option<String> {
        let entries = self.entries.read().await;

        if destination == self.local_id {
            return Some(self.local_id.clone());
        }
        entries.get(destination)?;

        // Adjacency over live advertisements only.
        let mut adjacency: HashMap<&str, Vec<(&str, u32)>> = HashMap::new();
        for (origin_id, lsa) in entries.iter() {
            if lsa.has_shutdown {
                continue;
            }
            for link in &lsa.links {
                let endpoint_live = entries
                    .get(&link.neighbor_id)
                    .is_some_and(|endpoint| !endpoint.has_shutdown);
                if endpoint_live {
                    adjacency
                        .entry(origin_id.as_str())
                        .or_default()
                        .push((link.neighbor_id.as_str(), link.weight));
                }
            }
        }

        let mut distances: HashMap<NodeId, u32> = HashMap::new();
        let mut previous: HashMap<NodeId, (NodeId, u32)> = HashMap::new();
        let mut heap = BinaryHeap::new();

        distances.insert(self.local_id.clone(), 0);
        heap.push(PathState {
            cost: 0,
            node: self.local_id.clone(),
        });

        while let Some(PathState { cost, node }) = heap.pop() {
            // Skip entries obsoleted by a better path found meanwhile.
            if cost > *distances.get(&node).unwrap_or(&u32::MAX) {
                continue;
            }
            let Some(neighbors) = adjacency.get(node.as_str()) else {
                continue;
            };
            for &(neighbor, weight) in neighbors {
                let next_cost = cost.saturating_add(weight);
                if next_cost < *distances.get(neighbor).unwrap_or(&u32::MAX) {
                    distances.insert(neighbor.to_string(), next_cost);
                    previous.insert(neighbor.to_string(), (node.clone(), weight));
                    heap.push(PathState {
                        cost: next_cost,
                        node: neighbor.to_string(),
                    });
                }
            }
        }

        previous.get(destination)?;

        // Walk back from the destination collecting each hop's weight.
        let mut hops: Vec<(NodeId, u32)> = Vec::new();
        let mut current = destination.to_string();
        while current != self.local_id {
            let (prior, weight) = previous.get(&current)?.clone();
            hops.push((current, weight));
            current = prior;
        }
        hops.reverse();

        let mut rendered = self.local_id.clone();
        for (node, weight) in hops {
            rendered.push_str(&format!(" ->({}) {}", weight, node));
        }
        Some(rendered)
    }
}

/// Frontier entry of the Dijkstra traversal
#[derive(Debug, Clone, PartialEq, Eq)]
struct PathState {
    cost: u32,
    node: NodeId,
}

impl Ord for PathState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap; node id breaks cost ties.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for PathState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::NO_PREVIOUS_ADVERTISEMENTS;

    fn advertisement(
        origin: &str,
        seq: i64,
        links: Vec<(&str, usize, u32)>,
    ) -> LinkStateAdvertisement {
        LinkStateAdvertisement {
            origin_id: origin.to_string(),
            seq_number: seq,
            has_shutdown: false,
            links: links
                .into_iter()
                .map(|(neighbor, port_index, weight)| LinkDescription {
                    neighbor_id: neighbor.to_string(),
                    port_index,
                    weight,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_seeded_with_self_entry() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());
        let own = lsd.get("1.1.1.1").await.unwrap();
        assert_eq!(own.seq_number, NO_PREVIOUS_ADVERTISEMENTS);
        assert!(own.links.is_empty());
    }

    #[tokio::test]
    async fn test_apply_respects_freshness() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());

        let first = advertisement("2.2.2.2", 0, vec![("1.1.1.1", 0, 7)]);
        assert!(lsd.apply(&first).await);
        // Re-applying the identical advertisement is a no-op.
        assert!(!lsd.apply(&first).await);

        let stale = advertisement("2.2.2.2", -1, vec![]);
        assert!(!lsd.apply(&stale).await);
        assert_eq!(lsd.get("2.2.2.2").await.unwrap(), first);

        let fresher = advertisement("2.2.2.2", 1, vec![]);
        assert!(lsd.apply(&fresher).await);
        assert_eq!(lsd.get("2.2.2.2").await.unwrap().seq_number, 1);
    }

    #[tokio::test]
    async fn test_refresh_self_increments_sequence() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());

        let first = lsd.refresh_self(vec![]).await;
        assert_eq!(first.seq_number, 0);

        let second = lsd
            .refresh_self(vec![LinkDescription {
                neighbor_id: "2.2.2.2".to_string(),
                port_index: 0,
                weight: 7,
            }])
            .await;
        assert_eq!(second.seq_number, 1);
        assert_eq!(second.links.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_shutdown_bumps_sequence() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());
        lsd.refresh_self(vec![]).await;

        let tombstone = lsd.mark_shutdown("1.1.1.1").await.unwrap();
        assert!(tombstone.has_shutdown);
        assert_eq!(tombstone.seq_number, 1);

        assert!(lsd.mark_shutdown("9.9.9.9").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered() {
        let lsd = LinkStateDatabase::new("3.3.3.3".to_string());
        lsd.apply(&advertisement("2.2.2.2", 0, vec![])).await;
        lsd.apply(&advertisement("1.1.1.1", 0, vec![])).await;

        let ids: Vec<String> = lsd
            .snapshot()
            .await
            .into_iter()
            .map(|lsa| lsa.origin_id)
            .collect();
        assert_eq!(ids, vec!["1.1.1.1", "2.2.2.2", "3.3.3.3"]);
    }

    #[tokio::test]
    async fn test_shortest_path_direct_link() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());
        lsd.refresh_self(vec![LinkDescription {
            neighbor_id: "2.2.2.2".to_string(),
            port_index: 0,
            weight: 7,
        }])
        .await;
        lsd.apply(&advertisement("2.2.2.2", 0, vec![("1.1.1.1", 0, 7)]))
            .await;

        assert_eq!(
            lsd.shortest_path("2.2.2.2").await,
            Some("1.1.1.1 ->(7) 2.2.2.2".to_string())
        );
    }

    #[tokio::test]
    async fn test_shortest_path_prefers_cheaper_detour() {
        let lsd = LinkStateDatabase::new("A".to_string());
        lsd.refresh_self(vec![
            LinkDescription {
                neighbor_id: "B".to_string(),
                port_index: 0,
                weight: 3,
            },
            LinkDescription {
                neighbor_id: "C".to_string(),
                port_index: 1,
                weight: 10,
            },
        ])
        .await;
        lsd.apply(&advertisement("B", 0, vec![("A", 0, 3), ("C", 1, 1)]))
            .await;
        lsd.apply(&advertisement("C", 0, vec![("A", 0, 10), ("B", 1, 1)]))
            .await;

        assert_eq!(
            lsd.shortest_path("C").await,
            Some("A ->(3) B ->(1) C".to_string())
        );
    }

    #[tokio::test]
    async fn test_shortest_path_to_self_is_trivial() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());
        assert_eq!(
            lsd.shortest_path("1.1.1.1").await,
            Some("1.1.1.1".to_string())
        );
    }

    #[tokio::test]
    async fn test_shortest_path_unknown_or_unreachable() {
        let lsd = LinkStateDatabase::new("1.1.1.1".to_string());
        assert_eq!(lsd.shortest_path("9.9.9.9").await, None);

        // Known origin with no edge leading to it.
        lsd.apply(&advertisement("2.2.2.2", 0, vec![])).await;
        assert_eq!(lsd.shortest_path("2.2.2.2").await, None);
    }

    #[tokio::test]
    async fn test_shutdown_origins_excluded_from_paths() {
        let lsd = LinkStateDatabase::new("A".to_string());
        lsd.refresh_self(vec![
            LinkDescription {
                neighbor_id: "B".to_string(),
                port_index: 0,
                weight: 3,
            },
            LinkDescription {
                neighbor_id: "C".to_string(),
                port_index: 1,
                weight: 10,
            },
        ])
        .await;
        lsd.apply(&advertisement("B", 0, vec![("A", 0, 3), ("C", 1, 1)]))
            .await;
        lsd.apply(&advertisement("C", 0, vec![("A", 0, 10), ("B", 1, 1)]))
            .await;

        // B disappears; the expensive direct edge is all that remains.
        lsd.mark_shutdown("B").await.unwrap();
        assert_eq!(lsd.shortest_path("C").await, Some("A ->(10) C".to_string()));
        assert_eq!(lsd.shortest_path("B").await, None);
    }
}
