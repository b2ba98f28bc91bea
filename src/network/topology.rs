use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::algorithms::{self, RouteMismatch, dijkstra::ShortestPath};
use crate::config::TopologyConfig;
use crate::error::{Error, Result};
use crate::protocol::{Envelope, Message, RoutingTable};
use crate::router::Router;
use crate::types::Cost;
use crate::RouterId;
use super::{Edge, EdgeKey};

/// Message counters since the topology was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    /// Messages handed to an existing router.
    pub delivered: u64,
    /// Messages addressed to a router that no longer exists.
    pub dropped: u64,
    /// Delivered messages that were vector requests.
    pub requests: u64,
    /// Vectors overwritten by a newer one on the same link before delivery.
    pub coalesced: u64,
}

/// Owner of every router and of the undirected edge set.
///
/// Every mutation runs the resulting exchange of distance vectors to
/// quiescence before it returns. Routers hand back the messages they want
/// sent; the topology queues them and delivers them in FIFO order until the
/// queue is empty. A link carries at most one queued vector: a newer vector
/// from the same sender overwrites the queued one in place, so stale
/// intermediate tables are never delivered.
#[derive(Debug)]
pub struct Topology {
    config: TopologyConfig,
    nodes: HashMap<RouterId, Router>,
    edges: BTreeMap<EdgeKey, u64>,
    pending: VecDeque<Envelope>,
    stats: DeliveryStats,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    pub fn new() -> Self {
        Self::with_config(TopologyConfig::default())
    }

    pub fn with_config(config: TopologyConfig) -> Self {
        Self {
            config,
            nodes: HashMap::new(),
            edges: BTreeMap::new(),
            pending: VecDeque::new(),
            stats: DeliveryStats::default(),
        }
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Registers a router that only knows its self-route.
    ///
    /// A duplicate identifier is rejected so a converged table is never discarded.
    pub fn add_node(&mut self, id: impl Into<RouterId>) -> Result<()> {
        let id = id.into();
        if self.nodes.contains_key(&id) {
            warn!("Rejecting duplicate node {}", id);
            return Err(Error::DuplicateNode(id));
        }

        info!("Adding node {}", id);
        let router = Router::new(id.clone(), self.config.infinity);
        self.nodes.insert(id, router);
        Ok(())
    }

    /// Creates the link `a`-`b` or changes its weight.
    ///
    /// Both endpoints learn the new cost first, then both broadcast their
    /// vectors, then the weight is recorded.
    pub fn add_edge(&mut self, a: &str, b: &str, weight: u64) -> Result<()> {
        self.ensure_node(a)?;
        self.ensure_node(b)?;
        if a == b {
            warn!("Rejecting self loop on {}", a);
            return Err(Error::SelfLoop(a.to_string()));
        }
        if weight >= self.config.infinity {
            warn!("Rejecting weight {} on {}-{}", weight, a, b);
            return Err(Error::InvalidWeight { weight, limit: self.config.infinity });
        }

        let key = EdgeKey::new(a, b);
        match self.edges.get(&key) {
            Some(old) => info!("Updating edge {} from {} to {}", key, old, weight),
            None => info!("Adding edge {} with weight {}", key, weight),
        }

        for (node, peer) in [(a, b), (b, a)] {
            self.update_link(node, peer, Cost::Finite(weight));
        }
        for node in [a, b] {
            if let Some(outbound) = self.nodes.get(node).map(Router::broadcast) {
                self.enqueue(outbound);
            }
        }
        self.edges.insert(key, weight);

        self.settle()?;
        Ok(())
    }

    /// Removes the link `a`-`b` if it exists. A missing edge is a no-op.
    pub fn remove_edge(&mut self, a: &str, b: &str) -> Result<()> {
        self.ensure_node(a)?;
        self.ensure_node(b)?;

        let key = EdgeKey::new(a, b);
        if self.detach(&key) {
            self.settle()?;
        } else {
            debug!("No edge {} to remove", key);
        }
        Ok(())
    }

    /// Removes a router and every edge incident to it.
    ///
    /// The other endpoint of each edge is told the link is gone. Messages
    /// still in flight toward the removed router are dropped.
    pub fn remove_node(&mut self, id: &str) -> Result<()> {
        self.ensure_node(id)?;

        info!("Removing node {}", id);
        self.nodes.remove(id);

        let incident: Vec<EdgeKey> = self.edges.keys().filter(|key| key.touches(id)).cloned().collect();
        for key in incident {
            self.edges.remove(&key);
            if let Some(peer) = key.other(id) {
                debug!("Removing edge {} with {}", key, id);
                self.update_link(peer, id, Cost::Infinite);
            }
            self.settle()?;
        }
        Ok(())
    }

    /// Delivers one message and runs whatever it triggers to quiescence.
    ///
    /// Returns the number of messages processed, including this one. A
    /// recipient that does not exist is a silent drop.
    pub fn deliver(&mut self, envelope: Envelope) -> Result<usize> {
        self.enqueue(vec![envelope]);
        self.settle()
    }

    /// Snapshot of every routing table, keyed by router.
    pub fn tables(&self) -> BTreeMap<RouterId, RoutingTable> {
        self.nodes
            .iter()
            .map(|(id, router)| (id.clone(), router.snapshot()))
            .collect()
    }

    pub fn router(&self, id: &str) -> Option<&Router> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<RouterId> {
        let mut ids: Vec<RouterId> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_weight(&self, a: &str, b: &str) -> Option<u64> {
        self.edges.get(&EdgeKey::new(a, b)).copied()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.edges
            .iter()
            .map(|(key, weight)| {
                let (a, b) = key.endpoints();
                Edge { a: a.to_string(), b: b.to_string(), weight: *weight }
            })
            .collect()
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }

    /// Dijkstra over the current edge set, independent of the routers' state.
    pub fn shortest_paths(&self, source: &str) -> HashMap<RouterId, ShortestPath> {
        algorithms::dijkstra::shortest_paths(&self.edges, source)
    }

    /// Every route whose cost differs from the true shortest-path distance.
    pub fn mismatches(&self) -> Vec<RouteMismatch> {
        algorithms::compare(&self.tables(), &self.edges, self.config.infinity)
    }

    fn ensure_node(&self, id: &str) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            warn!("Unknown node {}", id);
            Err(Error::UnknownNode(id.to_string()))
        }
    }

    /// Deletes the edge and tells the endpoints that are still present.
    fn detach(&mut self, key: &EdgeKey) -> bool {
        if self.edges.remove(key).is_none() {
            return false;
        }

        info!("Removing edge {}", key);
        let (a, b) = key.endpoints();
        for (node, peer) in [(a, b), (b, a)] {
            self.update_link(node, peer, Cost::Infinite);
        }
        true
    }

    /// Tells `node`, if it still exists, about its link to `peer`.
    fn update_link(&mut self, node: &str, peer: &str, weight: Cost) {
        if let Some(router) = self.nodes.get_mut(node) {
            let outbound = router.neighbor_update(peer, weight);
            self.enqueue(outbound);
        }
    }

    fn enqueue(&mut self, outbound: Vec<Envelope>) {
        for envelope in outbound {
            if let Message::Vector(vector) = envelope.message {
                let queued = self.pending.iter_mut().find_map(|pending| match &mut pending.message {
                    Message::Vector(queued) if pending.from == envelope.from && pending.to == envelope.to => Some(queued),
                    _ => None,
                });
                match queued {
                    Some(queued) => {
                        *queued = vector;
                        self.stats.coalesced += 1;
                    }
                    None => self.pending.push_back(Envelope::vector(envelope.from, envelope.to, vector)),
                }
            } else {
                self.pending.push_back(envelope);
            }
        }
    }

    /// Delivers queued messages until none are left or the budget runs out.
    fn settle(&mut self) -> Result<usize> {
        let mut processed = 0;

        while let Some(envelope) = self.pending.pop_front() {
            processed += 1;
            if let Some(limit) = self.config.message_budget {
                if processed as u64 > limit {
                    warn!("Giving up after {} messages, {} still queued", limit, self.pending.len() + 1);
                    self.pending.clear();
                    return Err(Error::NotConverged { limit });
                }
            }

            let Some(router) = self.nodes.get_mut(&envelope.to) else {
                debug!("Dropping message from {} to removed node {}", envelope.from, envelope.to);
                self.stats.dropped += 1;
                continue;
            };

            let outbound = match &envelope.message {
                Message::Vector(vector) => router.receive(&envelope.from, vector),
                Message::Request => {
                    self.stats.requests += 1;
                    router.respond(&envelope.from)
                }
            };
            self.stats.delivered += 1;
            self.enqueue(outbound);
        }

        if processed > 0 {
            debug!("Converged after {} messages", processed);
        }
        Ok(processed)
    }
}
