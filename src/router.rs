use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use crate::RouterId;
use crate::protocol::{DistanceVector, Envelope, RoutingEntry, RoutingTable};
use crate::types::Cost;

/// A single distance-vector router.
///
/// The router only knows the cost of its own links and what its neighbors
/// advertise. It never reaches into the topology: every operation returns the
/// messages it wants delivered and the owner of the router does the delivery.
#[derive(Debug, Clone)]
pub struct Router {
    id: RouterId,
    infinity: u64,
    links: BTreeMap<RouterId, u64>,
    /// Latest vector received from each neighbor.
    heard: BTreeMap<RouterId, DistanceVector>,
    routing_table: RoutingTable,
}

impl Router {
    pub fn new(id: impl Into<RouterId>, infinity: u64) -> Self {
        let id = id.into();
        let mut routing_table = RoutingTable::new();
        routing_table.add_route(id.clone(), RoutingEntry::new(Cost::ZERO, id.clone()));

        Self {
            id,
            infinity,
            links: BTreeMap::new(),
            heard: BTreeMap::new(),
            routing_table,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Measured cost of the direct link to `peer`, if there is one.
    pub fn link_cost(&self, peer: &str) -> Option<u64> {
        self.links.get(peer).copied()
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &RouterId> {
        self.links.keys()
    }

    pub fn route(&self, destination: &str) -> Option<&RoutingEntry> {
        self.routing_table.get_route(destination)
    }

    /// Read-only copy of the routing table.
    pub fn snapshot(&self) -> RoutingTable {
        self.routing_table.clone()
    }

    /// Applies a change to the link toward `peer`. `Cost::Infinite` means the link is gone.
    ///
    /// For a finite weight the direct route is overwritten with the measured
    /// cost. Routes already forwarded through `peer` move by the same delta as
    /// the link, so they do not advertise a stale cost until the next round of
    /// vectors arrives. For a severed link every route through `peer` is
    /// dropped and a triggered update goes out to the remaining neighbors.
    ///
    /// Whenever a route gets worse or disappears the router asks its other
    /// neighbors for their vectors; the alternative path, if any, is learned
    /// from those replies.
    pub fn neighbor_update(&mut self, peer: &str, weight: Cost) -> Vec<Envelope> {
        if peer == self.id {
            return Vec::new();
        }

        match weight.capped(self.infinity) {
            Cost::Finite(weight) => self.link_up(peer, weight),
            Cost::Infinite => self.link_down(peer),
        }
    }

    fn link_up(&mut self, peer: &str, weight: u64) -> Vec<Envelope> {
        let mut worsened = false;

        match self.links.insert(peer.to_string(), weight) {
            Some(old) if old != weight => {
                debug!("{}: link to {} changed from {} to {}", self.id, peer, old, weight);
                for destination in self.routing_table.routes_via(peer) {
                    let Some(entry) = self.routing_table.get_route_mut(&destination) else {
                        continue;
                    };
                    let adjusted = entry.cost.rebase(old, weight).capped(self.infinity);
                    worsened |= adjusted > entry.cost;
                    if adjusted.is_finite() {
                        entry.cost = adjusted;
                    } else {
                        self.routing_table.remove_route(&destination);
                    }
                }
            }
            Some(_) => {}
            None => info!("{}: new neighbor {} with weight {}", self.id, peer, weight),
        }

        let direct = RoutingEntry::new(Cost::Finite(weight), peer);
        if let Some(previous) = self.routing_table.add_route(peer, direct) {
            worsened |= previous.cost < Cost::Finite(weight);
        }

        if worsened {
            self.request_vectors(Some(peer))
        } else {
            Vec::new()
        }
    }

    fn link_down(&mut self, peer: &str) -> Vec<Envelope> {
        let had_link = self.links.remove(peer).is_some();
        self.heard.remove(peer);

        let mut lost = self.routing_table.routes_via(peer);
        if !lost.iter().any(|destination| destination == peer) && self.routing_table.contains(peer) {
            lost.push(peer.to_string());
        }
        for destination in &lost {
            self.routing_table.remove_route(destination);
        }

        if had_link {
            info!("{}: link to {} is down, {} routes invalidated", self.id, peer, lost.len());
        }
        if lost.is_empty() {
            return Vec::new();
        }

        let mut outbound = self.broadcast();
        outbound.extend(self.request_vectors(None));
        outbound
    }

    /// Merges a vector received from `from`.
    ///
    /// Vectors from routers that are not direct neighbors are ignored. The
    /// vector replaces whatever `from` advertised before, and every route is
    /// recomputed as the cheapest link cost plus advertised cost over all the
    /// vectors this router currently holds. A destination that `from` stops
    /// advertising is no longer reachable through it. Ties keep the existing
    /// next hop.
    pub fn receive(&mut self, from: &str, vector: &DistanceVector) -> Vec<Envelope> {
        if !self.links.contains_key(from) {
            debug!("{}: ignoring vector from non-neighbor {}", self.id, from);
            return Vec::new();
        }

        self.heard.insert(from.to_string(), vector.clone());
        if !self.recompute() {
            return Vec::new();
        }

        debug!("{}: routing table updated from {}'s vector", self.id, from);
        self.broadcast()
    }

    /// Answers a vector request from `from`, if it is a neighbor.
    pub fn respond(&self, from: &str) -> Vec<Envelope> {
        if !self.links.contains_key(from) {
            debug!("{}: ignoring request from non-neighbor {}", self.id, from);
            return Vec::new();
        }
        vec![Envelope::vector(self.id.clone(), from, self.split_horizon(from))]
    }

    /// One split-horizon filtered vector for every direct neighbor.
    pub fn broadcast(&self) -> Vec<Envelope> {
        self.links
            .keys()
            .map(|neighbor| Envelope::vector(self.id.clone(), neighbor.clone(), self.split_horizon(neighbor)))
            .collect()
    }

    /// The vector this router advertises toward `neighbor`.
    pub fn split_horizon(&self, neighbor: &str) -> DistanceVector {
        self.routing_table.split_horizon(neighbor)
    }

    /// Rebuilds every route from the links and the stored vectors.
    /// Returns true if anything changed.
    fn recompute(&mut self) -> bool {
        let mut destinations: BTreeSet<RouterId> = self.links.keys().cloned().collect();
        for vector in self.heard.values() {
            destinations.extend(vector.iter().map(|(destination, _)| destination.clone()));
        }
        destinations.extend(self.routing_table.iter().map(|(destination, _)| destination.clone()));
        destinations.remove(&self.id);

        let mut changed = false;
        for destination in destinations {
            let best = self.best_route(&destination);
            if best.as_ref() == self.routing_table.get_route(&destination) {
                continue;
            }
            changed = true;
            match best {
                Some(entry) => {
                    self.routing_table.add_route(destination, entry);
                }
                None => {
                    self.routing_table.remove_route(&destination);
                }
            }
        }
        changed
    }

    fn best_route(&self, destination: &str) -> Option<RoutingEntry> {
        let mut best: Option<RoutingEntry> = None;
        for (neighbor, &link) in &self.links {
            let cost = self.cost_through(neighbor, link, destination);
            if cost.is_finite() && best.as_ref().is_none_or(|entry| cost < entry.cost) {
                best = Some(RoutingEntry::new(cost, neighbor.clone()));
            }
        }

        // ties keep the current next hop
        let best = best?;
        if let Some(current) = self.routing_table.get_route(destination) {
            if current.next_hop != best.next_hop {
                if let Some(&link) = self.links.get(&current.next_hop) {
                    if self.cost_through(&current.next_hop, link, destination) == best.cost {
                        return Some(RoutingEntry::new(best.cost, current.next_hop.clone()));
                    }
                }
            }
        }
        Some(best)
    }

    fn cost_through(&self, neighbor: &str, link: u64, destination: &str) -> Cost {
        if destination == neighbor {
            return Cost::Finite(link).capped(self.infinity);
        }
        self.heard
            .get(neighbor)
            .and_then(|vector| vector.get(destination))
            .map_or(Cost::Infinite, |advertised| (Cost::Finite(link) + advertised.cost).capped(self.infinity))
    }

    fn request_vectors(&self, except: Option<&str>) -> Vec<Envelope> {
        self.links
            .keys()
            .filter(|neighbor| Some(neighbor.as_str()) != except)
            .map(|neighbor| Envelope::request(self.id.clone(), neighbor.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    const INFINITY: u64 = 1 << 16;

    fn vector(entries: &[(&str, Cost, &str)]) -> DistanceVector {
        entries
            .iter()
            .map(|(destination, cost, next_hop)| (destination.to_string(), RoutingEntry::new(*cost, *next_hop)))
            .collect()
    }

    fn recipients(outbound: &[Envelope]) -> Vec<(&str, bool)> {
        outbound.iter().map(|e| (e.to.as_str(), e.is_request())).collect()
    }

    #[test]
    fn new_router_only_knows_itself() {
        let router = Router::new("A", INFINITY);
        let table = router.snapshot();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get_route("A"), Some(&RoutingEntry::new(Cost::ZERO, "A")));
        assert!(router.broadcast().is_empty());
    }

    #[test]
    fn neighbor_update_installs_direct_route() {
        let mut router = Router::new("A", INFINITY);
        let outbound = router.neighbor_update("B", Cost::Finite(8));

        assert!(outbound.is_empty());
        assert_eq!(router.route("B"), Some(&RoutingEntry::new(Cost::Finite(8), "B")));
        assert_eq!(router.link_cost("B"), Some(8));
    }

    #[test]
    fn self_update_is_ignored() {
        let mut router = Router::new("A", INFINITY);
        assert!(router.neighbor_update("A", Cost::Finite(3)).is_empty());
        assert_eq!(router.route("A"), Some(&RoutingEntry::new(Cost::ZERO, "A")));
    }

    #[test]
    fn link_cost_change_shifts_routes_through_that_neighbor() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(8));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(4), "C")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(12), "B")));

        // decrease: no route gets worse, nothing to ask for
        let outbound = router.neighbor_update("B", Cost::Finite(2));
        assert!(outbound.is_empty());
        assert_eq!(router.route("B"), Some(&RoutingEntry::new(Cost::Finite(2), "B")));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(6), "B")));

        // increase: routes through B worsen, the other neighbors are asked
        router.neighbor_update("D", Cost::Finite(3));
        let outbound = router.neighbor_update("B", Cost::Finite(10));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(14), "B")));
        assert_eq!(recipients(&outbound), vec![("D", true)]);
    }

    #[test]
    fn severed_link_drops_every_route_through_the_neighbor() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(8));
        router.neighbor_update("D", Cost::Finite(3));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(4), "C")]));

        let outbound = router.neighbor_update("B", Cost::Infinite);

        assert!(router.route("B").is_none());
        assert!(router.route("C").is_none());
        assert_eq!(router.route("D"), Some(&RoutingEntry::new(Cost::Finite(3), "D")));
        assert_eq!(router.link_cost("B"), None);
        // triggered update followed by a request, both only to D
        assert_eq!(recipients(&outbound), vec![("D", false), ("D", true)]);
    }

    #[test]
    fn receive_ignores_non_neighbors() {
        let mut router = Router::new("A", INFINITY);
        let outbound = router.receive("X", &vector(&[("X", Cost::ZERO, "X"), ("Y", Cost::Finite(1), "Y")]));

        assert!(outbound.is_empty());
        assert_eq!(router.snapshot().len(), 1);
    }

    #[test]
    fn receive_learns_new_and_cheaper_routes_then_broadcasts() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(8));
        router.neighbor_update("D", Cost::Finite(3));

        let outbound = router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("C", Cost::Finite(21), "C")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(24), "D")));
        assert_eq!(recipients(&outbound), vec![("B", false), ("D", false)]);

        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(4), "C")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(12), "B")));
    }

    #[test]
    fn ties_keep_the_existing_route() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(2));
        router.neighbor_update("D", Cost::Finite(2));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(3), "C")]));

        let outbound = router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("C", Cost::Finite(3), "C")]));

        assert!(outbound.is_empty());
        assert_eq!(router.route("C").unwrap().next_hop, "B");
    }

    #[test]
    fn identical_vector_twice_changes_nothing_the_second_time() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));
        let advert = vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(1), "C"), ("D", Cost::Finite(2), "C")]);

        assert!(!router.receive("B", &advert).is_empty());
        let before = router.snapshot();
        assert!(router.receive("B", &advert).is_empty());
        assert_eq!(router.snapshot(), before);
    }

    #[test]
    fn worse_report_from_the_next_hop_falls_back_to_a_remembered_vector() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));
        router.neighbor_update("D", Cost::Finite(5));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(1), "C")]));
        router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("C", Cost::Finite(3), "C")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(2), "B")));

        // B now reports C further away than D does
        let outbound = router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(9), "C")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(8), "D")));
        assert_eq!(recipients(&outbound), vec![("B", false), ("D", false)]);

        // D poisons C as well: nothing left
        router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("C", Cost::Infinite, "A")]));
        assert_eq!(router.route("C"), Some(&RoutingEntry::new(Cost::Finite(10), "B")));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Infinite, "A")]));
        assert!(router.route("C").is_none());
    }

    #[test]
    fn destination_missing_from_the_next_hops_vector_is_withdrawn() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(1), "C")]));

        router.receive("B", &vector(&[("B", Cost::ZERO, "B")]));

        assert!(router.route("C").is_none());
        assert_eq!(router.route("B"), Some(&RoutingEntry::new(Cost::Finite(1), "B")));
    }

    #[test]
    fn unreachable_destination_only_counts_upward() {
        // B and D each still advertise a stale route to X through the other
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));
        router.neighbor_update("D", Cost::Finite(1));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("X", Cost::Finite(5), "C")]));
        router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("X", Cost::Finite(7), "B")]));
        assert_eq!(router.route("X"), Some(&RoutingEntry::new(Cost::Finite(6), "B")));

        // the next hop loses X; the stale report from D is the best left
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("X", Cost::Finite(9), "D")]));
        assert_eq!(router.route("X"), Some(&RoutingEntry::new(Cost::Finite(8), "D")));

        // a withdrawal from B cannot bring back the old cheap route
        router.receive("B", &vector(&[("B", Cost::ZERO, "B")]));
        assert_eq!(router.route("X"), Some(&RoutingEntry::new(Cost::Finite(8), "D")));
    }

    #[test]
    fn severed_neighbor_vector_is_forgotten() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));
        router.neighbor_update("D", Cost::Finite(4));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(1), "C")]));
        router.neighbor_update("B", Cost::Infinite);

        // D's vector triggers a recompute, which must not reuse B's old vector
        router.receive("D", &vector(&[("D", Cost::ZERO, "D"), ("E", Cost::Finite(1), "E")]));
        assert!(router.route("C").is_none());
        assert!(router.route("B").is_none());
        assert_eq!(router.route("E"), Some(&RoutingEntry::new(Cost::Finite(5), "D")));
    }

    #[test]
    fn infinite_advertisements_for_unknown_destinations_are_not_learned() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));

        let outbound = router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("Z", Cost::Infinite, "A")]));

        assert!(outbound.is_empty());
        assert!(router.route("Z").is_none());
    }

    #[test]
    fn costs_at_the_threshold_count_as_unreachable() {
        let mut router = Router::new("A", 16);
        router.neighbor_update("B", Cost::Finite(10));

        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(5), "C"), ("D", Cost::Finite(6), "C")]));

        assert_eq!(router.route("C").unwrap().cost, Cost::Finite(15));
        assert!(router.route("D").is_none());
    }

    #[test]
    fn broadcast_applies_split_horizon_per_neighbor() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(8));
        router.neighbor_update("D", Cost::Finite(3));
        router.receive("B", &vector(&[("B", Cost::ZERO, "B"), ("C", Cost::Finite(4), "C")]));

        for envelope in router.broadcast() {
            let Message::Vector(vector) = &envelope.message else {
                panic!("broadcast must only carry vectors");
            };
            for (destination, advertised) in vector.iter() {
                if router.route(destination).unwrap().next_hop == envelope.to {
                    assert_eq!(advertised.cost, Cost::Infinite, "{} leaked {} to {}", router.id(), destination, envelope.to);
                }
            }
        }
    }

    #[test]
    fn respond_only_answers_neighbors() {
        let mut router = Router::new("A", INFINITY);
        router.neighbor_update("B", Cost::Finite(1));

        assert!(router.respond("X").is_empty());
        let reply = router.respond("B");
        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].to, "B");
        assert!(!reply[0].is_request());
    }
}
