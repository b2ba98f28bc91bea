use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use crate::RouterId;
use crate::types::Cost;
use super::DistanceVector;

/// Destination to `(cost, next hop)` map owned by a single router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    entries: BTreeMap<RouterId, RoutingEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub cost: Cost,
    pub next_hop: RouterId,
}

impl RoutingEntry {
    pub fn new(cost: Cost, next_hop: impl Into<RouterId>) -> Self {
        Self {
            cost,
            next_hop: next_hop.into(),
        }
    }
}

impl fmt::Display for RoutingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.cost, self.next_hop)
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the route, returning the previous one.
    pub fn add_route(&mut self, destination: impl Into<RouterId>, entry: RoutingEntry) -> Option<RoutingEntry> {
        self.entries.insert(destination.into(), entry)
    }

    pub fn remove_route(&mut self, destination: &str) -> Option<RoutingEntry> {
        self.entries.remove(destination)
    }

    pub fn get_route(&self, destination: &str) -> Option<&RoutingEntry> {
        self.entries.get(destination)
    }

    pub(crate) fn get_route_mut(&mut self, destination: &str) -> Option<&mut RoutingEntry> {
        self.entries.get_mut(destination)
    }

    /// Cost to `destination`, `Infinite` when there is no route.
    pub fn cost_to(&self, destination: &str) -> Cost {
        self.entries.get(destination).map_or(Cost::Infinite, |entry| entry.cost)
    }

    pub fn next_hop(&self, destination: &str) -> Option<&str> {
        self.entries.get(destination).map(|entry| entry.next_hop.as_str())
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    /// Destinations currently forwarded through `next_hop`.
    pub fn routes_via(&self, next_hop: &str) -> Vec<RouterId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.next_hop == next_hop)
            .map(|(destination, _)| destination.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RouterId, &RoutingEntry)> {
        self.entries.iter()
    }

    /// Copy of the table to send toward `neighbor`.
    ///
    /// Every route whose next hop is `neighbor` is advertised with an infinite
    /// cost so the neighbor never learns a path back through itself. The local
    /// routes are left untouched.
    pub fn split_horizon(&self, neighbor: &str) -> DistanceVector {
        self.entries
            .iter()
            .map(|(destination, entry)| {
                let cost = if entry.next_hop == neighbor { Cost::Infinite } else { entry.cost };
                (destination.clone(), RoutingEntry::new(cost, entry.next_hop.clone()))
            })
            .collect()
    }
}
