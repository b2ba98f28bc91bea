//! Centralised shortest-path computation used to check converged tables.

pub mod dijkstra;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::RouterId;
use crate::network::EdgeKey;
use crate::protocol::RoutingTable;
use crate::types::Cost;

/// A route whose cost disagrees with the shortest-path distance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMismatch {
    pub source: RouterId,
    pub destination: RouterId,
    pub expected: Cost,
    pub actual: Cost,
}

impl fmt::Display for RouteMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}: expected {}, found {}",
            self.source, self.destination, self.expected, self.actual
        )
    }
}

/// Compares every table against Dijkstra over `edges`.
///
/// Distances at or above `infinity` are expected to be unreachable, the same
/// way the routers treat them.
pub fn compare(
    tables: &BTreeMap<RouterId, RoutingTable>,
    edges: &BTreeMap<EdgeKey, u64>,
    infinity: u64,
) -> Vec<RouteMismatch> {
    let mut mismatches = Vec::new();

    for (source, table) in tables {
        let paths = dijkstra::shortest_paths(edges, source);

        let mut destinations: Vec<&RouterId> = tables.keys().collect();
        destinations.extend(table.iter().map(|(destination, _)| destination));
        destinations.sort();
        destinations.dedup();

        for destination in destinations {
            let expected = paths
                .get(destination)
                .map_or(Cost::Infinite, |path| Cost::Finite(path.cost).capped(infinity));
            let actual = table.cost_to(destination);
            if expected != actual {
                mismatches.push(RouteMismatch {
                    source: source.clone(),
                    destination: destination.clone(),
                    expected,
                    actual,
                });
            }
        }
    }

    mismatches
}
