use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::cmp::Ordering;
use crate::RouterId;
use crate::network::EdgeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortestPath {
    pub cost: u64,
    pub next_hop: RouterId,
    pub path: Vec<RouterId>,
}

#[derive(Debug)]
struct State {
    cost: u64,
    router: RouterId,
}

impl Eq for State {}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other.cost.cmp(&self.cost)
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shortest path from `source` to every router reachable over `edges`.
///
/// The source itself is included with cost 0 and itself as next hop.
pub fn shortest_paths(edges: &BTreeMap<EdgeKey, u64>, source: &str) -> HashMap<RouterId, ShortestPath> {
    let adjacency = adjacency(edges);
    let mut distances: HashMap<RouterId, u64> = HashMap::new();
    let mut previous: HashMap<RouterId, RouterId> = HashMap::new();
    let mut heap = BinaryHeap::new();

    distances.insert(source.to_string(), 0);
    heap.push(State {
        cost: 0,
        router: source.to_string(),
    });

    while let Some(State { cost, router }) = heap.pop() {
        // Skip if we've already found a better path
        if cost > *distances.get(&router).unwrap_or(&u64::MAX) {
            continue;
        }

        for &(neighbor, link_cost) in adjacency.get(router.as_str()).into_iter().flatten() {
            let new_cost = cost.saturating_add(link_cost);

            if new_cost < *distances.get(neighbor).unwrap_or(&u64::MAX) {
                distances.insert(neighbor.to_string(), new_cost);
                previous.insert(neighbor.to_string(), router.clone());

                heap.push(State {
                    cost: new_cost,
                    router: neighbor.to_string(),
                });
            }
        }
    }

    distances
        .into_iter()
        .map(|(destination, cost)| {
            let path = reconstruct_path(&previous, &destination);
            let next_hop = path.get(1).cloned().unwrap_or_else(|| source.to_string());
            (destination, ShortestPath { cost, next_hop, path })
        })
        .collect()
}

fn adjacency(edges: &BTreeMap<EdgeKey, u64>) -> HashMap<&str, Vec<(&str, u64)>> {
    let mut adjacency: HashMap<&str, Vec<(&str, u64)>> = HashMap::new();
    for (key, &weight) in edges {
        let (a, b) = key.endpoints();
        adjacency.entry(a).or_default().push((b, weight));
        adjacency.entry(b).or_default().push((a, weight));
    }
    adjacency
}

fn reconstruct_path(previous: &HashMap<RouterId, RouterId>, dest: &str) -> Vec<RouterId> {
    let mut path = vec![dest.to_string()];
    let mut current = dest;

    while let Some(prev) = previous.get(current) {
        path.push(prev.clone());
        current = prev.as_str();
    }

    path.reverse();
    path
}
