use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use anyhow::{Context, ensure};

use crate::RouterId;
use crate::network::Topology;

/// Costs at or above this value are unreachable unless configured otherwise.
pub const DEFAULT_INFINITY: u64 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Threshold at which a cost counts as unreachable. Bounds count-to-infinity.
    pub infinity: u64,
    /// Most messages a single cascade may deliver. `None` is unbounded.
    pub message_budget: Option<u64>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            infinity: DEFAULT_INFINITY,
            message_budget: None,
        }
    }
}

/// A topology plus an ordered list of edits, loadable from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: TopologyConfig,
    #[serde(default)]
    pub nodes: Vec<RouterId>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AddNode { id: RouterId },
    AddEdge { a: RouterId, b: RouterId, weight: u64 },
    RemoveEdge { a: RouterId, b: RouterId },
    RemoveNode { id: RouterId },
    /// Show the routing tables at this point.
    Print,
}

impl Step {
    pub fn apply(&self, topology: &mut Topology) -> crate::Result<()> {
        match self {
            Step::AddNode { id } => topology.add_node(id.clone()),
            Step::AddEdge { a, b, weight } => topology.add_edge(a, b, *weight),
            Step::RemoveEdge { a, b } => topology.remove_edge(a, b),
            Step::RemoveNode { id } => topology.remove_node(id),
            Step::Print => Ok(()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::AddNode { id } => write!(f, "add node {}", id),
            Step::AddEdge { a, b, weight } => write!(f, "add edge {}-{} weight {}", a, b, weight),
            Step::RemoveEdge { a, b } => write!(f, "remove edge {}-{}", a, b),
            Step::RemoveNode { id } => write!(f, "remove node {}", id),
            Step::Print => write!(f, "print"),
        }
    }
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&content)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("writing scenario {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.config.infinity > 0, "infinity threshold must be positive");
        ensure!(self.config.message_budget != Some(0), "message budget must be positive");
        Ok(())
    }

    /// Four routers R1..R4: build the ring, make R3-R4 cheap, then cut it.
    pub fn demo() -> Self {
        let edge = |a: &str, b: &str, weight| Step::AddEdge { a: a.into(), b: b.into(), weight };
        Self {
            config: TopologyConfig::default(),
            nodes: ["R1", "R2", "R3", "R4"].into_iter().map(String::from).collect(),
            steps: vec![
                edge("R1", "R2", 8),
                edge("R2", "R3", 4),
                edge("R3", "R4", 21),
                edge("R1", "R4", 3),
                Step::Print,
                edge("R3", "R4", 1),
                Step::Print,
                Step::RemoveEdge { a: "R3".into(), b: "R4".into() },
                Step::Print,
            ],
        }
    }

    /// A topology holding only the scenario's initial nodes.
    pub fn build(&self) -> crate::Result<Topology> {
        let mut topology = Topology::with_config(self.config);
        for id in &self.nodes {
            topology.add_node(id.clone())?;
        }
        Ok(topology)
    }

    /// Builds the topology and applies every step, calling `on_print` at each `Print`.
    pub fn run<F>(&self, mut on_print: F) -> crate::Result<Topology>
    where
        F: FnMut(&Topology),
    {
        let mut topology = self.build()?;
        for step in &self.steps {
            step.apply(&mut topology)?;
            if *step == Step::Print {
                on_print(&topology);
            }
        }
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cost;

    #[test]
    fn parses_scenario_json() {
        let json = r#"{
            "config": { "infinity": 100 },
            "nodes": ["A", "B"],
            "steps": [
                { "add_edge": { "a": "A", "b": "B", "weight": 3 } },
                "print",
                { "remove_node": { "id": "B" } }
            ]
        }"#;
        let scenario: Scenario = serde_json::from_str(json).unwrap();

        assert_eq!(scenario.config.infinity, 100);
        assert_eq!(scenario.config.message_budget, None);
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[1], Step::Print);
        assert_eq!(scenario.steps[2], Step::RemoveNode { id: "B".into() });
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let scenario: Scenario = serde_json::from_str(r#"{ "nodes": ["A"] }"#).unwrap();
        assert_eq!(scenario.config, TopologyConfig::default());
        assert!(scenario.steps.is_empty());
    }

    #[test]
    fn save_then_load_keeps_the_scenario() {
        let path = std::env::temp_dir().join(format!("dv-routing-scenario-{}.json", std::process::id()));
        let scenario = Scenario::demo();

        scenario.save(&path).unwrap();
        let loaded = Scenario::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, scenario);
    }

    #[test]
    fn zero_infinity_is_rejected() {
        let scenario = Scenario {
            config: TopologyConfig { infinity: 0, ..TopologyConfig::default() },
            ..Scenario::default()
        };
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn zero_message_budget_is_rejected() {
        let scenario = Scenario {
            config: TopologyConfig { message_budget: Some(0), ..TopologyConfig::default() },
            ..Scenario::default()
        };
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn demo_prints_three_times_and_ends_without_the_cut_edge() {
        let mut prints = Vec::new();
        let topology = Scenario::demo()
            .run(|topology| prints.push(topology.router("R1").unwrap().route("R3").unwrap().cost))
            .unwrap();

        assert_eq!(prints, vec![Cost::Finite(12), Cost::Finite(4), Cost::Finite(12)]);
        assert_eq!(topology.edge_weight("R3", "R4"), None);
        assert!(topology.mismatches().is_empty());
    }
}
