//! Declarative step graph.
//!
//! A graph names its nodes, the step each node runs, and the edges between
//! them. It is plain data (JSON or TOML) and is resolved against a
//! [`StepRegistry`] into an [`ExecutionPlan`]: the nodes reachable from the
//! entry, in dependency order.
//!
//! ```toml
//! entry = "planner"
//!
//! [nodes.planner]
//! [nodes.researcher]
//! [nodes.reporter]
//! step = "markdown_reporter"
//! timeout_secs = 120
//!
//! [[edges]]
//! from = "planner"
//! to = "researcher"
//!
//! [[edges]]
//! from = "researcher"
//! to = "reporter"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::step::{Step, StepRegistry};

/// Node names of the stock research pipeline, in order.
pub const DEFAULT_PIPELINE: [&str; 5] = ["planner", "researcher", "coder", "reporter", "voice"];

fn default_entry() -> String {
    DEFAULT_PIPELINE[0].to_string()
}

/// Per-node settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Registered step to run; defaults to the node name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    /// Overrides the engine's per-step timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// Adjacency description of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default = "default_entry")]
    pub entry: String,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    /// A straight chain through `nodes`, entered at the first one.
    #[must_use]
    pub fn linear(nodes: &[&str]) -> Self {
        Self {
            entry: nodes.first().map_or_else(default_entry, |n| (*n).to_string()),
            nodes: nodes
                .iter()
                .map(|n| ((*n).to_string(), NodeSpec::default()))
                .collect(),
            edges: nodes
                .iter()
                .tuple_windows()
                .map(|(from, to)| Edge {
                    from: (*from).to_string(),
                    to: (*to).to_string(),
                })
                .collect(),
        }
    }

    /// The stock planner → researcher → coder → reporter → voice chain.
    #[must_use]
    pub fn default_pipeline() -> Self {
        Self::linear(&DEFAULT_PIPELINE)
    }

    /// Parse a JSON graph definition.
    ///
    /// # Errors
    ///
    /// Returns an invalid-graph error if the JSON does not describe a graph.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| EngineError::invalid_graph(format!("JSON graph definition: {e}")))
    }

    /// Parse a TOML graph definition.
    ///
    /// # Errors
    ///
    /// Returns an invalid-graph error if the TOML does not describe a graph.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw)
            .map_err(|e| EngineError::invalid_graph(format!("TOML graph definition: {e}")))
    }

    /// Load from a `.json` or `.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an invalid-graph error if the file cannot be read, has an
    /// unknown extension, or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::invalid_graph(format!("cannot read '{}': {e}", path.display()))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("toml") => Self::from_toml_str(&raw),
            _ => Err(EngineError::invalid_graph(format!(
                "'{}' is neither .json nor .toml",
                path.display()
            ))),
        }
    }

    /// Resolve against a registry into an ordered plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` for a missing entry, dangling edges, or a
    /// cycle, and `StepNotFound` when a reachable node's step is not
    /// registered.
    pub fn plan(&self, registry: &StepRegistry) -> Result<ExecutionPlan> {
        if !self.nodes.contains_key(&self.entry) {
            return Err(EngineError::invalid_graph(format!(
                "entry node '{}' is not declared",
                self.entry
            )));
        }

        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let indices: HashMap<&str, NodeIndex> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), graph.add_node(name.as_str())))
            .collect();

        for edge in &self.edges {
            let (Some(&from), Some(&to)) = (
                indices.get(edge.from.as_str()),
                indices.get(edge.to.as_str()),
            ) else {
                return Err(EngineError::invalid_graph(format!(
                    "edge '{}' -> '{}' references an undeclared node",
                    edge.from, edge.to
                )));
            };
            graph.add_edge(from, to, ());
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let node = graph.node_weight(cycle.node_id()).copied().unwrap_or("?");
            EngineError::invalid_graph(format!("cycle through '{node}'"))
        })?;

        let mut reachable = HashSet::new();
        if let Some(&entry) = indices.get(self.entry.as_str()) {
            let mut dfs = Dfs::new(&graph, entry);
            while let Some(idx) = dfs.next(&graph) {
                reachable.insert(idx);
            }
        }

        let mut planned = Vec::new();
        let mut missing = Vec::new();
        for idx in order.into_iter().filter(|idx| reachable.contains(idx)) {
            let Some(&node) = graph.node_weight(idx) else {
                continue;
            };
            let spec = self.nodes.get(node).cloned().unwrap_or_default();
            let step_name = spec.step.as_deref().unwrap_or(node);
            match registry.get(step_name) {
                Some(step) => planned.push(PlannedNode {
                    node: node.to_string(),
                    step,
                    timeout: spec.timeout_secs.map(Duration::from_secs),
                }),
                None => missing.push(step_name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(EngineError::step_not_found(missing.iter().join(", ")));
        }
        Ok(ExecutionPlan { nodes: planned })
    }
}

/// One resolved node.
#[derive(Clone)]
pub struct PlannedNode {
    pub node: String,
    pub step: Arc<dyn Step>,
    pub timeout: Option<Duration>,
}

/// Nodes reachable from the entry, in execution order.
#[derive(Clone, Default)]
pub struct ExecutionPlan {
    nodes: Vec<PlannedNode>,
}

impl ExecutionPlan {
    #[must_use]
    pub fn nodes(&self) -> &[PlannedNode] {
        &self.nodes
    }

    /// Node names in execution order.
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.node.as_str()).collect()
    }
}
