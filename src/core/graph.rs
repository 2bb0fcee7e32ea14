//! Task graph for pipeline dependency management.
//!
//! The TaskGraph declares, statically, which agents must finish before
//! another may run and how nodes group into ordered phases. It is built once
//! at process start and only read afterwards.

use crate::core::node::{NodeId, NodeSpec, Phase};
use crate::error::{Error, Result};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Strength of a dependency edge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// The downstream node needs the upstream value; without it the node aborts.
    Hard,
    /// The downstream node uses the upstream value if present.
    Soft,
}

impl Default for DependencyKind {
    fn default() -> Self {
        Self::Hard
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyKind::Hard => write!(f, "hard"),
            DependencyKind::Soft => write!(f, "soft"),
        }
    }
}

/// The pipeline dependency graph.
///
/// Nodes are agent slots, edges point from a dependency to its dependent.
pub struct TaskGraph {
    graph: DiGraph<NodeSpec, DependencyKind>,
    index: HashMap<NodeId, NodeIndex>,
    /// Declaration order, used for sequential execution within a phase.
    declared: Vec<NodeId>,
}

impl TaskGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
            declared: Vec::new(),
        }
    }

    /// The standard presentation pipeline.
    ///
    /// research → structure → slide writing → QA fan-out → on-demand finalization.
    pub fn standard() -> Result<Self> {
        use DependencyKind::{Hard, Soft};

        let mut graph = Self::new();
        graph.add_node(NodeSpec::required(NodeId::Researcher, Phase::Research));
        graph.add_node(NodeSpec::required(NodeId::Structurer, Phase::Structure));
        graph.add_node(NodeSpec::required(NodeId::SlideWriter, Phase::Generation));
        for validator in NodeId::VALIDATORS {
            graph.add_node(NodeSpec::optional(validator, Phase::Qa));
        }
        graph.add_node(NodeSpec::optional(NodeId::ExecutiveSummary, Phase::Finalization).on_demand());
        graph.add_node(NodeSpec::optional(NodeId::AudienceAdapter, Phase::Finalization).on_demand());

        graph.add_dependency(&NodeId::Researcher, &NodeId::Structurer, Hard)?;
        graph.add_dependency(&NodeId::Researcher, &NodeId::SlideWriter, Hard)?;
        graph.add_dependency(&NodeId::Structurer, &NodeId::SlideWriter, Hard)?;
        for validator in NodeId::VALIDATORS {
            graph.add_dependency(&NodeId::SlideWriter, &validator, Hard)?;
        }
        graph.add_dependency(&NodeId::SlideWriter, &NodeId::ExecutiveSummary, Hard)?;
        graph.add_dependency(&NodeId::FactChecker, &NodeId::ExecutiveSummary, Soft)?;
        graph.add_dependency(&NodeId::SlideWriter, &NodeId::AudienceAdapter, Hard)?;
        graph.add_dependency(&NodeId::ExecutiveSummary, &NodeId::AudienceAdapter, Soft)?;

        graph.validate()?;
        Ok(graph)
    }

    /// Add a node to the graph.
    ///
    /// If a node with the same id already exists, returns its index unchanged.
    pub fn add_node(&mut self, spec: NodeSpec) -> NodeIndex {
        if let Some(&index) = self.index.get(&spec.id) {
            return index;
        }

        let id = spec.id;
        let index = self.graph.add_node(spec);
        self.index.insert(id, index);
        self.declared.push(id);
        index
    }

    /// Declare that `to` depends on `from`.
    ///
    /// # Errors
    /// Returns an error if either node is unknown or the edge would close a cycle.
    pub fn add_dependency(&mut self, from: &NodeId, to: &NodeId, kind: DependencyKind) -> Result<()> {
        let from_index = self
            .index
            .get(from)
            .ok_or_else(|| Error::Config(format!("Node {} not found in graph", from)))?;
        let to_index = self
            .index
            .get(to)
            .ok_or_else(|| Error::Config(format!("Node {} not found in graph", to)))?;

        let edge = self.graph.add_edge(*from_index, *to_index, kind);

        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::Cycle(format!("{} -> {}", from, to)));
        }

        Ok(())
    }

    /// Check the structural rules the executor relies on.
    ///
    /// - the graph is acyclic
    /// - no node depends on a node of a later phase
    /// - nodes of a concurrent phase do not depend on each other
    /// - within a sequential phase, dependencies are declared before dependents
    pub fn validate(&self) -> Result<()> {
        self.topological_order()?;

        for edge in self.graph.edge_indices() {
            let Some((from, to)) = self.graph.edge_endpoints(edge) else {
                continue;
            };
            let (from, to) = (&self.graph[from], &self.graph[to]);
            if from.phase > to.phase {
                return Err(Error::Config(format!(
                    "{} ({}) cannot depend on {} from later phase {}",
                    to.id, to.phase, from.id, from.phase
                )));
            }
            if from.phase == to.phase && self.is_concurrent_phase(from.phase) {
                return Err(Error::Config(format!(
                    "{} and {} run concurrently in phase {} and cannot depend on each other",
                    from.id, to.id, from.phase
                )));
            }
            if from.phase == to.phase {
                let from_pos = self.declared.iter().position(|id| *id == from.id);
                let to_pos = self.declared.iter().position(|id| *id == to.id);
                if from_pos > to_pos {
                    return Err(Error::Config(format!(
                        "{} must be declared before its dependent {}",
                        from.id, to.id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn spec(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.index.get(id).and_then(|&index| self.graph.node_weight(index))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node ids in declaration order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.declared
    }

    /// All nodes `id` directly depends on.
    pub fn dependencies_of(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.dependencies_with_kind(id)
            .into_iter()
            .map(|(dep, _)| dep)
            .collect()
    }

    /// Direct dependencies of `id` with the strength of each edge.
    pub fn dependencies_with_kind(&self, id: &NodeId) -> Vec<(NodeId, DependencyKind)> {
        let Some(&index) = self.index.get(id) else {
            return Vec::new();
        };
        let mut deps: Vec<(NodeId, DependencyKind)> = self
            .graph
            .edges_directed(index, Direction::Incoming)
            .map(|edge| (self.graph[edge.source()].id, *edge.weight()))
            .collect();
        deps.sort_by_key(|(dep, _)| *dep);
        deps
    }

    /// Get the kind of the edge `from -> to`, if one exists.
    pub fn dependency_kind(&self, from: &NodeId, to: &NodeId) -> Option<DependencyKind> {
        let from_idx = self.index.get(from)?;
        let to_idx = self.index.get(to)?;
        let edge = self.graph.find_edge(*from_idx, *to_idx)?;
        self.graph.edge_weight(edge).copied()
    }

    /// Nodes that directly depend on `id`.
    pub fn dependents_of(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let Some(&index) = self.index.get(id) else {
            return BTreeSet::new();
        };
        self.graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|neighbor| self.graph[neighbor].id)
            .collect()
    }

    /// Every node reachable from `id`, excluding `id` itself.
    pub fn descendants(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let mut found = BTreeSet::new();
        let Some(&start) = self.index.get(id) else {
            return found;
        };
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            if index != start {
                found.insert(self.graph[index].id);
            }
        }
        found
    }

    pub fn is_concurrent_phase(&self, phase: Phase) -> bool {
        phase.concurrency() == crate::core::node::ConcurrencyClass::FanOut
    }

    /// Non-empty phases in execution order, each with its nodes in declaration order.
    pub fn phases(&self) -> Vec<(Phase, Vec<NodeId>)> {
        Phase::ORDERED
            .iter()
            .filter_map(|&phase| {
                let nodes: Vec<NodeId> = self
                    .declared
                    .iter()
                    .copied()
                    .filter(|id| self.spec(id).map(|s| s.phase) == Some(phase))
                    .collect();
                if nodes.is_empty() {
                    None
                } else {
                    Some((phase, nodes))
                }
            })
            .collect()
    }

    /// Nodes in an order where every node follows its dependencies.
    ///
    /// # Errors
    /// Returns an error if the graph contains a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let sorted = toposort(&self.graph, None).map_err(|cycle| {
            let name = self
                .graph
                .node_weight(cycle.node_id())
                .map(|spec| spec.id.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Error::Cycle(name)
        })?;

        Ok(sorted.into_iter().map(|index| self.graph[index].id).collect())
    }

    /// Every edge as `(from, to, kind)`, sorted by endpoints.
    pub fn edges(&self) -> Vec<(NodeId, NodeId, DependencyKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter_map(|edge| {
                let (from, to) = self.graph.edge_endpoints(edge)?;
                Some((self.graph[from].id, self.graph[to].id, self.graph[edge]))
            })
            .collect();
        edges.sort_by_key(|(from, to, _)| (*from, *to));
        edges
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraph")
            .field("nodes", &self.node_count())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
