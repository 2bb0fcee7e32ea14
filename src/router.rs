//! Policy-based model routing.
//!
//! The router maps a (task node, policy) pair to exactly one backend. It is a
//! pure function of the immutable backend registry and the node's phase:
//! candidates are filtered, stably ranked by the policy, and the first one
//! wins. Ties keep registry declaration order.

use crate::backend::{BackendDescriptor, BackendRegistry};
use crate::core::{ComplexityClass, NodeId, NodeSpec, TaskGraph};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named trade-off profile for backend selection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingPolicy {
    Quality,
    Speed,
    Cost,
    #[default]
    Balanced,
    LocalOnly,
}

impl RoutingPolicy {
    pub const ALL: [RoutingPolicy; 5] = [
        RoutingPolicy::Quality,
        RoutingPolicy::Speed,
        RoutingPolicy::Cost,
        RoutingPolicy::Balanced,
        RoutingPolicy::LocalOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingPolicy::Quality => "quality",
            RoutingPolicy::Speed => "speed",
            RoutingPolicy::Cost => "cost",
            RoutingPolicy::Balanced => "balanced",
            RoutingPolicy::LocalOnly => "local-only",
        }
    }
}

impl std::fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoutingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        RoutingPolicy::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Unknown routing policy: {}", s)))
    }
}

/// Primary and fallback backends resolved for one node.
#[derive(Debug, Clone)]
pub struct Route {
    pub node: NodeId,
    pub primary: BackendDescriptor,
    pub fallback: Option<BackendDescriptor>,
}

/// Routes for every node one request will execute, resolved up front.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub policy: RoutingPolicy,
    routes: BTreeMap<NodeId, Route>,
}

impl RoutePlan {
    pub fn get(&self, node: &NodeId) -> Option<&Route> {
        self.routes.get(node)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// One row of the policy table: where each node goes under `policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRoutes {
    pub policy: RoutingPolicy,
    /// `None` marks a node this policy cannot serve.
    pub routes: Vec<(NodeId, Option<String>)>,
}

#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<BackendRegistry>,
}

impl Router {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Every backend able to serve `spec` under `policy`, best first.
    pub fn candidates(&self, spec: &NodeSpec, policy: RoutingPolicy) -> Vec<&BackendDescriptor> {
        let mut candidates: Vec<&BackendDescriptor> = self
            .registry
            .iter()
            .filter(|d| d.serves(&spec.id))
            .filter(|d| policy != RoutingPolicy::LocalOnly || d.local)
            .collect();

        let complexity = spec.phase.complexity();
        // sort_by is stable, so equal keys keep declaration order.
        candidates.sort_by(|a, b| rank(policy, complexity, a, b));
        candidates
    }

    /// Resolve the backend for `spec`.
    ///
    /// # Errors
    /// Returns `Routing` when no registered backend satisfies the policy.
    pub fn route(&self, spec: &NodeSpec, policy: RoutingPolicy) -> Result<&BackendDescriptor> {
        self.candidates(spec, policy)
            .into_iter()
            .next()
            .ok_or_else(|| Error::Routing {
                node: spec.id,
                policy: policy.to_string(),
            })
    }

    /// Backend to try once `primary` is exhausted.
    ///
    /// Never more capable than the primary: a strictly less capable tier is
    /// preferred, then another backend of the same tier.
    pub fn fallback(
        &self,
        spec: &NodeSpec,
        policy: RoutingPolicy,
        primary: &BackendDescriptor,
    ) -> Option<&BackendDescriptor> {
        let others: Vec<&BackendDescriptor> = self
            .candidates(spec, policy)
            .into_iter()
            .filter(|d| d.id != primary.id)
            .collect();
        let capability = primary.tier.capability();

        others
            .iter()
            .find(|d| d.tier.capability() < capability)
            .or_else(|| others.iter().find(|d| d.tier.capability() == capability))
            .copied()
    }

    /// Resolve every node in `nodes` before anything runs.
    ///
    /// An optional node with no compatible backend is left out of the plan;
    /// the executor degrades it when its turn comes.
    ///
    /// # Errors
    /// Fails on the first required node (in the given order) that cannot be
    /// routed.
    pub fn plan(&self, graph: &TaskGraph, nodes: &[NodeId], policy: RoutingPolicy) -> Result<RoutePlan> {
        let mut routes = BTreeMap::new();
        for node in nodes {
            let spec = graph
                .spec(node)
                .ok_or_else(|| Error::Config(format!("Node {} not found in graph", node)))?;
            let primary = match self.route(spec, policy) {
                Ok(primary) => primary,
                Err(e) if !spec.is_required() => {
                    tracing::warn!(node = %node, policy = %policy, error = %e, "optional node left unrouted");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let fallback = self.fallback(spec, policy, primary).cloned();
            routes.insert(
                *node,
                Route {
                    node: *node,
                    primary: primary.clone(),
                    fallback,
                },
            );
        }
        Ok(RoutePlan { policy, routes })
    }

    /// Where every graph node would be routed under every policy.
    pub fn policy_table(&self, graph: &TaskGraph) -> Vec<PolicyRoutes> {
        RoutingPolicy::ALL
            .iter()
            .map(|&policy| PolicyRoutes {
                policy,
                routes: graph
                    .nodes()
                    .iter()
                    .filter_map(|id| graph.spec(id))
                    .map(|spec| {
                        let backend = self.route(spec, policy).ok().map(|d| d.id.clone());
                        (spec.id, backend)
                    })
                    .collect(),
            })
            .collect()
    }
}

fn rank(
    policy: RoutingPolicy,
    complexity: ComplexityClass,
    a: &BackendDescriptor,
    b: &BackendDescriptor,
) -> Ordering {
    let by_capability = || b.tier.capability().cmp(&a.tier.capability());
    let by_speed = || b.tier.speed().cmp(&a.tier.speed());

    match policy {
        RoutingPolicy::Quality => by_capability(),
        RoutingPolicy::Speed => by_speed(),
        RoutingPolicy::Cost => a.cost_per_1k_tokens.total_cmp(&b.cost_per_1k_tokens),
        RoutingPolicy::Balanced | RoutingPolicy::LocalOnly => match complexity {
            ComplexityClass::Reasoning => by_capability(),
            ComplexityClass::Throughput => by_speed(),
        },
    }
}
