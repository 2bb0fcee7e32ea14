//! Agent registry.
//!
//! Agents are registered through an [`AgentRegistryBuilder`]; the registry
//! itself only exists once `build` has checked that every node of the graph
//! has an agent. There is no way to observe a half-filled registry.

use crate::agents::{
    Agent, AudienceAdapterAgent, ResearchAgent, SlideWriterAgent, StructureAgent, SummaryAgent,
    ValidatorAgent,
};
use crate::core::{NodeId, TaskGraph};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable map from task node to the agent that serves it.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<NodeId, Arc<dyn Agent>>,
}

impl AgentRegistry {
    /// Start registering agents.
    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder::default()
    }

    /// All twelve built-in agents, checked against `graph`.
    pub fn standard(graph: &TaskGraph) -> Result<Self> {
        let mut builder = Self::builder()
            .register(ResearchAgent)
            .register(StructureAgent)
            .register(SlideWriterAgent);
        for validator in ValidatorAgent::all() {
            builder = builder.register(validator);
        }
        builder
            .register(SummaryAgent)
            .register(AudienceAdapterAgent)
            .build(graph)
    }

    /// Look up the agent for `node`.
    ///
    /// # Errors
    ///
    /// Returns `AgentNotFound` if no agent serves `node`.
    pub fn get(&self, node: &NodeId) -> Result<Arc<dyn Agent>> {
        self.agents
            .get(node)
            .cloned()
            .ok_or(Error::AgentNotFound(*node))
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.agents.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.agents.keys()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Default)]
pub struct AgentRegistryBuilder {
    agents: BTreeMap<NodeId, Arc<dyn Agent>>,
}

impl AgentRegistryBuilder {
    /// Add an agent under its own id. A later registration for the same id wins.
    pub fn register<A: Agent + 'static>(self, agent: A) -> Self {
        self.register_arc(Arc::new(agent))
    }

    pub fn register_arc(mut self, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(agent.id(), agent);
        self
    }

    /// Finish registration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryIncomplete` naming the first graph node, in
    /// declaration order, that has no agent.
    pub fn build(self, graph: &TaskGraph) -> Result<AgentRegistry> {
        if let Some(missing) = graph.nodes().iter().find(|id| !self.agents.contains_key(*id)) {
            return Err(Error::RegistryIncomplete(*missing));
        }
        Ok(AgentRegistry {
            agents: self.agents,
        })
    }
}
