//! Per-request execution context.
//!
//! The context holds the validated output of every completed node, keyed by
//! node id. Only the executor writes to it, once per key, between phases.
//! Agents receive an immutable [`ContextSnapshot`] taken before they start.

use crate::agents::output::{
    AdaptedDeck, AgentOutput, ExecutiveSummary, Outline, ResearchNotes, SlideDeck,
};
use crate::core::NodeId;
use crate::error::{Error, Result};
use crate::quality::Finding;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ExecutionContext {
    values: BTreeMap<NodeId, Arc<AgentOutput>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's output.
    ///
    /// # Errors
    /// Returns `ContextConflict` if the node already has a recorded value.
    pub fn commit(&mut self, node: NodeId, output: AgentOutput) -> Result<()> {
        if self.values.contains_key(&node) {
            return Err(Error::ContextConflict(node));
        }
        self.values.insert(node, Arc::new(output));
        Ok(())
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.values.contains_key(node)
    }

    pub fn get(&self, node: &NodeId) -> Option<&AgentOutput> {
        self.values.get(node).map(|v| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cheap read-only view of everything committed so far.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            values: Arc::new(self.values.clone()),
        }
    }
}

/// Immutable view of the context at the moment an agent was invoked.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    values: Arc<BTreeMap<NodeId, Arc<AgentOutput>>>,
}

impl ContextSnapshot {
    pub fn get(&self, node: &NodeId) -> Option<&AgentOutput> {
        self.values.get(node).map(|v| v.as_ref())
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.values.contains_key(node)
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeId> {
        self.values.keys()
    }

    pub fn research(&self) -> Option<&ResearchNotes> {
        match self.get(&NodeId::Researcher)? {
            AgentOutput::Research(notes) => Some(notes),
            _ => None,
        }
    }

    pub fn outline(&self) -> Option<&Outline> {
        match self.get(&NodeId::Structurer)? {
            AgentOutput::Outline(outline) => Some(outline),
            _ => None,
        }
    }

    pub fn deck(&self) -> Option<&SlideDeck> {
        match self.get(&NodeId::SlideWriter)? {
            AgentOutput::Slides(deck) => Some(deck),
            _ => None,
        }
    }

    pub fn findings(&self, node: &NodeId) -> Option<&[Finding]> {
        match self.get(node)? {
            AgentOutput::Findings(findings) => Some(findings),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&ExecutiveSummary> {
        match self.get(&NodeId::ExecutiveSummary)? {
            AgentOutput::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    pub fn adapted(&self) -> Option<&AdaptedDeck> {
        match self.get(&NodeId::AudienceAdapter)? {
            AgentOutput::Adapted(deck) => Some(deck),
            _ => None,
        }
    }
}
