//! Model backends.
//!
//! A backend takes one prompt-shaped request and returns text or fails. The
//! engine never talks to a model directly; it goes through a
//! [`BackendDescriptor`] chosen by the router.

mod command;
mod offline;

pub use command::{CommandBackend, DEFAULT_TIMEOUT_SECS};
pub use offline::OfflineBackend;

use crate::core::{NodeId, Usage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// A prompt-shaped request for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub task: NodeId,
    /// Natural-language instructions, including the expected answer shape.
    pub instructions: String,
    /// Structured inputs the instructions refer to.
    pub payload: serde_json::Value,
}

impl BackendRequest {
    pub fn new(task: NodeId, instructions: &str, payload: serde_json::Value) -> Self {
        Self {
            task,
            instructions: instructions.to_string(),
            payload,
        }
    }

    /// Flatten to a single prompt string for text-only backends.
    pub fn render(&self) -> String {
        let payload =
            serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string());
        format!(
            "{}\n\nRespond with a single JSON object and nothing else.\n\nINPUT:\n{}",
            self.instructions, payload
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    pub usage: Usage,
}

impl BackendReply {
    pub fn new(text: String) -> Self {
        Self {
            text,
            usage: Usage::default(),
        }
    }
}

/// A callable generation backend, local or remote.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply>;
}

/// Capability class of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityTier {
    HighReasoning,
    Standard,
    FastThroughput,
}

impl CapabilityTier {
    /// Higher is more capable.
    pub fn capability(&self) -> u8 {
        match self {
            CapabilityTier::HighReasoning => 3,
            CapabilityTier::Standard => 2,
            CapabilityTier::FastThroughput => 1,
        }
    }

    /// Higher is faster.
    pub fn speed(&self) -> u8 {
        4 - self.capability()
    }
}

impl std::fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityTier::HighReasoning => write!(f, "high-reasoning"),
            CapabilityTier::Standard => write!(f, "standard"),
            CapabilityTier::FastThroughput => write!(f, "fast-throughput"),
        }
    }
}

/// A registered backend plus the metadata the router ranks it by.
#[derive(Clone)]
pub struct BackendDescriptor {
    pub id: String,
    pub tier: CapabilityTier,
    /// Eligible under the local-only policy.
    pub local: bool,
    pub cost_per_1k_tokens: f64,
    /// Nodes this backend may serve; `None` serves every node.
    pub tasks: Option<BTreeSet<NodeId>>,
    /// Per-call deadline overriding the engine default.
    pub timeout: Option<Duration>,
    pub backend: Arc<dyn ModelBackend>,
}

impl BackendDescriptor {
    pub fn new(id: &str, tier: CapabilityTier, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            id: id.to_string(),
            tier,
            local: false,
            cost_per_1k_tokens: 0.0,
            tasks: None,
            timeout: None,
            backend,
        }
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    pub fn serving(mut self, tasks: impl IntoIterator<Item = NodeId>) -> Self {
        self.tasks = Some(tasks.into_iter().collect());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn serves(&self, node: &NodeId) -> bool {
        self.tasks.as_ref().map_or(true, |tasks| tasks.contains(node))
    }

    pub fn summary(&self) -> BackendSummary {
        BackendSummary {
            id: self.id.clone(),
            tier: self.tier,
            local: self.local,
            cost_per_1k_tokens: self.cost_per_1k_tokens,
            tasks: self.tasks.as_ref().map(|t| t.iter().copied().collect()),
        }
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("tier", &self.tier)
            .field("local", &self.local)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .field("tasks", &self.tasks)
            .finish()
    }
}

/// Serializable view of a descriptor for status output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSummary {
    pub id: String,
    pub tier: CapabilityTier,
    pub local: bool,
    pub cost_per_1k_tokens: f64,
    pub tasks: Option<Vec<NodeId>>,
}

/// Backends in declaration order. Built at startup, read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct BackendRegistry {
    descriptors: Vec<BackendDescriptor>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend. Declaration order breaks routing ties.
    pub fn register(&mut self, descriptor: BackendDescriptor) -> Result<()> {
        if descriptor.id.trim().is_empty() {
            return Err(Error::Config("backend id must not be empty".to_string()));
        }
        if self.get(&descriptor.id).is_some() {
            return Err(Error::Config(format!(
                "backend {} registered twice",
                descriptor.id
            )));
        }
        if !descriptor.cost_per_1k_tokens.is_finite() || descriptor.cost_per_1k_tokens < 0.0 {
            return Err(Error::Config(format!(
                "backend {} has invalid cost {}",
                descriptor.id, descriptor.cost_per_1k_tokens
            )));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn with(mut self, descriptor: BackendDescriptor) -> Result<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
