//! Task node data model for the pipeline graph.
//!
//! A node is one agent's slot in the dependency graph. Nodes carry their
//! phase and criticality; the per-request lifecycle of a node is tracked
//! separately in a [`NodeRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a task node, one per agent.
///
/// The set is closed: every agent the engine knows about has a variant here,
/// so dispatch is a map lookup rather than a string match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum NodeId {
    Researcher,
    Structurer,
    SlideWriter,
    FactChecker,
    Accessibility,
    Readability,
    Tone,
    DataViz,
    Media,
    SpeakerNotes,
    ExecutiveSummary,
    AudienceAdapter,
}

impl NodeId {
    /// Every node, in declaration order.
    pub const ALL: [NodeId; 12] = [
        NodeId::Researcher,
        NodeId::Structurer,
        NodeId::SlideWriter,
        NodeId::FactChecker,
        NodeId::Accessibility,
        NodeId::Readability,
        NodeId::Tone,
        NodeId::DataViz,
        NodeId::Media,
        NodeId::SpeakerNotes,
        NodeId::ExecutiveSummary,
        NodeId::AudienceAdapter,
    ];

    /// The quality-assurance validators.
    pub const VALIDATORS: [NodeId; 7] = [
        NodeId::FactChecker,
        NodeId::Accessibility,
        NodeId::Readability,
        NodeId::Tone,
        NodeId::DataViz,
        NodeId::Media,
        NodeId::SpeakerNotes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Researcher => "researcher",
            NodeId::Structurer => "structurer",
            NodeId::SlideWriter => "slide-writer",
            NodeId::FactChecker => "fact-checker",
            NodeId::Accessibility => "accessibility",
            NodeId::Readability => "readability",
            NodeId::Tone => "tone",
            NodeId::DataViz => "data-viz",
            NodeId::Media => "media",
            NodeId::SpeakerNotes => "speaker-notes",
            NodeId::ExecutiveSummary => "executive-summary",
            NodeId::AudienceAdapter => "audience-adapter",
        }
    }

    pub fn is_validator(&self) -> bool {
        Self::VALIDATORS.contains(self)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeId {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NodeId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| crate::Error::Validation(format!("Unknown task node: {}", s)))
    }
}

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Structure,
    Generation,
    Qa,
    Enhancement,
    Finalization,
}

impl Phase {
    pub const ORDERED: [Phase; 6] = [
        Phase::Research,
        Phase::Structure,
        Phase::Generation,
        Phase::Qa,
        Phase::Enhancement,
        Phase::Finalization,
    ];

    /// Whether nodes in this phase may run in parallel.
    pub fn concurrency(&self) -> ConcurrencyClass {
        match self {
            Phase::Qa | Phase::Enhancement => ConcurrencyClass::FanOut,
            _ => ConcurrencyClass::Sequential,
        }
    }

    /// Complexity class the router uses for nodes of this phase.
    pub fn complexity(&self) -> ComplexityClass {
        match self {
            Phase::Research | Phase::Structure | Phase::Finalization => ComplexityClass::Reasoning,
            Phase::Generation | Phase::Qa | Phase::Enhancement => ComplexityClass::Throughput,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Research => write!(f, "research"),
            Phase::Structure => write!(f, "structure"),
            Phase::Generation => write!(f, "generation"),
            Phase::Qa => write!(f, "qa"),
            Phase::Enhancement => write!(f, "enhancement"),
            Phase::Finalization => write!(f, "finalization"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyClass {
    /// Nodes run one at a time in graph order.
    Sequential,
    /// All eligible nodes launch together and meet at a join barrier.
    FanOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityClass {
    Reasoning,
    Throughput,
}

/// Whether a node's failure is fatal to the whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Hard path: failure aborts the request.
    Required,
    /// Soft path: failure degrades the result.
    Optional,
}

/// Static description of a node in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub phase: Phase,
    pub criticality: Criticality,
    /// Finalization nodes only run when the request asks for them.
    pub on_demand: bool,
}

impl NodeSpec {
    pub fn required(id: NodeId, phase: Phase) -> Self {
        Self {
            id,
            phase,
            criticality: Criticality::Required,
            on_demand: false,
        }
    }

    pub fn optional(id: NodeId, phase: Phase) -> Self {
        Self {
            id,
            phase,
            criticality: Criticality::Optional,
            on_demand: false,
        }
    }

    pub fn on_demand(mut self) -> Self {
        self.on_demand = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.criticality == Criticality::Required
    }
}

/// Per-request lifecycle state of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    /// Optional node that did not succeed; the request continues.
    Degraded { reason: String },
    /// Required node that did not succeed; the request aborts.
    Failed { error: String },
    /// Never invoked because a hard dependency or the request itself gave up.
    Aborted { cause: String },
    /// Not requested by the caller.
    Skipped,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Pending | NodeStatus::Running)
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, NodeStatus::Succeeded)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Running => write!(f, "running"),
            NodeStatus::Succeeded => write!(f, "succeeded"),
            NodeStatus::Degraded { reason } => write!(f, "degraded: {}", reason),
            NodeStatus::Failed { error } => write!(f, "failed: {}", error),
            NodeStatus::Aborted { cause } => write!(f, "aborted: {}", cause),
            NodeStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Token and latency counters for one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub latency_ms: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.latency_ms += other.latency_ms;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Execution record of one node within one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node: NodeId,
    pub phase: Phase,
    pub status: NodeStatus,
    /// Total backend calls made, across primary and fallback.
    pub attempts: u32,
    /// Failed attempts on the backend that produced the final answer.
    pub retries: u32,
    pub backend: Option<String>,
    pub fallback_used: bool,
    pub usage: Usage,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    pub fn new(node: NodeId, phase: Phase) -> Self {
        Self {
            node,
            phase,
            status: NodeStatus::Pending,
            attempts: 0,
            retries: 0,
            backend: None,
            fallback_used: false,
            usage: Usage::default(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running and record the start time.
    pub fn start(&mut self) {
        self.status = NodeStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn succeed(&mut self) {
        self.status = NodeStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn degrade(&mut self, reason: &str) {
        self.status = NodeStatus::Degraded {
            reason: reason.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: &str) {
        self.status = NodeStatus::Failed {
            error: error.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn abort(&mut self, cause: &str) {
        self.status = NodeStatus::Aborted {
            cause: cause.to_string(),
        };
    }

    pub fn skip(&mut self) {
        self.status = NodeStatus::Skipped;
    }

    /// Wall-clock duration in milliseconds, if the node ran.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
