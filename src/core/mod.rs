//! Core domain models for deck generation.
//!
//! This module contains the fundamental data structures used throughout
//! the engine: task nodes, the dependency graph, and agent messages.

pub mod graph;
pub mod message;
pub mod node;

pub use graph::{DependencyKind, TaskGraph};
pub use message::{AgentMessage, AgentResponse};
pub use node::{
    ComplexityClass, ConcurrencyClass, Criticality, NodeId, NodeRecord, NodeSpec, NodeStatus,
    Phase, Usage,
};
