//! Orchestration layer for deck generation.
//!
//! This module provides the pieces that turn a task graph into a finished
//! request: the agent registry, per-node retry and fallback, the concurrent
//! QA fan-out, and the DAG executor that ties them together.

mod attempt;
mod executor;
mod fanout;
mod registry;

pub use attempt::{AttemptRunner, RetryPolicy, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS};
pub use executor::{
    DeckResult, Degradation, EngineStatus, ExecutionSettings, Orchestrator, PipelineEvent,
    PipelineOutcome, PipelineRun, RunMetadata,
};
pub use fanout::{run_fan_out, FanOutJob};
pub use registry::{AgentRegistry, AgentRegistryBuilder};
