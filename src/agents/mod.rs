//! The agent contract.
//!
//! Every pipeline node is served by one [`Agent`]. An agent never talks to the
//! execution context directly: it reads the snapshot in its [`AgentMessage`]
//! and returns a value the executor commits after the node succeeds.

mod finalize;
pub mod output;
pub mod parse;
mod research;
mod structure;
mod validators;
mod writer;

pub use finalize::{AudienceAdapterAgent, SummaryAgent};
pub use research::ResearchAgent;
pub use structure::StructureAgent;
pub use validators::ValidatorAgent;
pub use writer::SlideWriterAgent;

use crate::backend::{BackendRequest, ModelBackend};
use crate::core::{AgentMessage, NodeId, Usage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use output::AgentOutput;

/// A validated output plus what producing it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReply {
    pub output: AgentOutput,
    pub usage: Usage,
}

/// Uniform capability implemented by every pipeline agent.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The node this agent serves.
    fn id(&self) -> NodeId;

    /// Reject inputs no backend call could fix.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation`; such failures are never retried.
    fn validate_input(&self, message: &AgentMessage) -> Result<()>;

    /// Build the backend request for this invocation.
    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest>;

    /// Turn raw backend text into a structured output.
    fn parse(&self, text: &str) -> Result<AgentOutput>;

    /// Check the parsed output is complete for this request.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutputInvalid`, which is retryable.
    fn validate_output(&self, message: &AgentMessage, output: &AgentOutput) -> Result<()>;

    /// One backend round trip: prompt, call, parse, validate.
    ///
    /// Input validation is not repeated here; callers that retry validate
    /// once and then invoke as often as needed.
    async fn invoke(&self, message: &AgentMessage, backend: &dyn ModelBackend) -> Result<AgentReply> {
        let request = self.prompt(message)?;
        let reply = backend.generate(request).await?;
        let output = self.parse(&reply.text)?;
        self.validate_output(message, &output)?;
        Ok(AgentReply {
            output,
            usage: reply.usage,
        })
    }

    /// Validate input, then invoke once.
    async fn execute(&self, message: &AgentMessage, backend: &dyn ModelBackend) -> Result<AgentReply> {
        self.validate_input(message)?;
        self.invoke(message, backend).await
    }
}

fn missing_input(node: NodeId, what: &str) -> Error {
    Error::Validation(format!("{} requires {}", node, what))
}

fn invalid_output(node: NodeId, message: impl Into<String>) -> Error {
    Error::OutputInvalid {
        node,
        message: message.into(),
    }
}

fn unexpected_kind(node: NodeId, output: &AgentOutput) -> Error {
    invalid_output(node, format!("unexpected output kind {}", output.kind()))
}

fn to_payload<T: serde::Serialize + ?Sized>(value: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}
