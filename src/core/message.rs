//! Values passed between the executor and agents.

use crate::agents::output::AgentOutput;
use crate::context::ContextSnapshot;
use crate::core::node::{NodeId, Usage};
use crate::error::Result;
use crate::request::{DeckRequest, RequestId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Input for one agent invocation: the caller's brief plus a read-only view
/// of everything upstream nodes produced.
#[derive(Debug, Clone)]
pub struct AgentMessage {
    pub request_id: RequestId,
    pub node: NodeId,
    pub request: Arc<DeckRequest>,
    pub context: ContextSnapshot,
}

impl AgentMessage {
    pub fn new(
        request_id: RequestId,
        node: NodeId,
        request: Arc<DeckRequest>,
        context: ContextSnapshot,
    ) -> Self {
        Self {
            request_id,
            node,
            request,
            context,
        }
    }
}

/// The single logical response for one node in one request.
///
/// Retries do not create new responses; they only raise `attempts`.
#[derive(Debug)]
pub struct AgentResponse {
    pub node: NodeId,
    pub outcome: Result<AgentOutput>,
    pub usage: Usage,
    pub attempts: u32,
    pub retries: u32,
    /// Backend that produced the outcome, or the last one tried.
    pub backend: Option<String>,
    pub fallback_used: bool,
    /// Calls made per backend id.
    pub calls: BTreeMap<String, u32>,
}

impl AgentResponse {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            outcome: Err(crate::Error::Cancelled),
            usage: Usage::default(),
            attempts: 0,
            retries: 0,
            backend: None,
            fallback_used: false,
            calls: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Record one backend call.
    pub fn count_call(&mut self, backend: &str) {
        self.attempts += 1;
        *self.calls.entry(backend.to_string()).or_insert(0) += 1;
    }
}
