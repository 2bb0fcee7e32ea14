use super::output::{AgentOutput, ResearchNotes};
use super::parse::parse_json;
use super::{invalid_output, unexpected_kind, Agent};
use crate::backend::BackendRequest;
use crate::core::{AgentMessage, NodeId};
use crate::error::Result;
use serde_json::json;

const INSTRUCTIONS: &str = "You are a research analyst preparing material for a presentation. \
Gather the key points, notable statistics with their sources, and citations for the topic, \
pitched at the given audience. Answer as {\"summary\", \"key_points\": [..], \
\"statistics\": [{\"label\", \"value\", \"source\"}], \"citations\": [{\"title\", \"url\"}]}.";

/// Collects the facts every later stage builds on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResearchAgent;

impl Agent for ResearchAgent {
    fn id(&self) -> NodeId {
        NodeId::Researcher
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        message.request.validate()
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let request = &message.request;
        Ok(BackendRequest::new(
            self.id(),
            INSTRUCTIONS,
            json!({
                "topic": request.topic,
                "audience": request.audience,
                "sources": request.sources,
                "live_data": request.flags.live_data,
            }),
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        parse_json::<ResearchNotes>(self.id(), text).map(AgentOutput::Research)
    }

    fn validate_output(&self, _message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Research(notes) = output else {
            return Err(unexpected_kind(self.id(), output));
        };
        if notes.key_points.iter().all(|p| p.trim().is_empty()) {
            return Err(invalid_output(self.id(), "research has no key points"));
        }
        Ok(())
    }
}
