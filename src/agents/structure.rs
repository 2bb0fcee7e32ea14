use super::output::{AgentOutput, Outline};
use super::parse::parse_json;
use super::{invalid_output, missing_input, to_payload, unexpected_kind, Agent};
use crate::backend::BackendRequest;
use crate::core::{AgentMessage, NodeId};
use crate::error::Result;
use serde_json::json;

const INSTRUCTIONS: &str = "You are a presentation architect. Turn the research into an outline \
with exactly slide_count sections, in presentation order, each with a short title and the \
purpose of the slide. Answer as {\"title\", \"sections\": [{\"title\", \"purpose\"}]}.";

/// Turns research notes into a slide-by-slide outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureAgent;

impl Agent for StructureAgent {
    fn id(&self) -> NodeId {
        NodeId::Structurer
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        message.request.validate()?;
        if message.context.research().is_none() {
            return Err(missing_input(self.id(), "research notes"));
        }
        Ok(())
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let request = &message.request;
        let research = message
            .context
            .research()
            .ok_or_else(|| missing_input(self.id(), "research notes"))?;
        Ok(BackendRequest::new(
            self.id(),
            INSTRUCTIONS,
            json!({
                "topic": request.topic,
                "audience": request.audience,
                "slide_count": request.slide_count,
                "duration_minutes": request.duration_minutes,
                "research": to_payload(research)?,
            }),
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        parse_json::<Outline>(self.id(), text).map(AgentOutput::Outline)
    }

    fn validate_output(&self, message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Outline(outline) = output else {
            return Err(unexpected_kind(self.id(), output));
        };
        let expected = message.request.slide_count;
        if outline.sections.len() != expected {
            return Err(invalid_output(
                self.id(),
                format!(
                    "outline has {} sections, expected {}",
                    outline.sections.len(),
                    expected
                ),
            ));
        }
        if let Some(index) = outline
            .sections
            .iter()
            .position(|s| s.title.trim().is_empty())
        {
            return Err(invalid_output(
                self.id(),
                format!("section {} has no title", index),
            ));
        }
        Ok(())
    }
}
