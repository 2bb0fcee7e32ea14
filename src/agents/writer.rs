use super::output::{AgentOutput, SlideDeck};
use super::parse::parse_json;
use super::{invalid_output, missing_input, to_payload, unexpected_kind, Agent};
use crate::backend::BackendRequest;
use crate::core::{AgentMessage, NodeId};
use crate::error::Result;
use serde_json::json;

const INSTRUCTIONS: &str = "You are a slide writer. Write one slide per outline section, in the \
same order, in the requested tone. Each slide has a title, one or more content blocks \
(text, bullets, chart with caption, or image with alt_text) and optional speaker notes. \
Answer as {\"slides\": [{\"title\", \"blocks\": [{\"type\", ..}], \"notes\"}]}.";

/// Writes the content of every slide from the outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideWriterAgent;

impl Agent for SlideWriterAgent {
    fn id(&self) -> NodeId {
        NodeId::SlideWriter
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        message.request.validate()?;
        if message.context.research().is_none() {
            return Err(missing_input(self.id(), "research notes"));
        }
        match message.context.outline() {
            Some(outline) if !outline.sections.is_empty() => Ok(()),
            Some(_) => Err(missing_input(self.id(), "a non-empty outline")),
            None => Err(missing_input(self.id(), "an outline")),
        }
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let request = &message.request;
        let outline = message
            .context
            .outline()
            .ok_or_else(|| missing_input(self.id(), "an outline"))?;
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
                "tone": request.tone,
                "theme": request.theme,
                "outline": to_payload(outline)?,
                "research": to_payload(research)?,
            }),
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        parse_json::<SlideDeck>(self.id(), text).map(AgentOutput::Slides)
    }

    fn validate_output(&self, message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Slides(deck) = output else {
            return Err(unexpected_kind(self.id(), output));
        };
        let expected = message
            .context
            .outline()
            .map_or(message.request.slide_count, |o| o.sections.len());
        if deck.slides.len() != expected {
            return Err(invalid_output(
                self.id(),
                format!("deck has {} slides, expected {}", deck.slides.len(), expected),
            ));
        }
        for (index, slide) in deck.slides.iter().enumerate() {
            if slide.title.trim().is_empty() {
                return Err(invalid_output(self.id(), format!("slide {} has no title", index)));
            }
            if slide.blocks.iter().all(|b| b.is_empty()) {
                return Err(invalid_output(
                    self.id(),
                    format!("slide {} has no content", index),
                ));
            }
        }
        Ok(())
    }
}
