use super::output::AgentOutput;
use super::parse::parse_json;
use super::{invalid_output, missing_input, to_payload, unexpected_kind, Agent};
use crate::backend::BackendRequest;
use crate::core::{AgentMessage, NodeId};
use crate::error::{Error, Result};
use crate::quality::{Finding, Severity};
use serde::Deserialize;
use serde_json::json;

const ANSWER_SHAPE: &str = "Answer as {\"findings\": [{\"severity\": \"info\"|\"warning\"|\"high\", \
\"message\", \"slide\": zero-based index or null}]}. Return an empty list when nothing needs fixing.";

#[derive(Debug, Deserialize)]
struct RawFindings {
    findings: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    severity: Severity,
    message: String,
    #[serde(default)]
    slide: Option<usize>,
}

/// One quality-assurance check over the finished deck.
///
/// All seven validators share this implementation; they differ only in what
/// they ask the backend to look for and which context they send with it.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorAgent {
    id: NodeId,
}

impl ValidatorAgent {
    /// # Errors
    ///
    /// Returns an error if `id` is not one of the QA validators.
    pub fn new(id: NodeId) -> Result<Self> {
        if !id.is_validator() {
            return Err(Error::Config(format!("{} is not a QA validator", id)));
        }
        Ok(Self { id })
    }

    /// Every validator, in declaration order.
    pub fn all() -> Vec<Self> {
        NodeId::VALIDATORS.iter().map(|&id| Self { id }).collect()
    }

    fn focus(&self) -> &'static str {
        match self.id {
            NodeId::FactChecker => {
                "You are a fact checker. Flag claims or statistics that are unsupported by the research or lack a source."
            }
            NodeId::Accessibility => {
                "You are an accessibility reviewer. Flag images without alt text, colour-only meaning and hard-to-read content."
            }
            NodeId::Readability => {
                "You are an editor. Flag slides that are too dense, use jargon, or have sentences that are too long."
            }
            NodeId::Tone => "You are a tone reviewer. Flag wording that does not match the requested tone.",
            NodeId::DataViz => {
                "You are a data visualisation reviewer. Flag charts that are missing captions or would mislead."
            }
            NodeId::Media => {
                "You are a media reviewer. Flag slides that would benefit from an image or chart, or whose visuals do not fit."
            }
            NodeId::SpeakerNotes => {
                "You are a presentation coach. Flag slides whose speaker notes are missing or do not support the slide."
            }
            _ => "Review the deck.",
        }
    }
}

impl Agent for ValidatorAgent {
    fn id(&self) -> NodeId {
        self.id
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        match message.context.deck() {
            Some(deck) if !deck.slides.is_empty() => Ok(()),
            _ => Err(missing_input(self.id, "a written deck")),
        }
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let deck = message
            .context
            .deck()
            .ok_or_else(|| missing_input(self.id, "a written deck"))?;
        let mut payload = json!({
            "topic": message.request.topic,
            "audience": message.request.audience,
            "tone": message.request.tone,
            "deck": to_payload(deck)?,
        });
        if self.id == NodeId::FactChecker {
            if let Some(research) = message.context.research() {
                payload["research"] = to_payload(research)?;
            }
        }
        Ok(BackendRequest::new(
            self.id,
            &format!("{} {}", self.focus(), ANSWER_SHAPE),
            payload,
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        let raw = parse_json::<RawFindings>(self.id, text)?;
        let findings = raw
            .findings
            .into_iter()
            .map(|f| Finding {
                severity: f.severity,
                source: self.id,
                message: f.message,
                slide: f.slide,
                meta: false,
            })
            .collect();
        Ok(AgentOutput::Findings(findings))
    }

    fn validate_output(&self, message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Findings(findings) = output else {
            return Err(unexpected_kind(self.id, output));
        };
        let slides = message.context.deck().map_or(0, |d| d.slides.len());
        for finding in findings {
            if finding.message.trim().is_empty() {
                return Err(invalid_output(self.id, "finding has no message"));
            }
            if let Some(slide) = finding.slide {
                if slide >= slides {
                    return Err(invalid_output(
                        self.id,
                        format!("finding refers to slide {} of {}", slide, slides),
                    ));
                }
            }
        }
        Ok(())
    }
}
