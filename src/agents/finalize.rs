//! On-demand finalization agents.
//!
//! Both run after QA and read the written deck. Their soft inputs (fact-check
//! findings, the executive summary) may be absent from the snapshot.

use super::output::{AdaptedDeck, AgentOutput, ExecutiveSummary};
use super::parse::parse_json;
use super::{invalid_output, missing_input, to_payload, unexpected_kind, Agent};
use crate::backend::BackendRequest;
use crate::core::{AgentMessage, NodeId};
use crate::error::Result;
use serde_json::json;

const SUMMARY_INSTRUCTIONS: &str = "You are writing an executive summary of a finished deck for \
busy decision makers. Use the fact-check findings, if any, to avoid repeating doubtful claims. \
Answer as {\"summary\", \"highlights\": [..]}.";

const ADAPT_INSTRUCTIONS: &str = "You are adapting a finished deck for a different audience. \
Keep the slide count and order; rewrite titles, content and notes for target_audience. \
Answer as {\"audience\", \"slides\": [..]} using the same slide shape as the input.";

#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryAgent;

impl Agent for SummaryAgent {
    fn id(&self) -> NodeId {
        NodeId::ExecutiveSummary
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        match message.context.deck() {
            Some(deck) if !deck.slides.is_empty() => Ok(()),
            _ => Err(missing_input(self.id(), "a written deck")),
        }
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let deck = message
            .context
            .deck()
            .ok_or_else(|| missing_input(self.id(), "a written deck"))?;
        let fact_check = message.context.findings(&NodeId::FactChecker);
        Ok(BackendRequest::new(
            self.id(),
            SUMMARY_INSTRUCTIONS,
            json!({
                "topic": message.request.topic,
                "audience": message.request.audience,
                "deck": to_payload(deck)?,
                "fact_check": fact_check.map(to_payload).transpose()?,
            }),
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        parse_json::<ExecutiveSummary>(self.id(), text).map(AgentOutput::Summary)
    }

    fn validate_output(&self, _message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Summary(summary) = output else {
            return Err(unexpected_kind(self.id(), output));
        };
        if summary.summary.trim().is_empty() {
            return Err(invalid_output(self.id(), "summary is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AudienceAdapterAgent;

impl Agent for AudienceAdapterAgent {
    fn id(&self) -> NodeId {
        NodeId::AudienceAdapter
    }

    fn validate_input(&self, message: &AgentMessage) -> Result<()> {
        let target = message.request.flags.adapt_audience.as_deref().unwrap_or_default();
        if target.trim().is_empty() {
            return Err(missing_input(self.id(), "a target audience"));
        }
        match message.context.deck() {
            Some(deck) if !deck.slides.is_empty() => Ok(()),
            _ => Err(missing_input(self.id(), "a written deck")),
        }
    }

    fn prompt(&self, message: &AgentMessage) -> Result<BackendRequest> {
        let deck = message
            .context
            .deck()
            .ok_or_else(|| missing_input(self.id(), "a written deck"))?;
        let summary = message.context.summary();
        Ok(BackendRequest::new(
            self.id(),
            ADAPT_INSTRUCTIONS,
            json!({
                "original_audience": message.request.audience,
                "target_audience": message.request.flags.adapt_audience,
                "tone": message.request.tone,
                "deck": to_payload(deck)?,
                "summary": summary.map(to_payload).transpose()?,
            }),
        ))
    }

    fn parse(&self, text: &str) -> Result<AgentOutput> {
        parse_json::<AdaptedDeck>(self.id(), text).map(AgentOutput::Adapted)
    }

    fn validate_output(&self, message: &AgentMessage, output: &AgentOutput) -> Result<()> {
        let AgentOutput::Adapted(adapted) = output else {
            return Err(unexpected_kind(self.id(), output));
        };
        let expected = message.context.deck().map_or(0, |d| d.slides.len());
        if adapted.slides.len() != expected {
            return Err(invalid_output(
                self.id(),
                format!(
                    "adapted deck has {} slides, expected {}",
                    adapted.slides.len(),
                    expected
                ),
            ));
        }
        if adapted.audience.trim().is_empty() {
            return Err(invalid_output(self.id(), "adapted deck names no audience"));
        }
        Ok(())
    }
}
