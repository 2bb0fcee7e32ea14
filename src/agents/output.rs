//! Structured values produced by agents.
//!
//! Each pipeline stage contributes one [`AgentOutput`] variant. The payload
//! types double as the wire schema backends are asked to answer in.

use crate::quality::Finding;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistic {
    pub label: String,
    pub value: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchNotes {
    pub summary: String,
    pub key_points: Vec<String>,
    #[serde(default)]
    pub statistics: Vec<Statistic>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    pub sections: Vec<OutlineSection>,
}

/// One block of slide content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ContentBlock {
    Text { text: String },
    Bullets { items: Vec<String> },
    Chart { chart: String, caption: String },
    Image { prompt: String, alt_text: String },
}

impl ContentBlock {
    pub fn is_empty(&self) -> bool {
        match self {
            ContentBlock::Text { text } => text.trim().is_empty(),
            ContentBlock::Bullets { items } => items.iter().all(|i| i.trim().is_empty()),
            ContentBlock::Chart { chart, .. } => chart.trim().is_empty(),
            ContentBlock::Image { prompt, .. } => prompt.trim().is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub title: String,
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideDeck {
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub summary: String,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedDeck {
    pub audience: String,
    pub slides: Vec<Slide>,
}

/// A validated contribution of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AgentOutput {
    Research(ResearchNotes),
    Outline(Outline),
    Slides(SlideDeck),
    Findings(Vec<Finding>),
    Summary(ExecutiveSummary),
    Adapted(AdaptedDeck),
}

impl AgentOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentOutput::Research(_) => "research",
            AgentOutput::Outline(_) => "outline",
            AgentOutput::Slides(_) => "slides",
            AgentOutput::Findings(_) => "findings",
            AgentOutput::Summary(_) => "summary",
            AgentOutput::Adapted(_) => "adapted",
        }
    }
}
