//! Deterministic local backend.
//!
//! `OfflineBackend` answers every node from the structured payload alone, with
//! no model behind it. It is used for dry runs and as the backend when no
//! model is configured; the same inputs always produce the same answer.

use super::{BackendReply, BackendRequest, ModelBackend};
use crate::core::{NodeId, Usage};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Bullets per slide above which readability flags density.
const DENSE_SLIDE_BULLETS: usize = 6;

#[derive(Debug, Clone, Default)]
pub struct OfflineBackend;

impl OfflineBackend {
    pub fn new() -> Self {
        Self
    }

    /// Produce the JSON answer for `request`.
    pub fn answer(&self, request: &BackendRequest) -> Result<Value> {
        let p = &request.payload;
        let answer = match request.task {
            NodeId::Researcher => research(p),
            NodeId::Structurer => outline(p),
            NodeId::SlideWriter => slides(p),
            NodeId::ExecutiveSummary => summary(p),
            NodeId::AudienceAdapter => adapt(p),
            validator => json!({ "findings": findings(validator, p) }),
        };
        if answer.is_null() {
            return Err(Error::Backend {
                backend: "offline".to_string(),
                message: format!("payload for {} is missing required fields", request.task),
            });
        }
        Ok(answer)
    }
}

#[async_trait]
impl ModelBackend for OfflineBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply> {
        let answer = self.answer(&request)?;
        let text = answer.to_string();
        let usage = Usage {
            prompt_tokens: estimate_tokens(&request.render()),
            completion_tokens: estimate_tokens(&text),
            latency_ms: 0,
        };
        Ok(BackendReply { text, usage })
    }
}

/// Rough token estimate: one token per four characters.
fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

fn text<'a>(payload: &'a Value, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn research(p: &Value) -> Value {
    let topic = text(p, "topic");
    if topic.is_empty() {
        return Value::Null;
    }
    let audience = text(p, "audience");
    let citations: Vec<Value> = p
        .get("sources")
        .and_then(Value::as_array)
        .map(|sources| {
            sources
                .iter()
                .filter_map(Value::as_str)
                .map(|s| json!({ "title": s, "url": s.starts_with("http").then_some(s) }))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "summary": format!("{} explained for {}.", topic, audience),
        "key_points": [
            format!("Why {} matters now", topic),
            format!("How {} works in practice", topic),
            format!("What {} means for {}", topic, audience),
        ],
        "statistics": [],
        "citations": citations,
    })
}

fn outline(p: &Value) -> Value {
    let topic = text(p, "topic");
    let Some(count) = p.get("slide_count").and_then(Value::as_u64) else {
        return Value::Null;
    };
    let points: Vec<&str> = p
        .pointer("/research/key_points")
        .and_then(Value::as_array)
        .map(|points| points.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let sections: Vec<Value> = (0..count as usize)
        .map(|i| {
            let title = if i == 0 {
                format!("Introduction to {}", topic)
            } else if i + 1 == count as usize && count > 1 {
                "Conclusion".to_string()
            } else if let Some(point) = points.get((i - 1) % points.len().max(1)) {
                point.to_string()
            } else {
                format!("{}: part {}", topic, i)
            };
            json!({ "title": title, "purpose": format!("Section {} of {}", i + 1, count) })
        })
        .collect();

    json!({ "title": topic, "sections": sections })
}

fn slides(p: &Value) -> Value {
    let Some(sections) = p.pointer("/outline/sections").and_then(Value::as_array) else {
        return Value::Null;
    };
    let slides: Vec<Value> = sections
        .iter()
        .map(|section| {
            let title = text(section, "title");
            let purpose = text(section, "purpose");
            json!({
                "title": title,
                "blocks": [
                    { "type": "bullets", "items": [title, purpose] }
                ],
                "notes": format!("Talk through {}.", title),
            })
        })
        .collect();
    json!({ "slides": slides })
}

fn deck_slides(p: &Value) -> Vec<Value> {
    p.pointer("/deck/slides")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn findings(validator: NodeId, p: &Value) -> Vec<Value> {
    let slides = deck_slides(p);
    let mut findings = Vec::new();

    for (index, slide) in slides.iter().enumerate() {
        let blocks = slide
            .get("blocks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        match validator {
            NodeId::Readability => {
                let bullets: usize = blocks
                    .iter()
                    .filter_map(|b| b.get("items").and_then(Value::as_array))
                    .map(Vec::len)
                    .sum();
                if bullets > DENSE_SLIDE_BULLETS {
                    findings.push(json!({
                        "severity": "warning",
                        "message": format!("{} bullets on one slide", bullets),
                        "slide": index,
                    }));
                }
            }
            NodeId::Accessibility => {
                for block in &blocks {
                    if block.get("type").and_then(Value::as_str) == Some("image")
                        && text(block, "alt_text").trim().is_empty()
                    {
                        findings.push(json!({
                            "severity": "high",
                            "message": "image without alt text",
                            "slide": index,
                        }));
                    }
                }
            }
            NodeId::SpeakerNotes => {
                let notes = slide.get("notes").and_then(Value::as_str).unwrap_or_default();
                if notes.trim().is_empty() {
                    findings.push(json!({
                        "severity": "info",
                        "message": "slide has no speaker notes",
                        "slide": index,
                    }));
                }
            }
            NodeId::DataViz => {
                for block in &blocks {
                    if block.get("type").and_then(Value::as_str) == Some("chart")
                        && text(block, "caption").trim().is_empty()
                    {
                        findings.push(json!({
                            "severity": "warning",
                            "message": "chart without caption",
                            "slide": index,
                        }));
                    }
                }
            }
            _ => {}
        }
    }

    match validator {
        NodeId::FactChecker => {
            let unsourced = p
                .pointer("/research/statistics")
                .and_then(Value::as_array)
                .map(|stats| stats.iter().filter(|s| s.get("source").map_or(true, Value::is_null)).count())
                .unwrap_or(0);
            if unsourced > 0 {
                findings.push(json!({
                    "severity": "warning",
                    "message": format!("{} statistics without a source", unsourced),
                }));
            }
        }
        NodeId::Media => {
            let has_visual = slides.iter().any(|slide| {
                slide
                    .get("blocks")
                    .and_then(Value::as_array)
                    .map(|blocks| {
                        blocks.iter().any(|b| {
                            matches!(b.get("type").and_then(Value::as_str), Some("image" | "chart"))
                        })
                    })
                    .unwrap_or(false)
            });
            if !slides.is_empty() && !has_visual {
                findings.push(json!({
                    "severity": "info",
                    "message": "deck has no images or charts",
                }));
            }
        }
        NodeId::Tone => {
            let tone = text(p, "tone");
            if tone.is_empty() {
                findings.push(json!({ "severity": "info", "message": "no target tone given" }));
            }
        }
        _ => {}
    }

    findings
}

fn summary(p: &Value) -> Value {
    let slides = deck_slides(p);
    if slides.is_empty() {
        return Value::Null;
    }
    let highlights: Vec<&str> = slides
        .iter()
        .filter_map(|s| s.get("title").and_then(Value::as_str))
        .collect();
    json!({
        "summary": format!("{} in {} slides for {}.", text(p, "topic"), slides.len(), text(p, "audience")),
        "highlights": highlights,
    })
}

fn adapt(p: &Value) -> Value {
    let target = text(p, "target_audience");
    let slides = deck_slides(p);
    if target.is_empty() || slides.is_empty() {
        return Value::Null;
    }
    json!({ "audience": target, "slides": slides })
}
