//! Caller-supplied presentation brief.

use crate::error::{Error, Result};
use crate::router::RoutingPolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on slides per deck.
pub const MAX_SLIDES: usize = 60;

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    #[serde(default)]
    pub live_data: bool,
    #[serde(default)]
    pub executive_summary: bool,
    /// Target audience for the audience-adaptation pass.
    #[serde(default)]
    pub adapt_audience: Option<String>,
}

/// The brief a deck is generated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckRequest {
    pub topic: String,
    pub audience: String,
    pub tone: String,
    pub slide_count: usize,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub policy: RoutingPolicy,
    #[serde(default)]
    pub flags: FeatureFlags,
    /// Return partial output instead of an error when the request is cancelled.
    #[serde(default)]
    pub best_effort: bool,
}

fn default_theme() -> String {
    "default".to_string()
}

impl DeckRequest {
    pub fn new(topic: &str, audience: &str, tone: &str, slide_count: usize) -> Self {
        Self {
            topic: topic.to_string(),
            audience: audience.to_string(),
            tone: tone.to_string(),
            slide_count,
            theme: default_theme(),
            duration_minutes: None,
            sources: Vec::new(),
            policy: RoutingPolicy::default(),
            flags: FeatureFlags::default(),
            best_effort: false,
        }
    }

    /// Parse a JSON brief. A brief without a `policy` field gets `default_policy`.
    pub fn from_json(text: &str, default_policy: RoutingPolicy) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let names_policy = value.get("policy").is_some();
        let mut request: Self = serde_json::from_value(value)?;
        if !names_policy {
            request.policy = default_policy;
        }
        Ok(request)
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_flags(mut self, flags: FeatureFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Reject briefs no agent could work from.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(Error::Validation("topic must not be empty".to_string()));
        }
        if self.audience.trim().is_empty() {
            return Err(Error::Validation("audience must not be empty".to_string()));
        }
        if self.tone.trim().is_empty() {
            return Err(Error::Validation("tone must not be empty".to_string()));
        }
        if self.slide_count == 0 || self.slide_count > MAX_SLIDES {
            return Err(Error::Validation(format!(
                "slide_count must be between 1 and {}, got {}",
                MAX_SLIDES, self.slide_count
            )));
        }
        if self.duration_minutes == Some(0) {
            return Err(Error::Validation("duration_minutes must be positive".to_string()));
        }
        if let Some(target) = &self.flags.adapt_audience {
            if target.trim().is_empty() {
                return Err(Error::Validation(
                    "adapt_audience target must not be empty".to_string(),
                ));
            }
        }
        if let Some(source) = self.sources.iter().find(|s| s.trim().is_empty()) {
            return Err(Error::Validation(format!("empty source entry: {:?}", source)));
        }
        Ok(())
    }
}
