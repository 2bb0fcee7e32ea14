//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scripted backend that fails, stalls or answers in prose on demand
//! - Engines wired to scripted backends with fast retry settings
//! - Standard briefs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use deckflow::backend::{
    BackendDescriptor, BackendRegistry, BackendReply, BackendRequest, CapabilityTier,
    ModelBackend, OfflineBackend,
};
use deckflow::core::NodeId;
use deckflow::orchestration::{ExecutionSettings, RetryPolicy};
use deckflow::{DeckRequest, Engine, Error, FeatureFlags, Result, RoutingPolicy};

/// How a scripted backend treats one node.
#[derive(Debug, Clone, Default)]
struct Script {
    fail_times: u32,
    always_fail: bool,
    malformed_times: u32,
    delay: Option<Duration>,
}

/// Wraps [`OfflineBackend`] and misbehaves for selected nodes.
pub struct ScriptedBackend {
    id: String,
    inner: OfflineBackend,
    scripts: HashMap<NodeId, Script>,
    calls: Mutex<Vec<NodeId>>,
    answered: Mutex<Vec<NodeId>>,
}

impl ScriptedBackend {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inner: OfflineBackend::new(),
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` calls for `node` with a backend error.
    pub fn fail_times(mut self, node: NodeId, times: u32) -> Self {
        self.scripts.entry(node).or_default().fail_times = times;
        self
    }

    pub fn always_fail(mut self, node: NodeId) -> Self {
        self.scripts.entry(node).or_default().always_fail = true;
        self
    }

    /// Answer the first `times` calls for `node` with prose instead of JSON.
    pub fn malformed(mut self, node: NodeId, times: u32) -> Self {
        self.scripts.entry(node).or_default().malformed_times = times;
        self
    }

    /// Sleep before every answer for `node`.
    pub fn delay(mut self, node: NodeId, delay: Duration) -> Self {
        self.scripts.entry(node).or_default().delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every call received, in arrival order.
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, node: NodeId) -> usize {
        self.calls().iter().filter(|n| **n == node).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls for `node` that got past their delay and produced an answer.
    pub fn answered_for(&self, node: NodeId) -> usize {
        self.answered
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == node)
            .count()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, request: BackendRequest) -> Result<BackendReply> {
        let node = request.task;
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(node);
            calls.iter().filter(|n| **n == node).count() as u32
        };
        let script = self.scripts.get(&node).cloned().unwrap_or_default();

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }
        self.answered.lock().unwrap().push(node);
        if script.always_fail || call <= script.fail_times {
            return Err(Error::Backend {
                backend: self.id.clone(),
                message: format!("scripted failure #{} for {}", call, node),
            });
        }
        if call <= script.fail_times + script.malformed_times {
            return Ok(BackendReply::new(
                "Sorry, I can't produce that in JSON right now.".to_string(),
            ));
        }
        self.inner.generate(request).await
    }
}

/// Retry settings fast enough for tests: three attempts, 1 ms backoff.
pub fn fast_settings() -> ExecutionSettings {
    ExecutionSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_ms: 1,
            backoff_multiplier: 2.0,
        },
        call_timeout: Duration::from_millis(200),
        request_deadline: None,
    }
}

pub fn descriptor(id: &str, tier: CapabilityTier, backend: Arc<ScriptedBackend>) -> BackendDescriptor {
    BackendDescriptor::new(id, tier, backend)
}

pub fn engine(descriptors: Vec<BackendDescriptor>) -> Engine {
    engine_with(descriptors, fast_settings())
}

pub fn engine_with(descriptors: Vec<BackendDescriptor>, settings: ExecutionSettings) -> Engine {
    let mut registry = BackendRegistry::new();
    for descriptor in descriptors {
        registry.register(descriptor).expect("Failed to register backend");
    }
    Engine::with_backends(registry, settings).expect("Failed to build engine")
}

/// A valid brief with `slides` slides.
pub fn brief(slides: usize, policy: RoutingPolicy) -> DeckRequest {
    DeckRequest::new(
        "Adopting Rust in embedded firmware",
        "engineering managers",
        "pragmatic",
        slides,
    )
    .with_policy(policy)
}

/// A brief that also asks for the executive summary and an adapted deck.
pub fn brief_with_finalization(slides: usize, policy: RoutingPolicy) -> DeckRequest {
    brief(slides, policy).with_flags(FeatureFlags {
        executive_summary: true,
        adapt_audience: Some("board members".to_string()),
        ..Default::default()
    })
}

/// Nodes that run for a plain brief, in declaration order.
pub fn default_nodes() -> Vec<NodeId> {
    NodeId::ALL
        .iter()
        .copied()
        .filter(|n| !matches!(n, NodeId::ExecutiveSummary | NodeId::AudienceAdapter))
        .collect()
}
