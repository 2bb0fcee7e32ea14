//! Process start.
//!
//! [`Engine::initialize`] builds the task graph, the agent registry, the
//! backend registry and the router in one synchronous step. An `Engine` only
//! exists once all of them are complete, so request handling can never see
//! an empty registry.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::BackendRegistry;
use crate::config::Config;
use crate::core::TaskGraph;
use crate::orchestration::{AgentRegistry, ExecutionSettings, Orchestrator, PipelineEvent};
use crate::router::{Router, RoutingPolicy};
use crate::Result;

pub struct Engine {
    orchestrator: Orchestrator,
    default_policy: RoutingPolicy,
}

impl Engine {
    /// Build a ready engine from configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a backend command cannot be resolved,
    /// two backends share an id, or the retry settings are invalid.
    pub fn initialize(config: &Config) -> Result<Self> {
        config.validate()?;
        let mut backends = BackendRegistry::new();
        for backend in config.effective_backends() {
            backends.register(backend.build()?)?;
        }
        let engine = Self::with_backends(backends, config.execution_settings())?
            .with_default_policy(config.default_policy);
        tracing::info!(
            agents = engine.orchestrator.status().registry_size,
            backends = engine.orchestrator.router().registry().len(),
            policy = %engine.default_policy,
            "engine initialized"
        );
        Ok(engine)
    }

    /// Build an engine around an already populated backend registry.
    pub fn with_backends(backends: BackendRegistry, settings: ExecutionSettings) -> Result<Self> {
        let graph = Arc::new(TaskGraph::standard()?);
        let agents = Arc::new(AgentRegistry::standard(&graph)?);
        let router = Router::new(Arc::new(backends));
        Ok(Self {
            orchestrator: Orchestrator::new(graph, agents, router, settings)?,
            default_policy: RoutingPolicy::default(),
        })
    }

    pub fn with_default_policy(mut self, policy: RoutingPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.orchestrator = self.orchestrator.with_events(events);
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn default_policy(&self) -> RoutingPolicy {
        self.default_policy
    }
}
