//! DAG executor.
//!
//! The [`Orchestrator`] drives the task graph to completion for one request.
//! Phases run in order; sequential phases run their nodes one at a time in
//! declaration order, concurrent phases launch every eligible node at once and
//! wait at a join barrier. The executor is the only writer of the execution
//! context and commits each node's output after the node succeeds.

use super::attempt::{AttemptRunner, RetryPolicy, DEFAULT_CALL_TIMEOUT_SECS};
use super::fanout::{run_fan_out, FanOutJob};
use super::registry::AgentRegistry;
use crate::agents::output::{AdaptedDeck, AgentOutput, ExecutiveSummary, Outline, ResearchNotes, Slide};
use crate::backend::BackendSummary;
use crate::context::ExecutionContext;
use crate::core::{
    AgentMessage, AgentResponse, DependencyKind, NodeId, NodeRecord, NodeSpec, NodeStatus, Phase,
    TaskGraph, Usage,
};
use crate::error::{Error, Result};
use crate::quality::QualityReport;
use crate::request::{DeckRequest, RequestId};
use crate::router::{PolicyRoutes, RoutePlan, Router, RoutingPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Execution knobs shared by every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    pub retry: RetryPolicy,
    /// Deadline for one backend call unless the backend sets its own.
    pub call_timeout: Duration,
    /// Deadline for a whole request; expiry cancels it.
    pub request_deadline: Option<Duration>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            request_deadline: None,
        }
    }
}

/// Events emitted while a request runs.
///
/// These let a caller follow progress without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// A node was handed to its agent.
    NodeStarted {
        request_id: RequestId,
        node: NodeId,
        backend: String,
    },
    /// A node reached a terminal state.
    NodeFinished {
        request_id: RequestId,
        node: NodeId,
        status: NodeStatus,
    },
    /// Every node of a phase is terminal.
    PhaseComplete { request_id: RequestId, phase: Phase },
    /// The request is over, successfully or not.
    PipelineFinished { request_id: RequestId },
}

/// A node that did not contribute to the result, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub node: NodeId,
    pub status: NodeStatus,
}

/// The assembled deck handed to export collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckResult {
    pub title: String,
    pub slides: Vec<Slide>,
    pub research: Option<ResearchNotes>,
    pub outline: Option<Outline>,
    pub executive_summary: Option<ExecutiveSummary>,
    pub adapted: Option<AdaptedDeck>,
    /// Nodes that should have contributed but have no output.
    pub missing: Vec<NodeId>,
}

/// Per-request timing and usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub policy: RoutingPolicy,
    /// One record per graph node, in declaration order.
    pub nodes: Vec<NodeRecord>,
    /// Nodes in the order they were started.
    pub start_order: Vec<NodeId>,
    /// Calls made per backend id.
    pub backend_calls: BTreeMap<String, u32>,
    pub total_usage: Usage,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunMetadata {
    pub fn record(&self, node: NodeId) -> Option<&NodeRecord> {
        self.nodes.iter().find(|r| r.node == node)
    }
}

/// What the caller gets back from a finished request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub request_id: RequestId,
    pub result: DeckResult,
    pub quality_report: QualityReport,
    pub metadata: RunMetadata,
    pub degraded: Vec<Degradation>,
    /// Set when the request was cancelled and this is best-effort output.
    pub partial: bool,
}

/// Raw state of one request after the executor stops, successful or not.
#[derive(Debug)]
pub struct PipelineRun {
    pub request_id: RequestId,
    pub policy: RoutingPolicy,
    pub best_effort: bool,
    pub records: Vec<NodeRecord>,
    pub start_order: Vec<NodeId>,
    pub context: ExecutionContext,
    pub quality_report: QualityReport,
    pub backend_calls: BTreeMap<String, u32>,
    /// The fatal error, if the request did not complete.
    pub error: Option<Error>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    fn new(graph: &TaskGraph, request: &DeckRequest) -> Self {
        let records = graph
            .nodes()
            .iter()
            .filter_map(|id| graph.spec(id))
            .map(|spec| NodeRecord::new(spec.id, spec.phase))
            .collect();
        Self {
            request_id: RequestId::new(),
            policy: request.policy,
            best_effort: request.best_effort,
            records,
            start_order: Vec::new(),
            context: ExecutionContext::new(),
            quality_report: QualityReport::new(),
            backend_calls: BTreeMap::new(),
            error: None,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&self, node: NodeId) -> Option<&NodeRecord> {
        self.records.iter().find(|r| r.node == node)
    }

    fn record_mut(&mut self, node: NodeId) -> Option<&mut NodeRecord> {
        self.records.iter_mut().find(|r| r.node == node)
    }

    pub fn status(&self, node: NodeId) -> Option<&NodeStatus> {
        self.record(node).map(|r| &r.status)
    }

    /// Mark every node that has not started as aborted. Validators among
    /// them are reported as not run.
    fn abort_pending(&mut self, cause: &str) {
        for record in &mut self.records {
            if record.status == NodeStatus::Pending {
                record.abort(cause);
                if record.node.is_validator() {
                    self.quality_report.mark_not_run(record.node, cause);
                }
            }
        }
    }

    fn is_over(&self) -> bool {
        self.error.is_some()
    }

    /// Turn the run into what the caller sees.
    ///
    /// # Errors
    ///
    /// Returns the fatal error, unless the request was cancelled and asked for
    /// best-effort output.
    pub fn into_outcome(self) -> Result<PipelineOutcome> {
        let partial = self.cancelled && self.best_effort;
        if let Some(error) = self.error {
            if !partial {
                return Err(error);
            }
        }

        let snapshot = self.context.snapshot();
        let missing = self
            .records
            .iter()
            .filter(|r| r.status != NodeStatus::Skipped && !snapshot.contains(&r.node))
            .map(|r| r.node)
            .collect();
        let result = DeckResult {
            title: snapshot
                .outline()
                .map(|o| o.title.clone())
                .unwrap_or_default(),
            slides: snapshot.deck().map(|d| d.slides.clone()).unwrap_or_default(),
            research: snapshot.research().cloned(),
            outline: snapshot.outline().cloned(),
            executive_summary: snapshot.summary().cloned(),
            adapted: snapshot.adapted().cloned(),
            missing,
        };

        let degraded = self
            .records
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    NodeStatus::Degraded { .. } | NodeStatus::Failed { .. } | NodeStatus::Aborted { .. }
                )
            })
            .map(|r| Degradation {
                node: r.node,
                status: r.status.clone(),
            })
            .collect();

        let mut total_usage = Usage::default();
        for record in &self.records {
            total_usage.add(&record.usage);
        }
        let finished_at = self.finished_at.unwrap_or_else(Utc::now);

        Ok(PipelineOutcome {
            request_id: self.request_id,
            result,
            quality_report: self.quality_report,
            metadata: RunMetadata {
                policy: self.policy,
                nodes: self.records,
                start_order: self.start_order,
                backend_calls: self.backend_calls,
                total_usage,
                started_at: self.started_at,
                finished_at,
                duration_ms: (finished_at - self.started_at).num_milliseconds(),
            },
            degraded,
            partial,
        })
    }
}

/// Health summary for operational monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub registry_size: usize,
    pub graph_nodes: usize,
    pub graph_dependencies: usize,
    pub backends: Vec<BackendSummary>,
    pub policy_table: Vec<PolicyRoutes>,
}

/// Cancels the request scope when the deadline passes; stops the timer on drop.
struct DeadlineGuard(JoinHandle<()>);

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives the task graph for one request at a time; shareable across requests.
///
/// # Example
///
/// ```ignore
/// let engine = deckflow::Engine::initialize(&config)?;
/// let outcome = engine
///     .orchestrator()
///     .run_pipeline(request, &CancellationToken::new())
///     .await?;
/// ```
pub struct Orchestrator {
    graph: Arc<TaskGraph>,
    agents: Arc<AgentRegistry>,
    router: Router,
    settings: ExecutionSettings,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl Orchestrator {
    /// Assemble an orchestrator from fully built parts.
    ///
    /// # Errors
    ///
    /// Returns `RegistryIncomplete` if a graph node has no agent, or a
    /// configuration error for invalid retry settings.
    pub fn new(
        graph: Arc<TaskGraph>,
        agents: Arc<AgentRegistry>,
        router: Router,
        settings: ExecutionSettings,
    ) -> Result<Self> {
        if let Some(missing) = graph.nodes().iter().find(|id| !agents.contains(*id)) {
            return Err(Error::RegistryIncomplete(*missing));
        }
        settings.retry.validate()?;
        Ok(Self {
            graph,
            agents,
            router,
            settings,
            events: None,
        })
    }

    /// Emit [`PipelineEvent`]s on `events` while requests run.
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            registry_size: self.agents.len(),
            graph_nodes: self.graph.node_count(),
            graph_dependencies: self.graph.dependency_count(),
            backends: self.router.registry().iter().map(|d| d.summary()).collect(),
            policy_table: self.router.policy_table(&self.graph),
        }
    }

    /// Run one request and return the result, quality report and metadata.
    ///
    /// # Errors
    ///
    /// Returns the fatal error when the request is rejected, cannot be routed,
    /// loses a required node, or is cancelled without `best_effort`.
    pub async fn run_pipeline(
        &self,
        request: DeckRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        self.execute(request, cancel).await.into_outcome()
    }

    /// Run one request and return its full execution state, including the
    /// per-node records of a request that failed.
    pub async fn execute(&self, request: DeckRequest, cancel: &CancellationToken) -> PipelineRun {
        let mut run = PipelineRun::new(&self.graph, &request);
        let request_id = run.request_id;
        tracing::info!(
            request_id = %request_id.short(),
            policy = %request.policy,
            topic = %request.topic,
            slides = request.slide_count,
            "pipeline started"
        );

        if let Err(e) = request.validate() {
            tracing::warn!(request_id = %request_id.short(), error = %e, "request rejected");
            run.abort_pending("request rejected");
            run.error = Some(e);
            return self.finish(run).await;
        }

        let mut scheduled = Vec::new();
        for spec in self.graph.nodes().iter().filter_map(|id| self.graph.spec(id)) {
            if is_requested(spec, &request) {
                scheduled.push(spec.id);
            } else if let Some(record) = run.record_mut(spec.id) {
                record.skip();
            }
        }

        let plan = match self.router.plan(&self.graph, &scheduled, request.policy) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(request_id = %request_id.short(), error = %e, "routing failed");
                run.abort_pending("routing failed");
                run.error = Some(e);
                return self.finish(run).await;
            }
        };

        let scope = cancel.child_token();
        let _deadline = self.settings.request_deadline.map(|limit| {
            let token = scope.clone();
            DeadlineGuard(tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                tracing::warn!(deadline_ms = limit.as_millis() as u64, "request deadline reached");
                token.cancel();
            }))
        });

        let runner = AttemptRunner::new(self.settings.retry, self.settings.call_timeout);
        let request = Arc::new(request);

        for (phase, nodes) in self.graph.phases() {
            if run.is_over() {
                break;
            }
            if scope.is_cancelled() {
                self.cancel_run(&mut run);
                break;
            }
            tracing::debug!(request_id = %request_id.short(), phase = %phase, "phase started");

            if self.graph.is_concurrent_phase(phase) {
                self.run_concurrent(&mut run, &nodes, &request, &plan, &runner, &scope)
                    .await;
            } else {
                self.run_sequential(&mut run, &nodes, &request, &plan, &runner, &scope)
                    .await;
            }

            if !run.is_over() {
                self.emit(PipelineEvent::PhaseComplete { request_id, phase })
                    .await;
            }
        }

        self.finish(run).await
    }

    async fn run_sequential(
        &self,
        run: &mut PipelineRun,
        nodes: &[NodeId],
        request: &Arc<DeckRequest>,
        plan: &RoutePlan,
        runner: &AttemptRunner,
        scope: &CancellationToken,
    ) {
        for &node in nodes {
            if run.is_over() {
                return;
            }
            if scope.is_cancelled() {
                self.cancel_run(run);
                return;
            }
            let Some(job) = self.prepare(run, node, request, plan) else {
                continue;
            };
            self.mark_started(run, &job).await;
            let response = runner
                .run(job.agent.as_ref(), &job.message, &job.route, scope)
                .await;
            self.settle(run, response).await;
        }
    }

    async fn run_concurrent(
        &self,
        run: &mut PipelineRun,
        nodes: &[NodeId],
        request: &Arc<DeckRequest>,
        plan: &RoutePlan,
        runner: &AttemptRunner,
        scope: &CancellationToken,
    ) {
        let mut jobs = Vec::new();
        for &node in nodes {
            if let Some(job) = self.prepare(run, node, request, plan) {
                jobs.push(job);
            }
            if run.is_over() {
                return;
            }
        }
        if jobs.is_empty() {
            return;
        }
        let mut started = 0;
        for job in &jobs {
            if scope.is_cancelled() {
                break;
            }
            self.mark_started(run, job).await;
            started += 1;
        }
        // Jobs never marked started stay pending and are aborted as cancelled.
        jobs.truncate(started);
        if jobs.is_empty() {
            self.cancel_run(run);
            return;
        }

        let responses = run_fan_out(jobs, runner, scope).await;

        // Join barrier: commit in completion order.
        for response in responses {
            self.settle(run, response).await;
        }
    }

    /// Gate `node` on its dependencies and build its job.
    ///
    /// Returns `None` when the node is not pending or a dependency gate
    /// aborted it; an aborted required node ends the request.
    fn prepare(
        &self,
        run: &mut PipelineRun,
        node: NodeId,
        request: &Arc<DeckRequest>,
        plan: &RoutePlan,
    ) -> Option<FanOutJob> {
        if run.status(node) != Some(&NodeStatus::Pending) {
            return None;
        }
        let spec = self.graph.spec(&node)?.clone();

        if let Some(dependency) = self.unmet_dependency(run, node) {
            let cause = format!("dependency {} did not succeed", dependency);
            tracing::info!(request_id = %run.request_id.short(), node = %node, %cause, "node aborted");
            if let Some(record) = run.record_mut(node) {
                record.abort(&cause);
            }
            if node.is_validator() {
                run.quality_report.mark_not_run(node, &cause);
            }
            if spec.is_required() {
                run.error = Some(Error::DependencyAborted { node, dependency });
                run.abort_pending(&format!("{} aborted", node));
            }
            return None;
        }

        let (agent, route) = match (self.agents.get(&node), plan.get(&node)) {
            (Ok(agent), Some(route)) => (agent, route.clone()),
            (Err(e), _) => {
                self.fail_unrunnable(run, &spec, e);
                return None;
            }
            (_, None) => {
                let e = Error::Routing {
                    node,
                    policy: plan.policy.to_string(),
                };
                self.fail_unrunnable(run, &spec, e);
                return None;
            }
        };

        Some(FanOutJob {
            agent,
            message: AgentMessage::new(run.request_id, node, Arc::clone(request), run.context.snapshot()),
            route,
        })
    }

    /// A node with no agent or no route. Required nodes end the request;
    /// optional ones degrade and validators among them are reported
    /// unavailable.
    fn fail_unrunnable(&self, run: &mut PipelineRun, spec: &NodeSpec, error: Error) {
        if spec.is_required() {
            if let Some(record) = run.record_mut(spec.id) {
                record.abort(&error.to_string());
            }
            run.error = Some(error);
            run.abort_pending(&format!("{} could not run", spec.id));
            return;
        }

        let reason = error.to_string();
        tracing::warn!(request_id = %run.request_id.short(), node = %spec.id, error = %reason, "node degraded");
        if let Some(record) = run.record_mut(spec.id) {
            record.degrade(&reason);
        }
        if spec.id.is_validator() {
            run.quality_report.merge_unavailable(spec.id, &reason);
        }
    }

    /// The first dependency whose state does not let `node` run.
    fn unmet_dependency(&self, run: &PipelineRun, node: NodeId) -> Option<NodeId> {
        self.graph
            .dependencies_with_kind(&node)
            .into_iter()
            .find(|(dependency, kind)| {
                let status = run.status(*dependency).cloned().unwrap_or_default();
                match kind {
                    DependencyKind::Hard => !status.is_succeeded(),
                    DependencyKind::Soft => !status.is_terminal(),
                }
            })
            .map(|(dependency, _)| dependency)
    }

    async fn mark_started(&self, run: &mut PipelineRun, job: &FanOutJob) {
        let node = job.node();
        if let Some(record) = run.record_mut(node) {
            record.start();
        }
        run.start_order.push(node);
        tracing::info!(
            request_id = %run.request_id.short(),
            node = %node,
            backend = %job.route.primary.id,
            "node started"
        );
        self.emit(PipelineEvent::NodeStarted {
            request_id: run.request_id,
            node,
            backend: job.route.primary.id.clone(),
        })
        .await;
    }

    /// Record a node's response and commit its output.
    async fn settle(&self, run: &mut PipelineRun, response: AgentResponse) {
        let node = response.node;
        let required = self.graph.spec(&node).is_some_and(|s| s.is_required());

        for (backend, calls) in &response.calls {
            *run.backend_calls.entry(backend.clone()).or_insert(0) += calls;
        }
        if let Some(record) = run.record_mut(node) {
            record.attempts = response.attempts;
            record.retries = response.retries;
            record.backend = response.backend.clone();
            record.fallback_used = response.fallback_used;
            record.usage = response.usage;
        }

        match response.outcome {
            Ok(output) => {
                if let AgentOutput::Findings(findings) = &output {
                    run.quality_report.merge(node, findings.clone());
                }
                if let Err(e) = run.context.commit(node, output) {
                    if let Some(record) = run.record_mut(node) {
                        record.fail(&e.to_string());
                    }
                    run.error = Some(e);
                } else if let Some(record) = run.record_mut(node) {
                    record.succeed();
                }
            }
            Err(Error::Cancelled) => {
                if let Some(record) = run.record_mut(node) {
                    record.abort("request cancelled");
                    record.finished_at = Some(Utc::now());
                }
                if node.is_validator() {
                    run.quality_report.mark_not_run(node, "request cancelled");
                }
                self.cancel_run(run);
            }
            Err(e) if required => {
                tracing::error!(request_id = %run.request_id.short(), node = %node, error = %e, "required node failed");
                if let Some(record) = run.record_mut(node) {
                    record.fail(&e.to_string());
                }
                run.abort_pending(&format!("{} failed", node));
                run.error = Some(Error::NodeFailed {
                    node,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                tracing::warn!(request_id = %run.request_id.short(), node = %node, error = %e, "node degraded");
                if let Some(record) = run.record_mut(node) {
                    record.degrade(&e.to_string());
                }
                if node.is_validator() {
                    run.quality_report.merge_unavailable(node, &e.to_string());
                }
            }
        }

        if let Some(status) = run.status(node).cloned() {
            tracing::info!(request_id = %run.request_id.short(), node = %node, status = %status, "node finished");
            self.emit(PipelineEvent::NodeFinished {
                request_id: run.request_id,
                node,
                status,
            })
            .await;
        }
    }

    fn cancel_run(&self, run: &mut PipelineRun) {
        if !run.cancelled {
            tracing::warn!(request_id = %run.request_id.short(), "request cancelled");
        }
        run.cancelled = true;
        run.abort_pending("request cancelled");
        if run.error.is_none() {
            run.error = Some(Error::Cancelled);
        }
    }

    async fn finish(&self, mut run: PipelineRun) -> PipelineRun {
        run.finished_at = Some(Utc::now());
        match &run.error {
            None => tracing::info!(
                request_id = %run.request_id.short(),
                nodes = run.start_order.len(),
                findings = run.quality_report.len(),
                "pipeline finished"
            ),
            Some(e) => tracing::warn!(
                request_id = %run.request_id.short(),
                error = %e,
                partial = run.cancelled && run.best_effort,
                "pipeline stopped"
            ),
        }
        self.emit(PipelineEvent::PipelineFinished {
            request_id: run.request_id,
        })
        .await;
        run
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }
}

/// Whether `spec` runs for `request`. On-demand nodes need an explicit flag.
fn is_requested(spec: &NodeSpec, request: &DeckRequest) -> bool {
    if !spec.on_demand {
        return true;
    }
    match spec.id {
        NodeId::ExecutiveSummary => request.flags.executive_summary,
        NodeId::AudienceAdapter => request.flags.adapt_audience.is_some(),
        _ => false,
    }
}
