//! End-to-end pipeline scenarios.
//!
//! Each test drives a full request through the engine against scripted
//! backends and checks node states, retries, fallback and the quality report.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use deckflow::backend::CapabilityTier;
use deckflow::core::{NodeId, NodeStatus};
use deckflow::quality::Severity;
use deckflow::{Error, RoutingPolicy};

use crate::fixtures::{brief, default_nodes, descriptor, engine, ScriptedBackend};

/// Speed policy, every backend answers instantly.
/// All default nodes succeed and the core chain runs in declared order.
#[tokio::test]
async fn test_speed_policy_happy_path() {
    let fast = ScriptedBackend::new("fast").into_arc();
    let deep = ScriptedBackend::new("deep").into_arc();
    let engine = engine(vec![
        descriptor("deep", CapabilityTier::HighReasoning, deep.clone()),
        descriptor("fast", CapabilityTier::FastThroughput, fast.clone()),
    ]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(5, RoutingPolicy::Speed), &CancellationToken::new())
        .await
        .expect("pipeline should succeed");

    assert_eq!(
        &outcome.metadata.start_order[..3],
        &[NodeId::Researcher, NodeId::Structurer, NodeId::SlideWriter]
    );
    for node in default_nodes() {
        let record = outcome.metadata.record(node).unwrap();
        assert_eq!(record.status, NodeStatus::Succeeded, "{} did not succeed", node);
        assert_eq!(record.backend.as_deref(), Some("fast"));
        assert_eq!(record.retries, 0);
    }
    assert_eq!(deep.total_calls(), 0, "speed policy must not touch the slow backend");
    assert!(outcome.quality_report.unavailable_validators().is_empty());
    assert!(outcome
        .quality_report
        .findings
        .iter()
        .all(|f| !(f.meta && f.severity == Severity::High)));
    assert_eq!(outcome.result.slides.len(), 5);
    assert!(outcome.degraded.is_empty());
    assert!(!outcome.partial);
}

/// Quality policy, the researcher's backend fails twice and then
/// answers. The node succeeds on its third attempt without fallback.
#[tokio::test]
async fn test_researcher_recovers_within_retry_budget() {
    let deep = ScriptedBackend::new("deep")
        .fail_times(NodeId::Researcher, 2)
        .into_arc();
    let standard = ScriptedBackend::new("standard").into_arc();
    let engine = engine(vec![
        descriptor("deep", CapabilityTier::HighReasoning, deep.clone()),
        descriptor("standard", CapabilityTier::Standard, standard.clone()),
    ]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(4, RoutingPolicy::Quality), &CancellationToken::new())
        .await
        .expect("pipeline should succeed");

    let research = outcome.metadata.record(NodeId::Researcher).unwrap();
    assert_eq!(research.status, NodeStatus::Succeeded);
    assert_eq!(research.retries, 2);
    assert_eq!(research.attempts, 3);
    assert!(!research.fallback_used);
    assert_eq!(research.backend.as_deref(), Some("deep"));
    assert_eq!(deep.calls_for(NodeId::Researcher), 3);
    assert_eq!(standard.calls_for(NodeId::Researcher), 0);
    assert_eq!(outcome.metadata.backend_calls.get("deep").copied(), Some(deep.total_calls() as u32));
}

/// The researcher fails on every attempt, fallback included.
/// The request aborts and nothing downstream is ever invoked.
#[tokio::test]
async fn test_researcher_exhaustion_aborts_request() {
    let deep = ScriptedBackend::new("deep")
        .always_fail(NodeId::Researcher)
        .into_arc();
    let standard = ScriptedBackend::new("standard")
        .always_fail(NodeId::Researcher)
        .into_arc();
    let engine = engine(vec![
        descriptor("deep", CapabilityTier::HighReasoning, deep.clone()),
        descriptor("standard", CapabilityTier::Standard, standard.clone()),
    ]);

    let run = engine
        .orchestrator()
        .execute(brief(4, RoutingPolicy::Quality), &CancellationToken::new())
        .await;

    match &run.error {
        Some(Error::NodeFailed { node, .. }) => assert_eq!(*node, NodeId::Researcher),
        other => panic!("expected NodeFailed for researcher, got {:?}", other),
    }

    let research = run.record(NodeId::Researcher).unwrap();
    assert!(matches!(research.status, NodeStatus::Failed { .. }));
    assert!(research.fallback_used);
    assert_eq!(deep.calls_for(NodeId::Researcher), 3);
    assert_eq!(standard.calls_for(NodeId::Researcher), 3);

    for node in NodeId::ALL.iter().skip(1) {
        let status = run.status(*node).unwrap();
        assert!(
            matches!(status, NodeStatus::Aborted { .. }),
            "{} should be aborted, was {}",
            node,
            status
        );
    }
    assert_eq!(deep.total_calls() + standard.total_calls(), 6);
    assert_eq!(run.start_order, vec![NodeId::Researcher]);

    let err = run.into_outcome().unwrap_err();
    assert!(err.to_string().contains("researcher"));
}

/// Generation succeeds and one of the concurrent validators times
/// out. The report holds the other validators' findings plus one
/// "validator unavailable" meta-finding; the deck is still returned.
#[tokio::test]
async fn test_timed_out_validator_degrades_alone() {
    let core = ScriptedBackend::new("core").into_arc();
    let qa = ScriptedBackend::new("qa")
        .delay(NodeId::Tone, Duration::from_secs(5))
        .into_arc();
    let engine = engine(vec![
        descriptor("core", CapabilityTier::Standard, core.clone()),
        descriptor("qa", CapabilityTier::FastThroughput, qa.clone())
            .serving(NodeId::VALIDATORS),
    ]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(4, RoutingPolicy::Balanced), &CancellationToken::new())
        .await
        .expect("a validator failure must not abort the request");

    let report = &outcome.quality_report;
    assert_eq!(report.completed_validators(), NodeId::VALIDATORS.len() - 1);
    assert_eq!(report.unavailable_validators(), vec![NodeId::Tone]);
    let meta: Vec<_> = report.findings.iter().filter(|f| f.meta).collect();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].severity, Severity::High);
    assert!(meta[0].message.contains("validator unavailable"));

    assert_eq!(outcome.degraded.len(), 1);
    assert_eq!(outcome.degraded[0].node, NodeId::Tone);
    assert!(matches!(outcome.degraded[0].status, NodeStatus::Degraded { .. }));
    assert_eq!(outcome.result.slides.len(), 4);
    assert_eq!(qa.calls_for(NodeId::Tone), 3);
}

/// Local-only with no local backend able to serve the structurer.
/// Routing fails before any backend call and no node is started.
#[tokio::test]
async fn test_local_only_without_local_backend_fails_routing() {
    let laptop = ScriptedBackend::new("laptop").into_arc();
    let cloud = ScriptedBackend::new("cloud").into_arc();
    let engine = engine(vec![
        descriptor("laptop", CapabilityTier::Standard, laptop.clone())
            .local()
            .serving([NodeId::Researcher]),
        descriptor("cloud", CapabilityTier::HighReasoning, cloud.clone()),
    ]);

    let run = engine
        .orchestrator()
        .execute(brief(4, RoutingPolicy::LocalOnly), &CancellationToken::new())
        .await;

    match &run.error {
        Some(Error::Routing { node, policy }) => {
            assert_eq!(*node, NodeId::Structurer);
            assert_eq!(policy, "local-only");
        }
        other => panic!("expected a routing error, got {:?}", other),
    }
    assert!(run.start_order.is_empty());
    assert!(run.records.iter().all(|r| r.started_at.is_none()));
    assert!(run
        .records
        .iter()
        .all(|r| !matches!(r.status, NodeStatus::Running | NodeStatus::Succeeded)));
    assert_eq!(laptop.total_calls() + cloud.total_calls(), 0);
}

/// Local-only where the only local backend serves every node except the
/// media validator. The deck is produced and media is reported unavailable
/// without a single call.
#[tokio::test]
async fn test_local_only_unroutable_validator_degrades() {
    let serving: Vec<NodeId> = NodeId::ALL
        .iter()
        .copied()
        .filter(|n| *n != NodeId::Media)
        .collect();
    let laptop = ScriptedBackend::new("laptop").into_arc();
    let cloud = ScriptedBackend::new("cloud").into_arc();
    let engine = engine(vec![
        descriptor("laptop", CapabilityTier::Standard, laptop.clone())
            .local()
            .serving(serving),
        descriptor("cloud", CapabilityTier::HighReasoning, cloud.clone()),
    ]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(4, RoutingPolicy::LocalOnly), &CancellationToken::new())
        .await
        .expect("an unroutable validator must not abort the request");

    let media = outcome.metadata.record(NodeId::Media).unwrap();
    assert!(matches!(media.status, NodeStatus::Degraded { .. }));
    assert!(media.started_at.is_none());
    assert!(!outcome.metadata.start_order.contains(&NodeId::Media));

    let report = &outcome.quality_report;
    assert_eq!(report.unavailable_validators(), vec![NodeId::Media]);
    assert_eq!(report.completed_validators(), NodeId::VALIDATORS.len() - 1);
    let meta: Vec<_> = report.findings.iter().filter(|f| f.meta).collect();
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].severity, Severity::High);
    assert!(meta[0].message.contains("validator unavailable"));

    assert_eq!(outcome.degraded.len(), 1);
    assert_eq!(outcome.degraded[0].node, NodeId::Media);
    assert_eq!(outcome.result.slides.len(), 4);
    assert_eq!(laptop.calls_for(NodeId::Media), 0);
    assert_eq!(cloud.total_calls(), 0);
}
