//! Routing behavior observed through whole requests.

use tokio_util::sync::CancellationToken;

use deckflow::backend::CapabilityTier;
use deckflow::core::{NodeId, NodeStatus};
use deckflow::RoutingPolicy;

use crate::fixtures::{brief, default_nodes, descriptor, engine, ScriptedBackend};

fn mixed_engine() -> deckflow::Engine {
    engine(vec![
        descriptor(
            "fast",
            CapabilityTier::FastThroughput,
            ScriptedBackend::new("fast").into_arc(),
        )
        .with_cost(0.2),
        descriptor(
            "deep",
            CapabilityTier::HighReasoning,
            ScriptedBackend::new("deep").into_arc(),
        )
        .with_cost(3.0),
        descriptor(
            "laptop",
            CapabilityTier::Standard,
            ScriptedBackend::new("laptop").into_arc(),
        )
        .local()
        .with_cost(0.0),
    ])
}

#[test]
fn test_plans_are_deterministic() {
    let engine = mixed_engine();
    let orchestrator = engine.orchestrator();
    let nodes = orchestrator.graph().nodes().to_vec();

    for policy in RoutingPolicy::ALL {
        let first = orchestrator
            .router()
            .plan(orchestrator.graph(), &nodes, policy)
            .unwrap();
        for _ in 0..10 {
            let again = orchestrator
                .router()
                .plan(orchestrator.graph(), &nodes, policy)
                .unwrap();
            for node in &nodes {
                assert_eq!(
                    first.get(node).unwrap().primary.id,
                    again.get(node).unwrap().primary.id,
                    "{} moved under {}",
                    node,
                    policy
                );
            }
        }
    }
}

#[tokio::test]
async fn test_balanced_splits_reasoning_and_throughput() {
    let outcome = mixed_engine()
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new())
        .await
        .unwrap();

    let backend = |node| {
        outcome
            .metadata
            .record(node)
            .and_then(|r| r.backend.clone())
            .unwrap()
    };
    assert_eq!(backend(NodeId::Researcher), "deep");
    assert_eq!(backend(NodeId::Structurer), "deep");
    assert_eq!(backend(NodeId::SlideWriter), "fast");
    for validator in NodeId::VALIDATORS {
        assert_eq!(backend(validator), "fast");
    }
}

#[tokio::test]
async fn test_local_only_never_leaves_the_machine() {
    let outcome = mixed_engine()
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::LocalOnly), &CancellationToken::new())
        .await
        .unwrap();

    for node in default_nodes() {
        let record = outcome.metadata.record(node).unwrap();
        assert_eq!(record.backend.as_deref(), Some("laptop"));
    }
    assert_eq!(outcome.metadata.backend_calls.len(), 1);
}

#[tokio::test]
async fn test_cost_policy_prefers_free_backend() {
    let outcome = mixed_engine()
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Cost), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome
        .metadata
        .nodes
        .iter()
        .filter(|r| r.status == NodeStatus::Succeeded)
        .all(|r| r.backend.as_deref() == Some("laptop")));
}

/// An optional node whose primary is exhausted is served by the fallback.
#[tokio::test]
async fn test_fallback_serves_exhausted_validator() {
    let deep = ScriptedBackend::new("deep")
        .always_fail(NodeId::Media)
        .into_arc();
    let standard = ScriptedBackend::new("standard").into_arc();
    let engine = engine(vec![
        descriptor("deep", CapabilityTier::HighReasoning, deep.clone()),
        descriptor("standard", CapabilityTier::Standard, standard.clone()),
    ]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Quality), &CancellationToken::new())
        .await
        .unwrap();

    let media = outcome.metadata.record(NodeId::Media).unwrap();
    assert_eq!(media.status, NodeStatus::Succeeded);
    assert!(media.fallback_used);
    assert_eq!(media.backend.as_deref(), Some("standard"));
    assert_eq!(media.attempts, 4);
    assert_eq!(media.retries, 0);
    assert_eq!(deep.calls_for(NodeId::Media), 3);
    assert_eq!(standard.calls_for(NodeId::Media), 1);
    assert!(outcome.degraded.is_empty());
}

/// Retries never exceed the configured maximum per backend.
#[tokio::test]
async fn test_retries_are_bounded_without_fallback() {
    let only = ScriptedBackend::new("only")
        .always_fail(NodeId::Readability)
        .into_arc();
    let engine = engine(vec![descriptor("only", CapabilityTier::Standard, only.clone())]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new())
        .await
        .unwrap();

    let record = outcome.metadata.record(NodeId::Readability).unwrap();
    assert!(matches!(record.status, NodeStatus::Degraded { .. }));
    assert!(!record.fallback_used);
    assert_eq!(record.attempts, 3);
    assert!(record.retries <= 2);
    assert_eq!(only.calls_for(NodeId::Readability), 3);
}

#[test]
fn test_status_policy_table_marks_unroutable_nodes() {
    let engine = engine(vec![descriptor(
        "cloud",
        CapabilityTier::Standard,
        ScriptedBackend::new("cloud").into_arc(),
    )]);
    let status = engine.orchestrator().status();
    let local = status
        .policy_table
        .iter()
        .find(|p| p.policy == RoutingPolicy::LocalOnly)
        .unwrap();
    assert!(local.routes.iter().all(|(_, backend)| backend.is_none()));
    let quality = status
        .policy_table
        .iter()
        .find(|p| p.policy == RoutingPolicy::Quality)
        .unwrap();
    assert!(quality
        .routes
        .iter()
        .all(|(_, backend)| backend.as_deref() == Some("cloud")));
}
