//! Repeated runs of the same brief execute the same way.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use deckflow::backend::CapabilityTier;
use deckflow::core::{NodeId, NodeStatus, Phase};
use deckflow::{PipelineEvent, RoutingPolicy};

use crate::fixtures::{brief_with_finalization, descriptor, engine, ScriptedBackend};

/// Phases in the order their completion events arrived.
fn completed_phases(rx: &mut mpsc::Receiver<PipelineEvent>) -> Vec<Phase> {
    let mut phases = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PipelineEvent::PhaseComplete { phase, .. } = event {
            phases.push(phase);
        }
    }
    phases
}

#[tokio::test]
async fn test_rerun_has_same_execution_shape() {
    let backend = ScriptedBackend::new("stub").into_arc();
    let (tx, mut rx) = mpsc::channel(1024);
    let engine = engine(vec![descriptor("stub", CapabilityTier::Standard, backend)]).with_events(tx);

    let first = engine
        .orchestrator()
        .run_pipeline(
            brief_with_finalization(4, RoutingPolicy::Balanced),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let first_phases = completed_phases(&mut rx);

    let second = engine
        .orchestrator()
        .run_pipeline(
            brief_with_finalization(4, RoutingPolicy::Balanced),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let second_phases = completed_phases(&mut rx);

    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.metadata.start_order, second.metadata.start_order);
    assert_eq!(first_phases, second_phases);
    assert_eq!(
        first_phases,
        vec![
            Phase::Research,
            Phase::Structure,
            Phase::Generation,
            Phase::Qa,
            Phase::Finalization
        ]
    );
    for (a, b) in first.metadata.nodes.iter().zip(&second.metadata.nodes) {
        assert_eq!(a.node, b.node);
        assert_eq!(a.status, b.status);
        assert_eq!(a.backend, b.backend);
    }
    assert_eq!(first.metadata.start_order.len(), NodeId::ALL.len());
}

/// Every node starts only after its dependencies are terminal.
#[tokio::test]
async fn test_dependencies_finish_before_dependents_start() {
    let backend = ScriptedBackend::new("stub").into_arc();
    let engine = engine(vec![descriptor("stub", CapabilityTier::Standard, backend)]);
    let graph_edges = engine.orchestrator().graph().edges();

    let outcome = engine
        .orchestrator()
        .run_pipeline(
            brief_with_finalization(3, RoutingPolicy::Balanced),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    for (from, to, _) in graph_edges {
        let upstream = outcome.metadata.record(from).unwrap();
        let downstream = outcome.metadata.record(to).unwrap();
        assert_eq!(upstream.status, NodeStatus::Succeeded);
        assert!(
            upstream.finished_at.unwrap() <= downstream.started_at.unwrap(),
            "{} started before {} finished",
            to,
            from
        );
    }
}
