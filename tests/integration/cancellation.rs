//! Cancellation, request deadlines and best-effort output.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use deckflow::backend::CapabilityTier;
use deckflow::core::{NodeId, NodeStatus};
use deckflow::orchestration::ExecutionSettings;
use deckflow::quality::ValidatorOutcome;
use deckflow::{Error, RoutingPolicy};

use crate::fixtures::{brief, descriptor, engine_with, fast_settings, ScriptedBackend};

/// Call timeout long enough that only cancellation can stop a slow call.
fn patient_settings() -> ExecutionSettings {
    ExecutionSettings {
        call_timeout: Duration::from_secs(30),
        ..fast_settings()
    }
}

fn cancel_after(token: &CancellationToken, delay: Duration) {
    let token = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        token.cancel();
    });
}

#[tokio::test]
async fn test_cancel_stops_in_flight_call() {
    let backend = ScriptedBackend::new("only")
        .delay(NodeId::SlideWriter, Duration::from_secs(20))
        .into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend.clone())],
        patient_settings(),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(100));

    let started = Instant::now();
    let run = engine
        .orchestrator()
        .execute(brief(3, RoutingPolicy::Balanced), &cancel)
        .await;
    assert!(started.elapsed() < Duration::from_secs(5), "cancellation was not prompt");

    assert!(matches!(run.error, Some(Error::Cancelled)));
    assert!(run.cancelled);
    assert_eq!(run.status(NodeId::Researcher), Some(&NodeStatus::Succeeded));
    assert_eq!(run.status(NodeId::Structurer), Some(&NodeStatus::Succeeded));
    assert!(matches!(
        run.status(NodeId::SlideWriter),
        Some(NodeStatus::Aborted { .. })
    ));
    for validator in NodeId::VALIDATORS {
        assert!(matches!(run.status(validator), Some(NodeStatus::Aborted { .. })));
        assert_eq!(backend.calls_for(validator), 0);
    }

    assert!(matches!(run.into_outcome(), Err(Error::Cancelled)));
}

#[tokio::test]
async fn test_best_effort_returns_marked_partial_result() {
    let backend = ScriptedBackend::new("only")
        .delay(NodeId::SlideWriter, Duration::from_secs(20))
        .into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend)],
        patient_settings(),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(100));

    let mut request = brief(3, RoutingPolicy::Balanced);
    request.best_effort = true;
    let outcome = engine
        .orchestrator()
        .run_pipeline(request, &cancel)
        .await
        .expect("best effort should return the partial result");

    assert!(outcome.partial);
    assert!(outcome.result.research.is_some());
    assert_eq!(outcome.result.outline.as_ref().map(|o| o.sections.len()), Some(3));
    assert!(outcome.result.slides.is_empty());
    assert!(outcome.result.missing.contains(&NodeId::SlideWriter));
    for validator in NodeId::VALIDATORS {
        assert!(outcome.result.missing.contains(&validator));
    }
    assert!(!outcome.result.missing.contains(&NodeId::Researcher));
    assert!(outcome
        .degraded
        .iter()
        .any(|d| d.node == NodeId::SlideWriter && matches!(d.status, NodeStatus::Aborted { .. })));
}

#[tokio::test]
async fn test_cancel_during_fan_out_keeps_finished_validators() {
    let backend = ScriptedBackend::new("only")
        .delay(NodeId::Tone, Duration::from_secs(20))
        .into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend)],
        patient_settings(),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(150));

    let mut request = brief(3, RoutingPolicy::Balanced);
    request.best_effort = true;
    let outcome = engine
        .orchestrator()
        .run_pipeline(request, &cancel)
        .await
        .unwrap();

    assert!(outcome.partial);
    assert_eq!(outcome.result.slides.len(), 3);
    let report = &outcome.quality_report;
    assert_eq!(report.completed_validators(), NodeId::VALIDATORS.len() - 1);
    assert!(report
        .validators
        .iter()
        .any(|(node, outcome)| *node == NodeId::Tone
            && matches!(outcome, ValidatorOutcome::NotRun { .. })));
    assert!(matches!(
        outcome.metadata.record(NodeId::Tone).unwrap().status,
        NodeStatus::Aborted { .. }
    ));
}

#[tokio::test]
async fn test_request_deadline_cancels() {
    let backend = ScriptedBackend::new("only")
        .delay(NodeId::Structurer, Duration::from_secs(20))
        .into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend.clone())],
        ExecutionSettings {
            request_deadline: Some(Duration::from_millis(150)),
            ..patient_settings()
        },
    );

    let started = Instant::now();
    let result = engine
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new())
        .await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(backend.calls_for(NodeId::SlideWriter), 0);
}

#[tokio::test]
async fn test_already_cancelled_request_calls_nothing() {
    let backend = ScriptedBackend::new("only").into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend.clone())],
        fast_settings(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = engine
        .orchestrator()
        .execute(brief(3, RoutingPolicy::Balanced), &cancel)
        .await;
    assert!(matches!(run.error, Some(Error::Cancelled)));
    assert!(run.start_order.is_empty());
    assert_eq!(backend.total_calls(), 0);
}

/// The caller drops the request future while one validator is still
/// waiting on its backend. The validator's task goes with it.
#[tokio::test]
async fn test_dropped_request_stops_in_flight_validators() {
    let backend = ScriptedBackend::new("only")
        .delay(NodeId::Tone, Duration::from_millis(400))
        .into_arc();
    let engine = engine_with(
        vec![descriptor("only", CapabilityTier::Standard, backend.clone())],
        patient_settings(),
    );

    let result = tokio::time::timeout(
        Duration::from_millis(150),
        engine
            .orchestrator()
            .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new()),
    )
    .await;
    assert!(result.is_err(), "the request should still be waiting on tone");
    assert_eq!(backend.calls_for(NodeId::Tone), 1);

    let calls = backend.total_calls();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(backend.total_calls(), calls);
    assert_eq!(backend.answered_for(NodeId::Tone), 0);
}
