//! Engine start-up from configuration and request-level validation.

use std::fs;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use deckflow::backend::CapabilityTier;
use deckflow::core::{NodeId, NodeStatus};
use deckflow::{Config, DeckRequest, Engine, Error, RoutingPolicy};

use crate::fixtures::{brief, descriptor, engine, ScriptedBackend};

#[tokio::test]
async fn test_engine_from_config_file_runs_offline() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("deckflow.toml");
    fs::write(
        &path,
        r#"
default_policy = "cost"
call_timeout_secs = 5

[retry]
max_attempts = 2
backoff_ms = 1

[[backends]]
id = "free"
tier = "standard"
local = true

[[backends]]
id = "paid"
tier = "high-reasoning"
cost_per_1k_tokens = 2.5
"#,
    )
    .expect("Failed to write config");

    let config = Config::load_from(&path).unwrap();
    let engine = Engine::initialize(&config).unwrap();
    assert_eq!(engine.default_policy(), RoutingPolicy::Cost);

    let text = r#"{"topic":"Observability budgets","audience":"SREs","tone":"plain","slide_count":3}"#;
    let request = DeckRequest::from_json(text, engine.default_policy()).unwrap();
    let outcome = engine
        .orchestrator()
        .run_pipeline(request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.metadata.policy, RoutingPolicy::Cost);
    assert_eq!(outcome.result.slides.len(), 3);
    assert_eq!(
        outcome.metadata.backend_calls.keys().collect::<Vec<_>>(),
        vec!["free"]
    );
}

#[tokio::test]
async fn test_malformed_output_is_retried() {
    let backend = ScriptedBackend::new("chatty")
        .malformed(NodeId::Structurer, 1)
        .into_arc();
    let engine = engine(vec![descriptor("chatty", CapabilityTier::Standard, backend.clone())]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new())
        .await
        .unwrap();

    let record = outcome.metadata.record(NodeId::Structurer).unwrap();
    assert_eq!(record.status, NodeStatus::Succeeded);
    assert_eq!(record.retries, 1);
    assert_eq!(backend.calls_for(NodeId::Structurer), 2);
}

#[tokio::test]
async fn test_invalid_brief_makes_no_backend_call() {
    let backend = ScriptedBackend::new("only").into_arc();
    let engine = engine(vec![descriptor("only", CapabilityTier::Standard, backend.clone())]);

    let result = engine
        .orchestrator()
        .run_pipeline(brief(0, RoutingPolicy::Balanced), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn test_usage_is_totalled() {
    let backend = ScriptedBackend::new("only").into_arc();
    let engine = engine(vec![descriptor("only", CapabilityTier::Standard, backend.clone())]);

    let outcome = engine
        .orchestrator()
        .run_pipeline(brief(3, RoutingPolicy::Balanced), &CancellationToken::new())
        .await
        .unwrap();

    let per_node: u64 = outcome
        .metadata
        .nodes
        .iter()
        .map(|r| r.usage.total_tokens())
        .sum();
    assert!(per_node > 0);
    assert_eq!(outcome.metadata.total_usage.total_tokens(), per_node);
    assert_eq!(
        outcome.metadata.backend_calls.get("only").copied(),
        Some(backend.total_calls() as u32)
    );
    assert!(outcome.metadata.duration_ms >= 0);
}
