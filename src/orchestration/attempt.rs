//! Bounded retry with exponential backoff, then one fallback backend.

use crate::agents::Agent;
use crate::core::{AgentMessage, AgentResponse};
use crate::error::{Error, Result};
use crate::router::Route;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default maximum calls per backend for one node.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default deadline for a single backend call.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Calls per backend, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed call.
    pub backoff_ms: u64,
    /// Factor applied to the delay after each further failure.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: 250,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    /// Reject settings that would never call a backend or never stop.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Runs one node against its route until it succeeds or runs out of options.
#[derive(Debug, Clone)]
pub struct AttemptRunner {
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl AttemptRunner {
    pub fn new(retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            retry,
            call_timeout,
        }
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute `agent` for `message`.
    ///
    /// Input is validated once; a validation failure makes no backend call.
    /// Each backend of the route gets `max_attempts` calls with backoff in
    /// between. Non-retryable errors and cancellation stop immediately.
    pub async fn run(
        &self,
        agent: &dyn Agent,
        message: &AgentMessage,
        route: &Route,
        cancel: &CancellationToken,
    ) -> AgentResponse {
        let node = message.node;
        let mut response = AgentResponse::new(node);

        if let Err(e) = agent.validate_input(message) {
            tracing::warn!(request_id = %message.request_id.short(), node = %node, error = %e, "input rejected");
            response.outcome = Err(e);
            return response;
        }

        let backends = std::iter::once(&route.primary).chain(route.fallback.as_ref());
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for (index, descriptor) in backends.enumerate() {
            if index > 0 {
                tracing::warn!(
                    request_id = %message.request_id.short(),
                    node = %node,
                    from = %route.primary.id,
                    to = %descriptor.id,
                    "falling back"
                );
                response.fallback_used = true;
            }
            let timeout = descriptor.timeout.unwrap_or(self.call_timeout);

            for attempt in 1..=max_attempts {
                if cancel.is_cancelled() {
                    response.outcome = Err(Error::Cancelled);
                    return response;
                }
                response.count_call(&descriptor.id);
                response.backend = Some(descriptor.id.clone());
                response.retries = attempt - 1;

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    outcome = tokio::time::timeout(timeout, agent.invoke(message, descriptor.backend.as_ref())) => {
                        outcome.unwrap_or_else(|_| Err(Error::Timeout {
                            backend: descriptor.id.clone(),
                            timeout,
                        }))
                    }
                };

                match result {
                    Ok(reply) => {
                        response.usage.add(&reply.usage);
                        response.outcome = Ok(reply.output);
                        tracing::debug!(
                            request_id = %message.request_id.short(),
                            node = %node,
                            backend = %descriptor.id,
                            attempt,
                            "attempt succeeded"
                        );
                        return response;
                    }
                    Err(Error::Cancelled) => {
                        response.outcome = Err(Error::Cancelled);
                        return response;
                    }
                    Err(e) if !e.is_retryable() => {
                        response.outcome = Err(e);
                        return response;
                    }
                    Err(e) => {
                        tracing::warn!(
                            request_id = %message.request_id.short(),
                            node = %node,
                            backend = %descriptor.id,
                            attempt,
                            error = %e,
                            "attempt failed"
                        );
                        last_error = Some(e);
                        if attempt < max_attempts {
                            let delay = self.retry.delay_after(attempt);
                            tokio::select! {
                                _ = cancel.cancelled() => {
                                    response.outcome = Err(Error::Cancelled);
                                    return response;
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }

        response.outcome = Err(last_error.unwrap_or_else(|| Error::Backend {
            backend: route.primary.id.clone(),
            message: "no attempt was made".to_string(),
        }));
        response
    }
}
