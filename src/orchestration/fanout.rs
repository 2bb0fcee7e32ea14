//! Concurrent execution of one phase's nodes with a join barrier.
//!
//! Every job runs on its own tokio task against the same immutable context
//! snapshot. Jobs never touch shared state; their responses are handed back
//! in completion order once all of them have finished. No task outlives
//! the caller: dropping the fan-out aborts whatever is still running.

use super::attempt::AttemptRunner;
use crate::agents::Agent;
use crate::core::{AgentMessage, AgentResponse, NodeId};
use crate::error::Error;
use crate::router::Route;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// One node ready to launch.
pub struct FanOutJob {
    pub agent: Arc<dyn Agent>,
    pub message: AgentMessage,
    pub route: Route,
}

impl FanOutJob {
    pub fn node(&self) -> NodeId {
        self.message.node
    }
}

/// Aborts every task it holds when dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Launch every job at once and wait for all of them.
///
/// A slow or failing job delays only the barrier, never its siblings. A job
/// whose task panics is reported as a failed response for its node. Dropping
/// the returned future aborts every job still in flight.
pub async fn run_fan_out(
    jobs: Vec<FanOutJob>,
    runner: &AttemptRunner,
    cancel: &CancellationToken,
) -> Vec<AgentResponse> {
    let mut guard = AbortOnDrop(Vec::with_capacity(jobs.len()));
    let mut pending: FuturesUnordered<_> = jobs
        .into_iter()
        .map(|job| {
            let node = job.node();
            let runner = runner.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                runner
                    .run(job.agent.as_ref(), &job.message, &job.route, &cancel)
                    .await
            });
            guard.0.push(handle.abort_handle());
            async move { (node, handle.await) }
        })
        .collect();

    let mut responses = Vec::with_capacity(pending.len());
    while let Some((node, joined)) = pending.next().await {
        match joined {
            Ok(response) => responses.push(response),
            Err(e) => {
                tracing::error!(node = %node, error = %e, "fan-out task did not complete");
                let mut response = AgentResponse::new(node);
                response.outcome = Err(Error::QaValidator {
                    node,
                    message: e.to_string(),
                });
                responses.push(response);
            }
        }
    }
    responses
}
