//! Multi-agent delegation.
//!
//! The orchestration manager fans a user message out to sub-agents under a
//! strategy: all at once, one at a time, or racing for the first success.
//! Per-target failures are captured into results rather than aborting the
//! fan-out; strategy semantics decide what happens next.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agent::AgentRegistry;
use crate::event::TaskEvent;
use crate::task::{MessagePart, Task, TaskCreateRequest, TaskState};

/// Default per-target execution deadline.
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised by delegation itself (per-target failures are captured in
/// [`SubAgentResult`] instead).
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// No targets were supplied.
    #[error("target_cards must not be empty")]
    NoTargets,
}

/// How sub-agents are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationStrategy {
    /// Start all targets concurrently; collect every result.
    Parallel,
    /// One target at a time, in the given order.
    Sequential,
    /// Race all targets; the first success wins and cancels the rest.
    FirstSuccess,
}

/// Outcome of one sub-agent execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentResult {
    /// The target agent.
    pub agent_id: String,
    /// Whether the target produced a usable response.
    pub success: bool,
    /// Accumulated response text on success.
    pub response: Option<String>,
    /// Failure description otherwise.
    pub error: Option<String>,
    /// Wall-clock latency of the execution.
    pub latency_ms: u64,
}

impl SubAgentResult {
    fn failure(agent_id: &str, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            success: false,
            response: None,
            error: Some(error.into()),
            latency_ms,
        }
    }
}

/// Fans messages out to sub-agents.
#[derive(Clone)]
pub struct OrchestrationManager {
    registry: AgentRegistry,
    agent_timeout: Duration,
}

impl OrchestrationManager {
    /// Manager over an agent registry.
    #[must_use]
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    /// Override the per-target deadline.
    #[must_use]
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// Delegate a message to target agents under a strategy.
    pub async fn delegate_to_agents(
        &self,
        thread_id: &str,
        tenant_id: &str,
        user_id: &str,
        message: &str,
        target_agent_ids: &[String],
        strategy: DelegationStrategy,
    ) -> Result<Vec<SubAgentResult>, OrchestrationError> {
        if target_agent_ids.is_empty() {
            return Err(OrchestrationError::NoTargets);
        }
        debug!(
            thread_id,
            targets = target_agent_ids.len(),
            ?strategy,
            "Delegating to sub-agents"
        );

        match strategy {
            DelegationStrategy::Parallel => {
                let handles: Vec<JoinHandle<SubAgentResult>> = target_agent_ids
                    .iter()
                    .map(|agent_id| {
                        self.spawn_execution(agent_id, tenant_id, user_id, thread_id, message)
                    })
                    .collect();
                let mut results = Vec::with_capacity(handles.len());
                for (agent_id, handle) in target_agent_ids.iter().zip(handles) {
                    results.push(handle.await.unwrap_or_else(|join_error| {
                        SubAgentResult::failure(agent_id, join_error.to_string(), 0)
                    }));
                }
                Ok(results)
            }
            DelegationStrategy::Sequential => {
                let mut results = Vec::with_capacity(target_agent_ids.len());
                for agent_id in target_agent_ids {
                    results.push(
                        self.execute_agent(agent_id, tenant_id, user_id, thread_id, message)
                            .await,
                    );
                }
                Ok(results)
            }
            DelegationStrategy::FirstSuccess => {
                self.delegate_first_success(thread_id, tenant_id, user_id, message, target_agent_ids)
                    .await
            }
        }
    }

    async fn delegate_first_success(
        &self,
        thread_id: &str,
        tenant_id: &str,
        user_id: &str,
        message: &str,
        target_agent_ids: &[String],
    ) -> Result<Vec<SubAgentResult>, OrchestrationError> {
        let mut handles: Vec<JoinHandle<SubAgentResult>> = target_agent_ids
            .iter()
            .map(|agent_id| self.spawn_execution(agent_id, tenant_id, user_id, thread_id, message))
            .collect();

        let mut pending: FuturesUnordered<_> = handles
            .iter_mut()
            .map(|handle| async move { handle.await })
            .collect();

        let mut failures = Vec::new();
        while let Some(joined) = pending.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => SubAgentResult::failure("unknown", join_error.to_string(), 0),
            };
            if result.success {
                // Winner takes all; in-flight siblings are cancelled.
                drop(pending);
                for handle in &handles {
                    handle.abort();
                }
                return Ok(vec![result]);
            }
            failures.push(result);
        }
        Ok(failures)
    }

    fn spawn_execution(
        &self,
        agent_id: &str,
        tenant_id: &str,
        user_id: &str,
        thread_id: &str,
        message: &str,
    ) -> JoinHandle<SubAgentResult> {
        let manager = self.clone();
        let agent_id = agent_id.to_string();
        let tenant_id = tenant_id.to_string();
        let user_id = user_id.to_string();
        let thread_id = thread_id.to_string();
        let message = message.to_string();
        tokio::spawn(async move {
            manager
                .execute_agent(&agent_id, &tenant_id, &user_id, &thread_id, &message)
                .await
        })
    }

    /// Drive one target agent and package its outcome.
    async fn execute_agent(
        &self,
        agent_id: &str,
        tenant_id: &str,
        user_id: &str,
        thread_id: &str,
        message: &str,
    ) -> SubAgentResult {
        let started = tokio::time::Instant::now();

        let agent = match self.registry.resolve(agent_id).await {
            Ok(agent) => agent,
            Err(error) => {
                return SubAgentResult::failure(
                    agent_id,
                    error.to_string(),
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let task = Task::new(
            agent_id,
            TaskCreateRequest {
                tenant_id: tenant_id.to_string(),
                user_id: user_id.to_string(),
                message_parts: vec![MessagePart::text(message)],
                parent_task_id: Some(thread_id.to_string()),
                skill_name: None,
            },
        );

        let consumed = tokio::time::timeout(self.agent_timeout, async {
            let mut response = String::new();
            let mut final_state = TaskState::Failed;
            let mut error: Option<String> = None;
            let mut stream = agent.process_task(task).await;
            while let Some(event) = stream.next().await {
                match event {
                    TaskEvent::Message { parts, .. } => {
                        for part in parts {
                            if let Some(text) = part.as_text() {
                                response.push_str(text);
                            }
                        }
                    }
                    TaskEvent::Error { message, .. } => error = Some(message),
                    TaskEvent::Done { final_state: state, .. } => final_state = state,
                    TaskEvent::Status { .. } | TaskEvent::Artifact { .. } => {}
                }
            }
            (response, final_state, error)
        })
        .await;

        let latency_ms = started.elapsed().as_millis() as u64;
        match consumed {
            Err(_elapsed) => {
                warn!(agent_id, "Sub-agent execution timed out");
                SubAgentResult::failure(
                    agent_id,
                    format!("timed out after {} ms", self.agent_timeout.as_millis()),
                    latency_ms,
                )
            }
            Ok((response, final_state, error)) => {
                if final_state == TaskState::Completed && !response.is_empty() {
                    SubAgentResult {
                        agent_id: agent_id.to_string(),
                        success: true,
                        response: Some(response),
                        error: None,
                        latency_ms,
                    }
                } else if final_state == TaskState::Completed {
                    SubAgentResult::failure(agent_id, "no response produced", latency_ms)
                } else {
                    SubAgentResult::failure(
                        agent_id,
                        error.unwrap_or_else(|| format!("ended in state {final_state}")),
                        latency_ms,
                    )
                }
            }
        }
    }

    /// Collapse sub-agent results into a single response text.
    #[must_use]
    pub fn synthesize_responses(&self, results: &[SubAgentResult]) -> String {
        if results.is_empty() {
            return "No responses received".to_string();
        }
        let successes: Vec<&SubAgentResult> =
            results.iter().filter(|result| result.success).collect();
        if successes.is_empty() {
            return "All sub-agents failed".to_string();
        }
        if successes.len() == 1 {
            return successes[0].response.clone().unwrap_or_default();
        }
        successes
            .iter()
            .map(|result| {
                format!(
                    "From {}:\n{}",
                    result.agent_id,
                    result.response.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl std::fmt::Debug for OrchestrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationManager")
            .field("agent_timeout", &self.agent_timeout)
            .finish()
    }
}
