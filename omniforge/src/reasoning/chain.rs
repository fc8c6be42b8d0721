//! Append-only reasoning chain for one task.
//!
//! Every model thought, tool call, tool result, and synthesis an agent makes
//! while processing a task is recorded here as a [`ReasoningStep`].
//! Step numbers are assigned by the chain itself and metrics are updated
//! atomically with each append, so the chain is always internally
//! consistent: `metrics.total_steps == steps.len()` and every tool result
//! correlates with exactly one earlier tool call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::event::VisibilityLevel;

/// Errors raised by the reasoning chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The chain already finished; no further steps may be appended.
    #[error("chain '{chain_id}' is {status} and no longer accepts steps")]
    ChainClosed {
        /// The chain that rejected the append.
        chain_id: String,
        /// Its current status.
        status: ChainStatus,
    },
}

/// Lifecycle status of a reasoning chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Steps are being appended.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Suspended, waiting for external input.
    Paused,
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        write!(f, "{name}")
    }
}

/// The kind of a reasoning step. The tag selects which payload is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// A model thought.
    Thinking,
    /// A tool invocation.
    ToolCall,
    /// The observed outcome of a tool invocation.
    ToolResult,
    /// A final synthesis over earlier steps.
    Synthesis,
}

/// Broad classification of a tool, recorded on tool-call steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    /// In-process function.
    Function,
    /// Remote API call.
    Api,
    /// Database query.
    Database,
    /// Filesystem access.
    FileSystem,
    /// Search/index lookup.
    Search,
    /// Anything else.
    Other,
}

/// Visibility attached to a step, with an optional reason for non-default
/// levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisibilityConfig {
    /// The visibility level.
    pub level: VisibilityLevel,
    /// Why the level was chosen, when it deviates from the default.
    pub reason: Option<String>,
}

impl VisibilityConfig {
    /// Visibility at the given level with no reason.
    #[must_use]
    pub fn new(level: VisibilityLevel) -> Self {
        Self {
            level,
            reason: None,
        }
    }
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self::new(VisibilityLevel::Full)
    }
}

/// Payload of a thinking step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingInfo {
    /// The thought content.
    pub content: String,
    /// Model confidence in `[0, 1]`, when reported.
    pub confidence: Option<f64>,
}

/// Payload of a tool-call step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallInfo {
    /// Name of the invoked tool.
    pub tool_name: String,
    /// Classification of the tool.
    pub tool_type: ToolType,
    /// Arguments passed to the tool.
    pub parameters: serde_json::Value,
    /// Id shared with the matching tool-result step.
    pub correlation_id: String,
}

/// Payload of a tool-result step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultInfo {
    /// Id of the tool-call step this result answers.
    pub correlation_id: String,
    /// Whether the tool succeeded.
    pub success: bool,
    /// Result payload on success.
    pub result: Option<serde_json::Value>,
    /// Error message on failure.
    pub error: Option<String>,
}

/// Payload of a synthesis step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisInfo {
    /// The synthesized content.
    pub content: String,
    /// Ids of the steps the synthesis draws on.
    pub sources: Vec<Uuid>,
}

/// Type-specific payload of a reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepPayload {
    /// A model thought.
    Thinking(ThinkingInfo),
    /// A tool invocation.
    ToolCall(ToolCallInfo),
    /// The observed outcome of a tool invocation.
    ToolResult(ToolResultInfo),
    /// A final synthesis over earlier steps.
    Synthesis(SynthesisInfo),
}

impl StepPayload {
    /// The step type this payload belongs to.
    #[must_use]
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Thinking(_) => StepType::Thinking,
            Self::ToolCall(_) => StepType::ToolCall,
            Self::ToolResult(_) => StepType::ToolResult,
            Self::Synthesis(_) => StepType::Synthesis,
        }
    }
}

/// One recorded event in a reasoning chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Stable step identifier.
    pub id: Uuid,
    /// Position in the chain, assigned on append.
    pub step_number: usize,
    /// When the step was recorded.
    pub timestamp: DateTime<Utc>,
    /// Parent step for nested reasoning, if any.
    pub parent_step_id: Option<Uuid>,
    /// Consumer visibility for the step.
    pub visibility: VisibilityConfig,
    /// Tokens consumed producing the step.
    pub tokens_used: u64,
    /// Cost in USD attributed to the step.
    pub cost: f64,
    /// The type-specific payload.
    #[serde(flatten)]
    pub payload: StepPayload,
}

impl ReasoningStep {
    /// Build a step from a payload. The step number is provisional; the
    /// chain reassigns it on append.
    #[must_use]
    pub fn new(payload: StepPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_number: 0,
            timestamp: Utc::now(),
            parent_step_id: None,
            visibility: VisibilityConfig::default(),
            tokens_used: 0,
            cost: 0.0,
            payload,
        }
    }

    /// Set the step visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: VisibilityConfig) -> Self {
        self.visibility = visibility;
        self
    }

    /// Attribute token usage to the step.
    #[must_use]
    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    /// Attribute cost to the step.
    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// The step type, derived from the payload.
    #[must_use]
    pub fn step_type(&self) -> StepType {
        self.payload.step_type()
    }

    /// The tool-call payload, if this is a tool-call step.
    #[must_use]
    pub fn tool_call(&self) -> Option<&ToolCallInfo> {
        match &self.payload {
            StepPayload::ToolCall(info) => Some(info),
            _ => None,
        }
    }

    /// The tool-result payload, if this is a tool-result step.
    #[must_use]
    pub fn tool_result(&self) -> Option<&ToolResultInfo> {
        match &self.payload {
            StepPayload::ToolResult(info) => Some(info),
            _ => None,
        }
    }
}

/// Aggregated metrics over a chain, maintained on every append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainMetrics {
    /// Number of steps in the chain.
    pub total_steps: usize,
    /// Number of thinking + synthesis steps.
    pub llm_calls: usize,
    /// Number of tool-call steps.
    pub tool_calls: usize,
    /// Sum of tokens over all steps.
    pub total_tokens: u64,
    /// Sum of cost over all steps.
    pub total_cost: f64,
}

/// Append-only log of one task's reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningChain {
    /// Chain identifier.
    pub id: String,
    /// Task the chain belongs to.
    pub task_id: String,
    /// Agent driving the chain.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
    /// Lifecycle status.
    pub status: ChainStatus,
    /// Ordered steps.
    pub steps: Vec<ReasoningStep>,
    /// Chains created by delegated sub-agents, referenced by id only.
    pub child_chain_ids: Vec<String>,
    /// Aggregated metrics.
    pub metrics: ChainMetrics,
    /// When the chain started.
    pub started_at: DateTime<Utc>,
    /// When the chain finished, if it has.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReasoningChain {
    /// Create a running chain for a task.
    #[must_use]
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            tenant_id: None,
            status: ChainStatus::Running,
            steps: Vec::new(),
            child_chain_ids: Vec::new(),
            metrics: ChainMetrics::default(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Attach a tenant to the chain.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Append a step, assigning its number and updating metrics.
    ///
    /// The caller's `step_number` is ignored; the chain renumbers on append
    /// so numbering stays contiguous from zero regardless of what callers
    /// pass. Fails once the chain has left [`ChainStatus::Running`].
    pub fn add_step(&mut self, mut step: ReasoningStep) -> Result<&ReasoningStep, ChainError> {
        if self.status != ChainStatus::Running {
            return Err(ChainError::ChainClosed {
                chain_id: self.id.clone(),
                status: self.status,
            });
        }
        step.step_number = self.steps.len();

        self.metrics.total_steps += 1;
        self.metrics.total_tokens += step.tokens_used;
        self.metrics.total_cost += step.cost;
        match step.step_type() {
            StepType::Thinking | StepType::Synthesis => self.metrics.llm_calls += 1,
            StepType::ToolCall => self.metrics.tool_calls += 1,
            StepType::ToolResult => {}
        }

        self.steps.push(step);
        Ok(self.steps.last().expect("step was just pushed"))
    }

    /// Find the tool-call step carrying a correlation id.
    #[must_use]
    pub fn get_step_by_correlation_id(&self, correlation_id: &str) -> Option<&ReasoningStep> {
        self.steps.iter().find(|step| {
            step.tool_call()
                .is_some_and(|info| info.correlation_id == correlation_id)
        })
    }

    /// Link a delegated sub-agent's chain.
    pub fn add_child_chain(&mut self, chain_id: impl Into<String>) {
        let chain_id = chain_id.into();
        if !self.child_chain_ids.contains(&chain_id) {
            self.child_chain_ids.push(chain_id);
        }
    }

    /// Mark the chain finished with the given status.
    pub fn finish(&mut self, status: ChainStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Verify internal consistency: contiguous numbering and matched
    /// correlation pairs. Violations indicate a corrupted chain and should
    /// fail the owning task.
    pub fn verify_integrity(&self) -> Result<(), String> {
        for (index, step) in self.steps.iter().enumerate() {
            if step.step_number != index {
                return Err(format!(
                    "step {index} carries number {}",
                    step.step_number
                ));
            }
        }
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(result) = step.tool_result() {
                let calls = self.steps[..index]
                    .iter()
                    .filter(|earlier| {
                        earlier
                            .tool_call()
                            .is_some_and(|call| call.correlation_id == result.correlation_id)
                    })
                    .count();
                if calls != 1 {
                    return Err(format!(
                        "tool result at step {index} has {calls} matching tool calls for correlation id {}",
                        result.correlation_id
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A reasoning chain shared between the engine, the executor, and the loop
/// driver. One chain belongs to one task; the lock serializes appends.
#[derive(Debug, Clone)]
pub struct SharedChain {
    id: String,
    inner: Arc<Mutex<ReasoningChain>>,
}

impl SharedChain {
    /// Wrap a chain for shared access.
    #[must_use]
    pub fn new(chain: ReasoningChain) -> Self {
        Self {
            id: chain.id.clone(),
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    /// Append a step, returning a clone of the renumbered step.
    pub async fn add_step(&self, step: ReasoningStep) -> Result<ReasoningStep, ChainError> {
        let mut chain = self.inner.lock().await;
        chain.add_step(step).cloned()
    }

    /// Link a delegated sub-agent's chain.
    pub async fn add_child_chain(&self, chain_id: impl Into<String>) {
        self.inner.lock().await.add_child_chain(chain_id);
    }

    /// Mark the chain finished.
    pub async fn finish(&self, status: ChainStatus) {
        self.inner.lock().await.finish(status);
    }

    /// The chain id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current metrics snapshot.
    pub async fn metrics(&self) -> ChainMetrics {
        self.inner.lock().await.metrics
    }

    /// Full snapshot of the chain.
    pub async fn snapshot(&self) -> ReasoningChain {
        self.inner.lock().await.clone()
    }
}
