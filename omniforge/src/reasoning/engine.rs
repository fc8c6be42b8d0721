//! Reasoning engine: the agent-facing wrapper around a chain.
//!
//! Agents drive their reasoning through this engine rather than touching
//! the chain or the executor directly: thinking and synthesis steps are
//! appended here, model calls are recorded as call/result pairs on the
//! synthetic `llm` tool, and tool calls are routed through the
//! [`ToolExecutor`] with a fresh correlation id per call.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::chain::{
    ChainError, ChainStatus, ReasoningStep, SharedChain, StepPayload, SynthesisInfo,
    ThinkingInfo,
};
use super::events::{ChainEvent, ChainEventSink};
use crate::config::DEFAULT_LLM_MODEL;
use crate::event::VisibilityLevel;
use crate::tool::{JsonObject, ToolCallContext, ToolDefinition, ToolError, ToolExecutor, ToolResult};

/// Errors raised by the reasoning engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Neither `prompt` nor `messages` was provided to a model call, or
    /// both were.
    #[error("either 'prompt' or 'messages' must be provided (and not both)")]
    ArgumentRequired,

    /// The chain refused an append.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The executor refused or failed the call.
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Identity of the task an engine reasons for.
#[derive(Debug, Clone)]
pub struct TaskRef {
    /// Task id.
    pub task_id: String,
    /// Agent id.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
}

/// A model call request: exactly one of `prompt` or `messages`.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    /// Raw prompt text.
    pub prompt: Option<String>,
    /// Chat-message list, as provider-shaped JSON.
    pub messages: Option<Vec<Value>>,
    /// System prompt.
    pub system: Option<String>,
    /// Model override; the engine default applies when absent.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u64>,
}

impl LlmRequest {
    /// Request from a raw prompt.
    #[must_use]
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Request from a message list.
    #[must_use]
    pub fn messages(messages: Vec<Value>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token cap.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A tool call's outcome together with the two chain steps it produced.
#[derive(Debug, Clone)]
pub struct ToolCallOutcome {
    /// The underlying tool result.
    pub result: ToolResult,
    /// The recorded tool-call step.
    pub call_step: ReasoningStep,
    /// The recorded tool-result step.
    pub result_step: ReasoningStep,
}

impl ToolCallOutcome {
    /// Whether the tool succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.result.success
    }

    /// The result payload, if any.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.result.result.as_ref()
    }

    /// The error message, if the call failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.result.error.as_deref()
    }

    /// Id of the recorded result step.
    #[must_use]
    pub fn step_id(&self) -> String {
        self.result_step.id.to_string()
    }
}

/// Agent-facing wrapper around one task's reasoning chain.
pub struct ReasoningEngine {
    chain: SharedChain,
    executor: Arc<ToolExecutor>,
    task: TaskRef,
    default_llm_model: String,
    events: Option<ChainEventSink>,
}

impl ReasoningEngine {
    /// Engine over a chain and executor for one task.
    #[must_use]
    pub fn new(chain: SharedChain, executor: Arc<ToolExecutor>, task: TaskRef) -> Self {
        Self {
            chain,
            executor,
            task,
            default_llm_model: DEFAULT_LLM_MODEL.to_string(),
            events: None,
        }
    }

    /// Override the default model for [`ReasoningEngine::call_llm`].
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_llm_model = model.into();
        self
    }

    /// Attach a chain-event sink and announce the chain.
    #[must_use]
    pub fn with_event_sink(mut self, sink: ChainEventSink) -> Self {
        let _ = sink.send(ChainEvent::started(&self.task.task_id, self.chain.id()));
        self.events = Some(sink);
        self
    }

    /// The chain this engine records into.
    #[must_use]
    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    /// The executor this engine routes tool calls through.
    #[must_use]
    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Record a thinking step.
    pub async fn add_thinking(
        &self,
        content: impl Into<String>,
        confidence: Option<f64>,
    ) -> Result<ReasoningStep, EngineError> {
        let step = self
            .chain
            .add_step(ReasoningStep::new(StepPayload::Thinking(ThinkingInfo {
                content: content.into(),
                confidence,
            })))
            .await?;
        self.publish_step(&step).await;
        Ok(step)
    }

    /// Record a synthesis step drawing on earlier steps. Source ids that do
    /// not parse as step ids are dropped.
    pub async fn add_synthesis(
        &self,
        content: impl Into<String>,
        source_step_ids: &[String],
    ) -> Result<ReasoningStep, EngineError> {
        let sources = source_step_ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .collect();
        let step = self
            .chain
            .add_step(ReasoningStep::new(StepPayload::Synthesis(SynthesisInfo {
                content: content.into(),
                sources,
            })))
            .await?;
        self.publish_step(&step).await;
        Ok(step)
    }

    /// Ask the model for a completion, recorded as a call/result pair on
    /// the synthetic `llm` tool.
    pub async fn call_llm(&self, request: LlmRequest) -> Result<ToolCallOutcome, EngineError> {
        if request.prompt.is_some() == request.messages.is_some() {
            return Err(EngineError::ArgumentRequired);
        }

        let mut arguments = JsonObject::new();
        if let Some(prompt) = request.prompt {
            arguments.insert("prompt".to_string(), Value::String(prompt));
        }
        if let Some(messages) = request.messages {
            arguments.insert("messages".to_string(), Value::Array(messages));
        }
        if let Some(system) = request.system {
            arguments.insert("system".to_string(), Value::String(system));
        }
        if let Some(temperature) = request.temperature {
            arguments.insert("temperature".to_string(), Value::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            arguments.insert("max_tokens".to_string(), Value::from(max_tokens));
        }
        arguments.insert(
            "model".to_string(),
            Value::String(
                request
                    .model
                    .unwrap_or_else(|| self.default_llm_model.clone()),
            ),
        );

        self.call_tool("llm", arguments, None).await
    }

    /// Invoke a tool through the executor, returning the result together
    /// with the chain steps just appended.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: JsonObject,
        visibility: Option<VisibilityLevel>,
    ) -> Result<ToolCallOutcome, EngineError> {
        let context = self.build_context();
        debug!(tool_name, correlation_id = %context.correlation_id, "Engine tool call");

        let result = self
            .executor
            .execute_with_visibility(tool_name, arguments, &context, &self.chain, visibility)
            .await?;

        let snapshot = self.chain.snapshot().await;
        let call_step = snapshot
            .get_step_by_correlation_id(&context.correlation_id)
            .cloned()
            .ok_or_else(|| EngineError::Chain(ChainError::ChainClosed {
                chain_id: snapshot.id.clone(),
                status: snapshot.status,
            }))?;
        let result_step = snapshot
            .steps
            .iter()
            .rev()
            .find(|step| {
                step.tool_result()
                    .is_some_and(|info| info.correlation_id == context.correlation_id)
            })
            .cloned()
            .ok_or_else(|| EngineError::Chain(ChainError::ChainClosed {
                chain_id: snapshot.id.clone(),
                status: snapshot.status,
            }))?;

        self.publish_step(&call_step).await;
        self.publish_step(&result_step).await;

        Ok(ToolCallOutcome {
            result,
            call_step,
            result_step,
        })
    }

    /// Definitions of all registered tools. A tool whose definition lookup
    /// fails is skipped rather than aborting enumeration.
    #[must_use]
    pub fn get_available_tools(&self) -> Vec<ToolDefinition> {
        self.executor
            .registry()
            .list_tools()
            .into_iter()
            .filter_map(|name| self.executor.registry().get_definition(&name).ok())
            .collect()
    }

    /// Finish the chain successfully and publish the final metrics.
    pub async fn complete(&self) {
        self.chain.finish(ChainStatus::Completed).await;
        if let Some(sink) = &self.events {
            let snapshot = self.chain.snapshot().await;
            let _ = sink.send(ChainEvent::completed(
                &self.task.task_id,
                &snapshot.id,
                snapshot.metrics,
            ));
        }
    }

    /// Fail the chain and publish the failure.
    pub async fn fail(&self, error_code: &str, error_message: &str) {
        self.chain.finish(ChainStatus::Failed).await;
        if let Some(sink) = &self.events {
            let chain_id = self.chain.id();
            let _ = sink.send(ChainEvent::failed(
                &self.task.task_id,
                chain_id,
                error_code,
                error_message,
            ));
        }
    }

    fn build_context(&self) -> ToolCallContext {
        let mut context = ToolCallContext::new(&self.task.task_id, &self.task.agent_id);
        if let Some(tenant_id) = &self.task.tenant_id {
            context = context.with_tenant(tenant_id);
        }
        context
    }

    async fn publish_step(&self, step: &ReasoningStep) {
        if let Some(sink) = &self.events {
            let chain_id = self.chain.id();
            let _ = sink.send(ChainEvent::step(&self.task.task_id, chain_id, step.clone()));
        }
    }
}

impl std::fmt::Debug for ReasoningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningEngine")
            .field("task", &self.task)
            .field("default_llm_model", &self.default_llm_model)
            .finish()
    }
}
