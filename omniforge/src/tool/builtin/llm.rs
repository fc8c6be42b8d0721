//! The synthetic `llm` tool.
//!
//! Model calls flow through the tool layer like any other call so they get
//! the same retry, timeout, rate-limit, and chain treatment. The actual
//! completion transport lives behind [`CompletionBackend`]; production
//! deployments plug in a provider client, tests use
//! [`MockCompletionBackend`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::reasoning::chain::ToolType;
use crate::tool::{
    JsonObject, RetryConfig, Tool, ToolCallContext, ToolDefinition, ToolExecutionError,
    ToolParameter, ToolResult,
};

/// A completion request as the llm tool forwards it.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Raw prompt, when the caller supplied one.
    pub prompt: Option<String>,
    /// Chat messages, when the caller supplied a list.
    pub messages: Option<Vec<Value>>,
    /// System prompt.
    pub system: Option<String>,
    /// Model to use.
    pub model: String,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Completion token cap.
    pub max_tokens: Option<u64>,
}

/// A completion from the backend.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// The completion text.
    pub text: String,
    /// Tokens consumed, when the provider reports them.
    pub tokens_used: u64,
    /// Cost in USD, when the provider reports it.
    pub cost_usd: f64,
}

/// Transport for model completions.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Produce a completion.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ToolExecutionError>;
}

/// The `llm` tool over a completion backend.
pub struct LlmTool {
    definition: ToolDefinition,
    backend: Arc<dyn CompletionBackend>,
}

impl LlmTool {
    /// The llm tool over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        let definition = ToolDefinition::new("llm", ToolType::Api, "Ask the language model")
            .with_parameter(ToolParameter::optional("prompt", "string", "Raw prompt"))
            .with_parameter(ToolParameter::optional("messages", "array", "Chat messages"))
            .with_parameter(ToolParameter::optional("system", "string", "System prompt"))
            .with_parameter(ToolParameter::optional("model", "string", "Model name"))
            .with_parameter(ToolParameter::optional(
                "temperature",
                "number",
                "Sampling temperature",
            ))
            .with_parameter(ToolParameter::optional(
                "max_tokens",
                "number",
                "Completion token cap",
            ))
            .with_timeout_ms(120_000)
            .with_retry_config(RetryConfig {
                max_retries: 3,
                backoff_ms: 1000,
                backoff_multiplier: 2.0,
                retryable_errors: Vec::new(),
            });
        Self {
            definition,
            backend,
        }
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _context: &ToolCallContext,
        arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        let request = CompletionRequest {
            prompt: arguments
                .get("prompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            messages: arguments
                .get("messages")
                .and_then(Value::as_array)
                .cloned(),
            system: arguments
                .get("system")
                .and_then(Value::as_str)
                .map(str::to_string),
            model: arguments
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(crate::config::DEFAULT_LLM_MODEL)
                .to_string(),
            temperature: arguments.get("temperature").and_then(Value::as_f64),
            max_tokens: arguments.get("max_tokens").and_then(Value::as_u64),
        };

        let response = self.backend.complete(request).await?;
        Ok(
            ToolResult::ok(serde_json::json!({ "response": response.text }))
                .with_tokens(response.tokens_used)
                .with_cost(response.cost_usd),
        )
    }
}

/// Backend returning canned responses in sequence, cycling when exhausted.
/// Intended for tests and local dry runs.
#[derive(Debug)]
pub struct MockCompletionBackend {
    responses: Vec<String>,
    next_index: AtomicUsize,
}

impl MockCompletionBackend {
    /// Backend cycling through `responses`.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            next_index: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionBackend for MockCompletionBackend {
    async fn complete(
        &self,
        _request: CompletionRequest,
    ) -> Result<CompletionResponse, ToolExecutionError> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let text = self
            .responses
            .get(index % self.responses.len().max(1))
            .cloned()
            .unwrap_or_default();
        Ok(CompletionResponse {
            text,
            tokens_used: 0,
            cost_usd: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::arguments;

    #[tokio::test]
    async fn forwards_prompt_and_model_to_backend() {
        struct CapturingBackend {
            captured: std::sync::Mutex<Option<CompletionRequest>>,
        }

        #[async_trait]
        impl CompletionBackend for CapturingBackend {
            async fn complete(
                &self,
                request: CompletionRequest,
            ) -> Result<CompletionResponse, ToolExecutionError> {
                *self.captured.lock().expect("lock") = Some(request);
                Ok(CompletionResponse {
                    text: "ok".to_string(),
                    tokens_used: 12,
                    cost_usd: 0.001,
                })
            }
        }

        let backend = Arc::new(CapturingBackend {
            captured: std::sync::Mutex::new(None),
        });
        let tool = LlmTool::new(backend.clone());
        let context = ToolCallContext::new("task", "agent");

        let result = tool
            .execute(
                &context,
                arguments(serde_json::json!({
                    "prompt": "hello",
                    "model": "test-model",
                    "max_tokens": 100
                })),
            )
            .await
            .expect("execute");

        assert!(result.success);
        assert_eq!(result.result, Some(serde_json::json!({"response": "ok"})));
        assert_eq!(result.tokens_used, 12);

        let request = backend.captured.lock().expect("lock").clone().expect("request");
        assert_eq!(request.prompt.as_deref(), Some("hello"));
        assert_eq!(request.model, "test-model");
        assert_eq!(request.max_tokens, Some(100));
    }

    #[tokio::test]
    async fn mock_backend_cycles_responses() {
        let backend = MockCompletionBackend::new(vec!["first".to_string(), "second".to_string()]);
        let one = backend
            .complete(CompletionRequest::default())
            .await
            .expect("complete");
        let two = backend
            .complete(CompletionRequest::default())
            .await
            .expect("complete");
        let three = backend
            .complete(CompletionRequest::default())
            .await
            .expect("complete");
        assert_eq!(one.text, "first");
        assert_eq!(two.text, "second");
        assert_eq!(three.text, "first");
    }
}
