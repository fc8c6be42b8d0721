//! Tool contract: definitions, call context, results, and the [`Tool`]
//! trait concrete tools implement.
//!
//! Concrete variants (llm, skill, sub-agent, file tools, ...) live behind
//! the [`Tool`] trait and are registered with a
//! [`ToolRegistry`](registry::ToolRegistry) at startup. The
//! [`ToolExecutor`](executor::ToolExecutor) is the only component that
//! invokes them.

pub mod builtin;
pub mod executor;
pub mod registry;

pub use executor::{CostTracker, RateLimiter, ToolExecutor};
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::event::VisibilityLevel;
use crate::reasoning::chain::ToolType;

/// Errors surfaced by the tool layer.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No tool with the requested name is registered.
    #[error("tool '{0}' not found")]
    NotFound(String),

    /// The supplied arguments do not match the tool's declared parameters.
    #[error("invalid arguments for tool '{tool_name}': {message}")]
    Validation {
        /// The tool that rejected the arguments.
        tool_name: String,
        /// What was wrong.
        message: String,
    },

    /// The tool exceeded its hard deadline. Never retried.
    #[error("tool '{tool_name}' timed out after {timeout_ms} ms")]
    Timeout {
        /// The tool that timed out.
        tool_name: String,
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// The tenant exhausted its rate allowance for the tool.
    #[error("rate limit exceeded for tenant '{tenant_id}' on tool '{tool_name}'")]
    RateLimitExceeded {
        /// The throttled tenant.
        tenant_id: String,
        /// The throttled tool.
        tool_name: String,
    },

    /// The reasoning chain refused to record the call.
    #[error("chain error: {0}")]
    Chain(String),

    /// A failure inside the tool implementation.
    #[error("{0}")]
    Execution(#[from] ToolExecutionError),
}

/// A failure raised by a tool implementation during execution.
///
/// The variant name is what retry patterns match against, so transient
/// transport problems keep their conventional names.
#[derive(Debug, Clone, Error)]
pub enum ToolExecutionError {
    /// Operation-level timeout inside the tool.
    #[error("TimeoutError: {0}")]
    Timeout(String),
    /// Connection could not be established or was dropped.
    #[error("ConnectionError: {0}")]
    Connection(String),
    /// Generic network failure.
    #[error("NetworkError: {0}")]
    Network(String),
    /// Transient failure expected to clear on its own.
    #[error("TemporaryError: {0}")]
    Temporary(String),
    /// The upstream throttled the request.
    #[error("ThrottleError: {0}")]
    Throttle(String),
    /// The upstream reported a rate limit.
    #[error("RateLimitError: {0}")]
    RateLimit(String),
    /// The upstream service is unavailable.
    #[error("ServiceUnavailableError: {0}")]
    ServiceUnavailable(String),
    /// Any other failure, with a caller-supplied kind name.
    #[error("{kind}: {message}")]
    Other {
        /// Error kind name used for retry matching.
        kind: String,
        /// Failure description.
        message: String,
    },
}

impl ToolExecutionError {
    /// The error's kind name, matched (case-insensitively) against retry
    /// patterns.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Timeout(_) => "TimeoutError",
            Self::Connection(_) => "ConnectionError",
            Self::Network(_) => "NetworkError",
            Self::Temporary(_) => "TemporaryError",
            Self::Throttle(_) => "ThrottleError",
            Self::RateLimit(_) => "RateLimitError",
            Self::ServiceUnavailable(_) => "ServiceUnavailableError",
            Self::Other { kind, .. } => kind,
        }
    }
}

/// A declared parameter of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// JSON type name ("string", "number", "boolean", "object", "array").
    pub param_type: String,
    /// Whether the parameter must be present.
    pub required: bool,
    /// Human-readable description.
    pub description: String,
}

impl ToolParameter {
    /// A required parameter.
    #[must_use]
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            required: true,
            description: description.to_string(),
        }
    }

    /// An optional parameter.
    #[must_use]
    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            param_type: param_type.to_string(),
            required: false,
            description: description.to_string(),
        }
    }
}

/// Retry policy attached to a tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Initial backoff in milliseconds.
    pub backoff_ms: u64,
    /// Multiplier applied per attempt.
    pub backoff_multiplier: f64,
    /// Error-kind substrings that qualify for retry. Empty means the
    /// default transient set (timeout/connection/network/temporary/
    /// throttle/rate-limit/service-unavailable).
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
            retryable_errors: Vec::new(),
        }
    }
}

/// Static description of a tool: identity, parameters, deadline, retry
/// policy, and default step visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Broad tool classification.
    pub tool_type: ToolType,
    /// What the tool does, shown to the model.
    pub description: String,
    /// Declared parameters.
    pub parameters: Vec<ToolParameter>,
    /// Default visibility of the chain steps the executor records.
    pub default_visibility: VisibilityLevel,
    /// Hard execution deadline in milliseconds.
    pub timeout_ms: u64,
    /// Retry policy.
    pub retry_config: RetryConfig,
}

impl ToolDefinition {
    /// A function tool with default timeout, retries, and visibility.
    #[must_use]
    pub fn new(name: &str, tool_type: ToolType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            tool_type,
            description: description.to_string(),
            parameters: Vec::new(),
            default_visibility: VisibilityLevel::Full,
            timeout_ms: 30_000,
            retry_config: RetryConfig::default(),
        }
    }

    /// Add a declared parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Override the execution deadline.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Override the default step visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: VisibilityLevel) -> Self {
        self.default_visibility = visibility;
        self
    }

    /// Validate arguments against the declared parameters: all required
    /// parameters present, no unknown names.
    pub fn validate(&self, arguments: &JsonObject) -> Result<(), ToolError> {
        for parameter in self.parameters.iter().filter(|p| p.required) {
            if !arguments.contains_key(&parameter.name) {
                return Err(ToolError::Validation {
                    tool_name: self.name.clone(),
                    message: format!("missing required parameter '{}'", parameter.name),
                });
            }
        }
        for name in arguments.keys() {
            if !self.parameters.iter().any(|p| &p.name == name) {
                return Err(ToolError::Validation {
                    tool_name: self.name.clone(),
                    message: format!("unknown parameter '{name}'"),
                });
            }
        }
        Ok(())
    }
}

/// JSON object used for tool arguments.
pub type JsonObject = serde_json::Map<String, Value>;

/// Context carried through every tool call, used for rate limiting, cost
/// accounting, and chain correlation.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    /// Id shared by the recorded tool-call and tool-result steps.
    pub correlation_id: String,
    /// Task the call belongs to.
    pub task_id: String,
    /// Agent making the call.
    pub agent_id: String,
    /// Owning tenant, when known.
    pub tenant_id: Option<String>,
    /// Chain the call is recorded in, when known.
    pub chain_id: Option<String>,
}

impl ToolCallContext {
    /// Context with a fresh correlation id.
    #[must_use]
    pub fn new(task_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            tenant_id: None,
            chain_id: None,
        }
    }

    /// Attach a tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attach a chain id.
    #[must_use]
    pub fn with_chain(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = Some(chain_id.into());
        self
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool succeeded.
    pub success: bool,
    /// Result payload on success.
    pub result: Option<Value>,
    /// Error message on failure.
    pub error: Option<String>,
    /// Wall-clock duration of the (final) attempt in milliseconds.
    pub duration_ms: u64,
    /// Tokens consumed by the call.
    pub tokens_used: u64,
    /// Cost in USD attributed to the call.
    pub cost_usd: f64,
    /// Number of retries performed before this outcome.
    pub retry_count: u32,
}

impl ToolResult {
    /// A successful result carrying a payload.
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            ..Self::default()
        }
    }

    /// A failed result carrying an error message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Attribute token usage to the result.
    #[must_use]
    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }

    /// Attribute cost to the result.
    #[must_use]
    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }
}

/// The contract every concrete tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's static definition.
    fn definition(&self) -> &ToolDefinition;

    /// Validate arguments before execution. The default checks the declared
    /// parameters; tools with richer rules override.
    fn validate_arguments(&self, arguments: &JsonObject) -> Result<(), ToolError> {
        self.definition().validate(arguments)
    }

    /// Execute the tool. Transport-level failures are returned as
    /// [`ToolExecutionError`] so the executor can apply the retry policy;
    /// domain-level failures go into a failed [`ToolResult`].
    async fn execute(
        &self,
        context: &ToolCallContext,
        arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError>;
}

/// Convenience: build a [`JsonObject`] from a serde_json object literal.
/// A non-object value is wrapped under a `value` key.
#[must_use]
pub fn arguments(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = JsonObject::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
