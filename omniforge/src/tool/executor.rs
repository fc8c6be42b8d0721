//! Unified tool execution with retry, timeout, rate limiting, skill
//! restriction enforcement, and reasoning-chain integration.
//!
//! The executor is the single choke point between the reasoning loop and
//! tool implementations: every call is validated, checked against the
//! active skill's restrictions, rate limited, executed under a hard
//! deadline with retries, cost-tracked, and recorded in the chain as a
//! correlated tool-call / tool-result step pair.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{
    JsonObject, RetryConfig, Tool, ToolCallContext, ToolError, ToolExecutionError, ToolRegistry,
    ToolResult,
};
use crate::reasoning::chain::{
    ReasoningStep, SharedChain, StepPayload, ToolCallInfo, ToolResultInfo, VisibilityConfig,
};
use crate::skill::{Skill, SkillContext, SkillError};

/// Per-tenant request throttling, shared process-wide.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check whether the tenant may execute the tool now.
    async fn check_limit(&self, tenant_id: &str, tool_name: &str) -> Result<(), ToolError>;
}

/// Cost accounting for tool executions, shared process-wide.
#[async_trait]
pub trait CostTracker: Send + Sync {
    /// Record cost and token usage for a finished tool execution.
    async fn track_cost(&self, task_id: &str, tool_name: &str, cost_usd: f64, tokens_used: u64);
}

/// Default transient-error kinds retried when a tool configures none.
const DEFAULT_RETRYABLE_PATTERNS: [&str; 7] = [
    "Timeout",
    "Connection",
    "Network",
    "Temporary",
    "Throttle",
    "RateLimit",
    "ServiceUnavailable",
];

struct ActiveSkill {
    skill: Skill,
    context: SkillContext,
}

/// Unified executor for tool execution.
///
/// One executor serves one task's loop; the skill activation stack is
/// per-executor state.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    cost_tracker: Option<Arc<dyn CostTracker>>,
    skill_stack: Mutex<Vec<ActiveSkill>>,
}

impl ToolExecutor {
    /// Executor over a registry, with no rate limiting or cost tracking.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            rate_limiter: None,
            cost_tracker: None,
            skill_stack: Mutex::new(Vec::new()),
        }
    }

    /// Attach a rate limiter.
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Attach a cost tracker.
    #[must_use]
    pub fn with_cost_tracker(mut self, cost_tracker: Arc<dyn CostTracker>) -> Self {
        self.cost_tracker = Some(cost_tracker);
        self
    }

    /// The registry this executor resolves tools from.
    #[must_use]
    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Name of the skill currently on top of the activation stack.
    #[must_use]
    pub fn active_skill_name(&self) -> Option<String> {
        let stack = self.skill_stack.lock().expect("skill stack lock");
        stack.last().map(|active| active.skill.name().to_string())
    }

    /// Depth of the activation stack.
    #[must_use]
    pub fn skill_stack_depth(&self) -> usize {
        self.skill_stack.lock().expect("skill stack lock").len()
    }

    /// Activate a skill, pushing it onto the stack.
    ///
    /// The restrictions persist across tool execution errors until the
    /// skill is explicitly deactivated.
    pub fn activate_skill(&self, skill: Skill) -> Result<(), SkillError> {
        let mut stack = self.skill_stack.lock().expect("skill stack lock");
        if stack.iter().any(|active| active.skill.name() == skill.name()) {
            return Err(SkillError::AlreadyActive(skill.name().to_string()));
        }
        let context = SkillContext::new(&skill);
        info!(
            skill_name = skill.name(),
            stack_depth = stack.len() + 1,
            allowed_tools = ?skill.metadata.allowed_tools,
            "Skill activated"
        );
        stack.push(ActiveSkill { skill, context });
        Ok(())
    }

    /// Deactivate a skill. LIFO discipline: only the top of the stack may
    /// be deactivated; a mismatch leaves the stack unchanged.
    pub fn deactivate_skill(&self, skill_name: &str) -> Result<(), SkillError> {
        let mut stack = self.skill_stack.lock().expect("skill stack lock");
        if !stack.iter().any(|active| active.skill.name() == skill_name) {
            return Err(SkillError::NotActive(skill_name.to_string()));
        }
        let top = stack.last().map(|active| active.skill.name().to_string());
        if top.as_deref() != Some(skill_name) {
            return Err(SkillError::StackViolation {
                skill_name: skill_name.to_string(),
                stack_top: top,
            });
        }
        stack.pop();
        info!(
            skill_name,
            stack_depth = stack.len(),
            "Skill deactivated"
        );
        Ok(())
    }

    /// Execute a tool with full validation, restriction, retry, and chain
    /// integration.
    ///
    /// Skill-restriction violations come back as a *failed* [`ToolResult`]
    /// (recorded in the chain) so the reasoning loop can observe and adapt;
    /// lookup, validation, rate-limit, and timeout failures are errors.
    pub async fn execute(
        &self,
        tool_name: &str,
        arguments: JsonObject,
        context: &ToolCallContext,
        chain: &SharedChain,
    ) -> Result<ToolResult, ToolError> {
        self.execute_with_visibility(tool_name, arguments, context, chain, None)
            .await
    }

    /// [`ToolExecutor::execute`] with the recorded steps' visibility forced
    /// to `visibility_override` instead of the tool's default.
    pub async fn execute_with_visibility(
        &self,
        tool_name: &str,
        mut arguments: JsonObject,
        context: &ToolCallContext,
        chain: &SharedChain,
        visibility_override: Option<crate::event::VisibilityLevel>,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.registry.get(tool_name)?;
        tool.validate_arguments(&arguments)?;

        let definition = tool.definition().clone();
        let visibility =
            VisibilityConfig::new(visibility_override.unwrap_or(definition.default_visibility));

        // Skill restriction check against the top of the activation stack.
        if let Err(violation) = self.check_skill_restrictions(tool_name, &arguments) {
            warn!(
                tool_name,
                error = %violation,
                "Skill restriction blocked tool execution"
            );
            let result = ToolResult::failed(violation.to_string());
            self.record_call_pair(chain, &definition, &arguments, context, &result, &visibility)
                .await;
            return Ok(result);
        }

        if let (Some(limiter), Some(tenant_id)) = (&self.rate_limiter, &context.tenant_id) {
            limiter.check_limit(tenant_id, tool_name).await?;
        }

        chain
            .add_step(
                ReasoningStep::new(StepPayload::ToolCall(ToolCallInfo {
                    tool_name: definition.name.clone(),
                    tool_type: definition.tool_type,
                    parameters: Value::Object(arguments.clone()),
                    correlation_id: context.correlation_id.clone(),
                }))
                .with_visibility(visibility.clone()),
            )
            .await
            .map_err(|e| ToolError::Chain(e.to_string()))?;

        let outcome = self
            .execute_with_retries(tool.as_ref(), &definition, &mut arguments, context)
            .await;

        let result = match outcome {
            Ok(result) => result,
            Err(timeout) => {
                // The timeout is terminal, but the chain still gets its
                // result step so every tool call stays correlated.
                self.record_result_step(chain, context, &ToolResult::failed(timeout.to_string()), &visibility)
                    .await;
                return Err(timeout);
            }
        };

        if let Some(tracker) = &self.cost_tracker {
            tracker
                .track_cost(
                    &context.task_id,
                    &definition.name,
                    result.cost_usd,
                    result.tokens_used,
                )
                .await;
        }

        self.record_result_step(chain, context, &result, &visibility)
            .await;

        // A result that names a sub-chain links it to this task's chain.
        if let Some(child_id) = result
            .result
            .as_ref()
            .and_then(|value| value.get("sub_chain_id"))
            .and_then(|value| value.as_str())
        {
            chain.add_child_chain(child_id).await;
        }

        Ok(result)
    }

    fn check_skill_restrictions(
        &self,
        tool_name: &str,
        arguments: &JsonObject,
    ) -> Result<(), SkillError> {
        let stack = self.skill_stack.lock().expect("skill stack lock");
        let Some(active) = stack.last() else {
            return Ok(());
        };
        active.context.check_tool_allowed(tool_name)?;
        active.context.check_tool_arguments(tool_name, arguments)
    }

    async fn record_call_pair(
        &self,
        chain: &SharedChain,
        definition: &super::ToolDefinition,
        arguments: &JsonObject,
        context: &ToolCallContext,
        result: &ToolResult,
        visibility: &VisibilityConfig,
    ) {
        let call = ReasoningStep::new(StepPayload::ToolCall(ToolCallInfo {
            tool_name: definition.name.clone(),
            tool_type: definition.tool_type,
            parameters: Value::Object(arguments.clone()),
            correlation_id: context.correlation_id.clone(),
        }))
        .with_visibility(visibility.clone());
        if let Err(error) = chain.add_step(call).await {
            warn!(%error, "Failed to record tool call step");
            return;
        }
        self.record_result_step(chain, context, result, visibility)
            .await;
    }

    async fn record_result_step(
        &self,
        chain: &SharedChain,
        context: &ToolCallContext,
        result: &ToolResult,
        visibility: &VisibilityConfig,
    ) {
        let step = ReasoningStep::new(StepPayload::ToolResult(ToolResultInfo {
            correlation_id: context.correlation_id.clone(),
            success: result.success,
            result: result.result.clone(),
            error: result.error.clone(),
        }))
        .with_visibility(visibility.clone())
        .with_tokens(result.tokens_used)
        .with_cost(result.cost_usd);
        if let Err(error) = chain.add_step(step).await {
            warn!(%error, "Failed to record tool result step");
        }
    }

    /// Run the tool under its deadline with the configured retry policy.
    ///
    /// Returns `Err` only for the hard timeout, which is never retried.
    /// Every other failure path comes back as a failed [`ToolResult`].
    async fn execute_with_retries(
        &self,
        tool: &dyn Tool,
        definition: &super::ToolDefinition,
        arguments: &mut JsonObject,
        context: &ToolCallContext,
    ) -> Result<ToolResult, ToolError> {
        let retry_config = &definition.retry_config;
        let deadline = Duration::from_millis(definition.timeout_ms);
        let mut retries_used: u32 = 0;

        for attempt in 0..=retry_config.max_retries {
            let started = tokio::time::Instant::now();
            let attempt_result =
                tokio::time::timeout(deadline, tool.execute(context, arguments.clone())).await;

            match attempt_result {
                Err(_elapsed) => {
                    return Err(ToolError::Timeout {
                        tool_name: definition.name.clone(),
                        timeout_ms: definition.timeout_ms,
                    });
                }
                Ok(Ok(mut result)) => {
                    result.retry_count = retries_used;
                    if result.duration_ms == 0 {
                        result.duration_ms = started.elapsed().as_millis() as u64;
                    }
                    return Ok(result);
                }
                Ok(Err(error)) => {
                    let retryable = is_retryable(error.kind(), retry_config);
                    if !retryable || attempt >= retry_config.max_retries {
                        debug!(
                            tool_name = definition.name,
                            error = %error,
                            retries_used,
                            "Tool execution failed"
                        );
                        let mut result = ToolResult::failed(error.to_string());
                        result.duration_ms = started.elapsed().as_millis() as u64;
                        result.retry_count = retries_used;
                        return Ok(result);
                    }
                    retries_used += 1;

                    let delay = match extract_rate_limit_wait(&error.to_string()) {
                        Some(hinted) => {
                            // Providers name the wait they want; honour it
                            // plus a small buffer, and shrink the next llm
                            // attempt so it fits under the limit.
                            if definition.name == "llm" {
                                reduce_max_tokens(arguments);
                            }
                            hinted + Duration::from_millis(500)
                        }
                        None => backoff_delay(retry_config, attempt),
                    };
                    debug!(
                        tool_name = definition.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying tool execution"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Ok(ToolResult::failed("tool execution failed after retries"))
    }
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("registry", &self.registry)
            .field("skill_stack_depth", &self.skill_stack_depth())
            .finish()
    }
}

fn is_retryable(error_kind: &str, retry_config: &RetryConfig) -> bool {
    let kind = error_kind.to_lowercase();
    if retry_config.retryable_errors.is_empty() {
        return DEFAULT_RETRYABLE_PATTERNS
            .iter()
            .any(|pattern| kind.contains(&pattern.to_lowercase()));
    }
    retry_config
        .retryable_errors
        .iter()
        .any(|pattern| kind.contains(&pattern.to_lowercase()))
}

fn backoff_delay(retry_config: &RetryConfig, attempt: u32) -> Duration {
    let millis =
        retry_config.backoff_ms as f64 * retry_config.backoff_multiplier.powi(attempt as i32);
    Duration::from_millis(millis as u64)
}

/// Parse a provider wait hint out of a rate-limit error message, e.g.
/// "Please try again in 21s", "try again in 810ms", "try again in 2m".
fn extract_rate_limit_wait(error_message: &str) -> Option<Duration> {
    use std::sync::LazyLock;

    use regex::Regex;

    static SECONDS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"try again in (\d+(?:\.\d+)?)s(?:[^\w]|$)").expect("valid regex")
    });
    static MILLIS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"try again in (\d+(?:\.\d+)?)ms").expect("valid regex"));
    static MINUTES: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"try again in (\d+(?:\.\d+)?)m(?:[^\ws]|$)").expect("valid regex")
    });

    let parse = |captures: regex::Captures<'_>| captures[1].parse::<f64>().ok();

    if let Some(value) = MILLIS.captures(error_message).and_then(parse) {
        return Some(Duration::from_secs_f64(value / 1000.0));
    }
    if let Some(value) = SECONDS.captures(error_message).and_then(parse) {
        return Some(Duration::from_secs_f64(value));
    }
    if let Some(value) = MINUTES.captures(error_message).and_then(parse) {
        return Some(Duration::from_secs_f64(value * 60.0));
    }
    None
}

/// Shrink `max_tokens` to 70% for the next attempt after a rate limit.
fn reduce_max_tokens(arguments: &mut JsonObject) {
    if let Some(current) = arguments.get("max_tokens").and_then(|v| v.as_u64()) {
        arguments.insert(
            "max_tokens".to_string(),
            Value::from((current as f64 * 0.7) as u64),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::chain::{ReasoningChain, StepType, ToolType};
    use crate::skill::SkillMetadata;
    use crate::skill::StorageLayer;
    use crate::tool::{arguments, ToolDefinition, ToolParameter};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Tool that fails a configurable number of times before succeeding.
    struct FlakyTool {
        definition: ToolDefinition,
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    impl FlakyTool {
        fn new(failures: u32, retry_config: RetryConfig) -> Self {
            Self {
                definition: ToolDefinition::new("flaky", ToolType::Api, "Fails then succeeds")
                    .with_retry_config(retry_config),
                failures_before_success: failures,
                attempts: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(
            &self,
            _context: &ToolCallContext,
            _arguments: JsonObject,
        ) -> Result<ToolResult, ToolExecutionError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                Err(ToolExecutionError::Connection("network".to_string()))
            } else {
                Ok(ToolResult::ok(serde_json::json!("recovered")))
            }
        }
    }

    /// Tool that sleeps past any deadline.
    struct SlowTool {
        definition: ToolDefinition,
    }

    impl SlowTool {
        fn new(timeout_ms: u64) -> Self {
            Self {
                definition: ToolDefinition::new("slow", ToolType::Function, "Sleeps forever")
                    .with_timeout_ms(timeout_ms),
            }
        }
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(
            &self,
            _context: &ToolCallContext,
            _arguments: JsonObject,
        ) -> Result<ToolResult, ToolExecutionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ToolResult::ok(serde_json::json!("never")))
        }
    }

    struct EchoTool {
        definition: ToolDefinition,
    }

    impl EchoTool {
        fn named(name: &str) -> Self {
            Self {
                definition: ToolDefinition::new(name, ToolType::Function, "Echo")
                    .with_parameter(ToolParameter::optional("file_path", "string", "Path")),
            }
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn execute(
            &self,
            _context: &ToolCallContext,
            arguments: JsonObject,
        ) -> Result<ToolResult, ToolExecutionError> {
            Ok(ToolResult::ok(Value::Object(arguments)))
        }
    }

    fn executor_with(tools: Vec<Arc<dyn Tool>>) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        ToolExecutor::new(Arc::new(registry))
    }

    fn chain() -> SharedChain {
        SharedChain::new(ReasoningChain::new("task-1", "agent-1"))
    }

    fn context() -> ToolCallContext {
        ToolCallContext::new("task-1", "agent-1")
    }

    fn restricted_skill(allowed: &[&str]) -> Skill {
        Skill::new(
            SkillMetadata::new("restricted", "Restricted skill.")
                .with_allowed_tools(allowed.iter().map(|s| s.to_string()).collect()),
            "# Body",
            "/skills/restricted",
            StorageLayer::Project,
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let executor = executor_with(vec![]);
        let err = executor
            .execute("ghost", JsonObject::new(), &context(), &chain())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn execution_records_correlated_step_pair() {
        let executor = executor_with(vec![Arc::new(EchoTool::named("echo"))]);
        let chain = chain();
        let ctx = context();

        let result = executor
            .execute("echo", JsonObject::new(), &ctx, &chain)
            .await
            .expect("execute");
        assert!(result.success);

        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.steps.len(), 2);
        assert_eq!(snapshot.steps[0].step_type(), StepType::ToolCall);
        assert_eq!(snapshot.steps[1].step_type(), StepType::ToolResult);
        assert_eq!(
            snapshot.steps[0].tool_call().expect("call").correlation_id,
            ctx.correlation_id
        );
        assert_eq!(
            snapshot.steps[1].tool_result().expect("result").correlation_id,
            ctx.correlation_id
        );
        assert!(snapshot.verify_integrity().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_with_backoff() {
        let retry = RetryConfig {
            max_retries: 3,
            backoff_ms: 100,
            backoff_multiplier: 2.0,
            retryable_errors: Vec::new(),
        };
        let executor = executor_with(vec![Arc::new(FlakyTool::new(2, retry))]);
        let started = tokio::time::Instant::now();

        let result = executor
            .execute("flaky", JsonObject::new(), &context(), &chain())
            .await
            .expect("execute");

        assert!(result.success);
        assert_eq!(result.retry_count, 2);
        // Two backoffs: 100 ms then 200 ms.
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        struct BadRequestTool {
            definition: ToolDefinition,
        }
        #[async_trait]
        impl Tool for BadRequestTool {
            fn definition(&self) -> &ToolDefinition {
                &self.definition
            }
            async fn execute(
                &self,
                _context: &ToolCallContext,
                _arguments: JsonObject,
            ) -> Result<ToolResult, ToolExecutionError> {
                Err(ToolExecutionError::Other {
                    kind: "ValidationError".to_string(),
                    message: "bad input".to_string(),
                })
            }
        }
        let executor = executor_with(vec![Arc::new(BadRequestTool {
            definition: ToolDefinition::new("bad", ToolType::Function, "Always invalid"),
        })]);

        let result = executor
            .execute("bad", JsonObject::new(), &context(), &chain())
            .await
            .expect("execute");
        assert!(!result.success);
        assert_eq!(result.retry_count, 0);
        assert!(result.error.expect("error").contains("bad input"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_terminal_and_not_retried() {
        let executor = executor_with(vec![Arc::new(SlowTool::new(50))]);
        let chain = chain();
        let err = executor
            .execute("slow", JsonObject::new(), &context(), &chain)
            .await
            .expect_err("must time out");
        assert!(matches!(err, ToolError::Timeout { .. }));

        // The chain still carries a matched pair for the timed-out call.
        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.steps.len(), 2);
        assert!(snapshot.verify_integrity().is_ok());
        assert!(!snapshot.steps[1].tool_result().expect("result").success);
    }

    #[tokio::test]
    async fn skill_allow_list_blocks_tool_as_failed_result() {
        let executor = executor_with(vec![
            Arc::new(EchoTool::named("read")),
            Arc::new(EchoTool::named("write")),
        ]);
        executor
            .activate_skill(restricted_skill(&["read"]))
            .expect("activate");
        let chain = chain();

        let result = executor
            .execute("write", JsonObject::new(), &context(), &chain)
            .await
            .expect("blocked calls still return a result");
        assert!(!result.success);
        assert!(result.error.expect("error").contains("cannot use tool 'write'"));

        // Chain records the blocked attempt as a correlated pair.
        let snapshot = chain.snapshot().await;
        assert_eq!(snapshot.steps.len(), 2);
        assert!(snapshot.verify_integrity().is_ok());
    }

    #[tokio::test]
    async fn skill_blocks_read_of_its_hook_script() {
        let executor = executor_with(vec![Arc::new(EchoTool::named("read"))]);
        let skill = restricted_skill(&["read"]).with_script("pre", "/skills/s/pre.sh");
        executor.activate_skill(skill).expect("activate");

        let result = executor
            .execute(
                "read",
                arguments(serde_json::json!({"file_path": "/skills/s/pre.sh"})),
                &context(),
                &chain(),
            )
            .await
            .expect("blocked calls still return a result");
        assert!(!result.success);
        let error = result.error.expect("error");
        assert!(error.contains("hook scripts"));
        assert!(error.contains("context efficiency"));
    }

    #[test]
    fn skill_stack_is_lifo() {
        let executor = executor_with(vec![]);
        let outer = Skill::new(
            SkillMetadata::new("outer", "Outer."),
            "",
            "/skills/outer",
            StorageLayer::Project,
        );
        let inner = Skill::new(
            SkillMetadata::new("inner", "Inner."),
            "",
            "/skills/inner",
            StorageLayer::Project,
        );
        executor.activate_skill(outer.clone()).expect("activate outer");
        executor.activate_skill(inner).expect("activate inner");

        // Re-activating an active skill fails.
        assert!(matches!(
            executor.activate_skill(outer),
            Err(SkillError::AlreadyActive(_))
        ));

        // Deactivating out of order fails and leaves the stack unchanged.
        assert!(matches!(
            executor.deactivate_skill("outer"),
            Err(SkillError::StackViolation { .. })
        ));
        assert_eq!(executor.skill_stack_depth(), 2);
        assert_eq!(executor.active_skill_name().as_deref(), Some("inner"));

        executor.deactivate_skill("inner").expect("deactivate inner");
        executor.deactivate_skill("outer").expect("deactivate outer");
        assert!(matches!(
            executor.deactivate_skill("outer"),
            Err(SkillError::NotActive(_))
        ));
    }

    #[test]
    fn rate_limit_hint_parsing() {
        assert_eq!(
            extract_rate_limit_wait("Please try again in 21s"),
            Some(Duration::from_secs(21))
        );
        assert_eq!(
            extract_rate_limit_wait("Please try again in 810ms"),
            Some(Duration::from_secs_f64(0.81))
        );
        assert_eq!(
            extract_rate_limit_wait("Please try again in 2m"),
            Some(Duration::from_secs(120))
        );
        assert_eq!(extract_rate_limit_wait("no hint here"), None);
    }

    #[test]
    fn max_tokens_reduced_to_seventy_percent() {
        let mut args = arguments(serde_json::json!({"max_tokens": 1000}));
        reduce_max_tokens(&mut args);
        assert_eq!(args["max_tokens"], serde_json::json!(700));
    }
}
