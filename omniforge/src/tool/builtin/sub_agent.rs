//! The `sub_agent` tool: delegate a task to another agent mid-loop.
//!
//! The carried `context._agent_chain` lists the agents already visited on
//! this delegation path; a target that routes back to the calling agent is
//! a cycle and fails before any work starts. The updated chain is returned
//! so nested delegations keep the full path.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::event::TaskEvent;
use crate::reasoning::chain::ToolType;
use crate::task::{MessagePart, Task, TaskCreateRequest, TaskState};
use crate::tool::{
    JsonObject, Tool, ToolCallContext, ToolDefinition, ToolExecutionError, ToolParameter,
    ToolResult,
};

/// Key in the delegation context carrying the visited-agent list.
const AGENT_CHAIN_KEY: &str = "_agent_chain";

/// Tool that sends a task to a sub-agent and returns its output.
pub struct SubAgentTool {
    definition: ToolDefinition,
    registry: AgentRegistry,
}

impl SubAgentTool {
    /// Sub-agent tool over an agent registry.
    #[must_use]
    pub fn new(registry: AgentRegistry) -> Self {
        let definition = ToolDefinition::new(
            "sub_agent",
            ToolType::Function,
            "Delegate a task to another agent and return its result",
        )
        .with_parameter(ToolParameter::required(
            "agent_id",
            "string",
            "Id of the agent to delegate to",
        ))
        .with_parameter(ToolParameter::required(
            "task_description",
            "string",
            "What the sub-agent should do",
        ))
        .with_parameter(ToolParameter::optional(
            "context",
            "object",
            "Delegation context carried across nested sub-agents",
        ))
        .with_timeout_ms(300_000);
        Self {
            definition,
            registry,
        }
    }
}

#[async_trait]
impl Tool for SubAgentTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        context: &ToolCallContext,
        arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        let target_agent_id = arguments
            .get("agent_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let task_description = arguments
            .get("task_description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let mut delegation_context = arguments
            .get("context")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut agent_chain: Vec<String> = delegation_context
            .get(AGENT_CHAIN_KEY)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if agent_chain.iter().any(|id| id == &context.agent_id) {
            return Ok(ToolResult::failed(format!(
                "cycle detected: agent '{}' is already on the delegation chain {:?}",
                context.agent_id, agent_chain
            )));
        }
        agent_chain.push(context.agent_id.clone());
        delegation_context.insert(
            AGENT_CHAIN_KEY.to_string(),
            serde_json::json!(agent_chain),
        );

        let agent = match self.registry.resolve(&target_agent_id).await {
            Ok(agent) => agent,
            Err(error) => return Ok(ToolResult::failed(error.to_string())),
        };

        let sub_task = Task::new(
            &target_agent_id,
            TaskCreateRequest {
                tenant_id: context
                    .tenant_id
                    .clone()
                    .unwrap_or_else(|| "default".to_string()),
                user_id: context.agent_id.clone(),
                message_parts: vec![MessagePart::text(task_description)],
                parent_task_id: Some(context.task_id.clone()),
                skill_name: None,
            },
        );
        debug!(
            target_agent_id,
            parent_task_id = context.task_id,
            sub_task_id = sub_task.id,
            "Delegating to sub-agent"
        );

        let sub_chain_id = Uuid::new_v4().to_string();
        let mut final_state = TaskState::Failed;
        let mut messages: Vec<String> = Vec::new();
        let mut artifacts: Vec<Value> = Vec::new();

        let mut stream = agent.process_task(sub_task).await;
        while let Some(event) = stream.next().await {
            match event {
                TaskEvent::Message { parts, .. } => {
                    for part in parts {
                        if let Some(text) = part.as_text() {
                            messages.push(text.to_string());
                        }
                    }
                }
                TaskEvent::Artifact { artifact, .. } => {
                    artifacts.push(serde_json::to_value(artifact).unwrap_or(Value::Null));
                }
                TaskEvent::Done {
                    final_state: state, ..
                } => {
                    final_state = state;
                }
                TaskEvent::Status { .. } | TaskEvent::Error { .. } => {}
            }
        }

        Ok(ToolResult::ok(serde_json::json!({
            "sub_chain_id": sub_chain_id,
            "agent_id": target_agent_id,
            "final_state": final_state,
            "messages": messages,
            "artifacts": artifacts,
            "context": Value::Object(delegation_context),
        })))
    }
}
