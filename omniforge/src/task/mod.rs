//! Task model and lifecycle state machine.
//!
//! A [`Task`] is the unit of work for one agent invocation. It is created in
//! [`TaskState::Submitted`] and moves through the state machine exclusively
//! via [`Task::apply_event`] and [`TaskManager`](manager::TaskManager)
//! operations. Terminal tasks are immutable.

pub mod manager;

pub use manager::TaskManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::event::TaskEvent;

/// Errors raised by the task state machine.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The requested state transition is not legal.
    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition {
        /// State the task was in.
        from: TaskState,
        /// State the caller asked for.
        to: TaskState,
    },

    /// No task exists with the given id.
    #[error("task '{0}' does not exist")]
    TaskNotFound(String),

    /// No agent exists with the given id.
    #[error("agent '{0}' does not exist")]
    AgentNotFound(String),

    /// The backing repository rejected the operation.
    #[error("task storage error: {0}")]
    Storage(String),
}

/// Lifecycle states of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not yet picked up by the agent.
    Submitted,
    /// The agent is processing the task.
    Working,
    /// The agent needs more input from the user.
    InputRequired,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl TaskState {
    /// Whether the state is terminal. Terminal tasks are immutable.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition from `self` to `to` is legal.
    #[must_use]
    pub fn can_transition_to(self, to: TaskState) -> bool {
        match (self, to) {
            (Self::Submitted, Self::Working) => true,
            (
                Self::Working,
                Self::Completed | Self::Failed | Self::Cancelled | Self::InputRequired,
            ) => true,
            (Self::InputRequired, Self::Working) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::Working => "working",
            Self::InputRequired => "input_required",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// A single part of a message. Only text parts are modelled in-core; file
/// and data parts ride through as opaque JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessagePart {
    /// Plain text content.
    Text {
        /// The text payload.
        text: String,
    },
    /// Opaque structured content.
    Data {
        /// Arbitrary JSON payload.
        data: serde_json::Value,
    },
}

impl MessagePart {
    /// Convenience constructor for a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text content, if this is a text part.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Data { .. } => None,
        }
    }
}

/// Role of a message author within a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The requesting user.
    User,
    /// The processing agent.
    Agent,
    /// Platform-injected content.
    System,
}

/// A message attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    /// Author role.
    pub role: MessageRole,
    /// Ordered message parts.
    pub parts: Vec<MessagePart>,
    /// When the message was recorded.
    pub timestamp: DateTime<Utc>,
}

impl TaskMessage {
    /// Build a message from parts, stamped now.
    #[must_use]
    pub fn new(role: MessageRole, parts: Vec<MessagePart>) -> Self {
        Self {
            role,
            parts,
            timestamp: Utc::now(),
        }
    }
}

/// An artifact produced while processing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable artifact identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Content type, e.g. `text/markdown`.
    pub mime_type: String,
    /// Artifact payload.
    pub content: serde_json::Value,
}

/// Error attached to a failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Request payload for creating a task.
#[derive(Debug, Clone)]
pub struct TaskCreateRequest {
    /// Tenant submitting the work.
    pub tenant_id: String,
    /// User submitting the work.
    pub user_id: String,
    /// The user's message parts.
    pub message_parts: Vec<MessagePart>,
    /// Parent task when this is a delegated sub-task.
    pub parent_task_id: Option<String>,
    /// Skill requested for the task, if any.
    pub skill_name: Option<String>,
}

/// Unit of work for one agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: String,
    /// Agent the task is addressed to.
    pub agent_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Submitting user.
    pub user_id: String,
    /// Parent task for delegated sub-tasks.
    pub parent_task_id: Option<String>,
    /// Skill requested for the task, if any.
    pub skill_name: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Ordered conversation recorded on the task.
    pub messages: Vec<TaskMessage>,
    /// Ordered artifacts produced so far.
    pub artifacts: Vec<Artifact>,
    /// Failure details when the task failed.
    pub error: Option<TaskFailure>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in [`TaskState::Submitted`] carrying the user's
    /// message.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, request: TaskCreateRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            tenant_id: request.tenant_id,
            user_id: request.user_id,
            parent_task_id: request.parent_task_id,
            skill_name: request.skill_name,
            state: TaskState::Submitted,
            messages: vec![TaskMessage::new(MessageRole::User, request.message_parts)],
            artifacts: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an event to the task, returning the updated instance.
    ///
    /// This is the only sanctioned way to evolve task state while the agent
    /// is streaming events. Terminal tasks are returned unchanged, so event
    /// replay can never resurrect a finished task.
    #[must_use]
    pub fn apply_event(&self, event: &TaskEvent) -> Task {
        if self.state.is_terminal() {
            return self.clone();
        }
        let mut next = self.clone();
        match event {
            TaskEvent::Status { state, .. } => {
                next.state = *state;
            }
            TaskEvent::Message { parts, .. } => {
                next.messages
                    .push(TaskMessage::new(MessageRole::Agent, parts.clone()));
            }
            TaskEvent::Artifact { artifact, .. } => {
                next.artifacts.push(artifact.clone());
            }
            TaskEvent::Error { code, message, .. } => {
                next.state = TaskState::Failed;
                next.error = Some(TaskFailure {
                    code: code.clone(),
                    message: message.clone(),
                });
            }
            TaskEvent::Done { final_state, .. } => {
                next.state = *final_state;
                if *final_state == TaskState::Failed && next.error.is_none() {
                    next.error = Some(TaskFailure {
                        code: "task_failed".to_string(),
                        message: "Task failed without a specific error".to_string(),
                    });
                }
            }
        }
        next.updated_at = Utc::now();
        next
    }
}
