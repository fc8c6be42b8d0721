//! Typed task event stream.
//!
//! Agents communicate progress by yielding [`TaskEvent`]s. Each event carries
//! the originating task id, a timestamp, and (except for the terminal done
//! event) a visibility level that downstream consumers filter on.

pub mod visibility;

pub use visibility::{filter_event_stream, redact_sensitive, ConsumerRole, VisibilityLevel};

use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::task::{Artifact, MessagePart, TaskState};

/// Boxed asynchronous sequence of task events, the return shape of
/// [`Agent::process_task`](crate::agent::Agent::process_task).
pub type EventStream = Pin<Box<dyn Stream<Item = TaskEvent> + Send>>;

/// Events emitted by an agent while processing a task.
///
/// One variant per event kind; the serde `type` tag selects the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum TaskEvent {
    /// The task moved to a new lifecycle state.
    Status {
        /// Originating task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The new state.
        state: TaskState,
        /// Consumer visibility for this event.
        visibility: VisibilityLevel,
    },
    /// The agent produced message content.
    Message {
        /// Originating task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// Message parts.
        parts: Vec<MessagePart>,
        /// Whether more content for the same message follows.
        is_partial: bool,
        /// Consumer visibility for this event.
        visibility: VisibilityLevel,
    },
    /// The agent produced an artifact.
    Artifact {
        /// Originating task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The artifact payload.
        artifact: Artifact,
        /// Consumer visibility for this event.
        visibility: VisibilityLevel,
    },
    /// The agent hit an error. The task moves to failed.
    Error {
        /// Originating task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// Stable machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Consumer visibility for this event.
        visibility: VisibilityLevel,
    },
    /// Terminal event: the stream ends after this. Always forwarded to every
    /// consumer regardless of role.
    Done {
        /// Originating task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// Final lifecycle state of the task.
        final_state: TaskState,
    },
}

impl TaskEvent {
    /// Status event with the default summary visibility.
    #[must_use]
    pub fn status(task_id: &str, state: TaskState) -> Self {
        Self::Status {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            state,
            visibility: VisibilityLevel::Summary,
        }
    }

    /// Message event with full (developer-facing) visibility.
    #[must_use]
    pub fn message(task_id: &str, parts: Vec<MessagePart>) -> Self {
        Self::Message {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            parts,
            is_partial: false,
            visibility: VisibilityLevel::Full,
        }
    }

    /// Message event with summary visibility, used for the high-level
    /// progress lines every consumer should see.
    #[must_use]
    pub fn summary_message(task_id: &str, parts: Vec<MessagePart>) -> Self {
        Self::Message {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            parts,
            is_partial: false,
            visibility: VisibilityLevel::Summary,
        }
    }

    /// Single-text-part convenience over [`TaskEvent::message`].
    #[must_use]
    pub fn text(task_id: &str, text: impl Into<String>) -> Self {
        Self::message(task_id, vec![MessagePart::text(text)])
    }

    /// Single-text-part convenience over [`TaskEvent::summary_message`].
    #[must_use]
    pub fn summary_text(task_id: &str, text: impl Into<String>) -> Self {
        Self::summary_message(task_id, vec![MessagePart::text(text)])
    }

    /// Artifact event with the default summary visibility.
    #[must_use]
    pub fn artifact(task_id: &str, artifact: Artifact) -> Self {
        Self::Artifact {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            artifact,
            visibility: VisibilityLevel::Summary,
        }
    }

    /// Error event with the default summary visibility.
    #[must_use]
    pub fn error(task_id: &str, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            code: code.into(),
            message: message.into(),
            visibility: VisibilityLevel::Summary,
        }
    }

    /// Terminal done event.
    #[must_use]
    pub fn done(task_id: &str, final_state: TaskState) -> Self {
        Self::Done {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            final_state,
        }
    }

    /// The task this event belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match self {
            Self::Status { task_id, .. }
            | Self::Message { task_id, .. }
            | Self::Artifact { task_id, .. }
            | Self::Error { task_id, .. }
            | Self::Done { task_id, .. } => task_id,
        }
    }

    /// The event's visibility; `None` for done events, which are always
    /// forwarded.
    #[must_use]
    pub fn visibility(&self) -> Option<VisibilityLevel> {
        match self {
            Self::Status { visibility, .. }
            | Self::Message { visibility, .. }
            | Self::Artifact { visibility, .. }
            | Self::Error { visibility, .. } => Some(*visibility),
            Self::Done { .. } => None,
        }
    }

    /// Whether this is the terminal event of a stream.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
