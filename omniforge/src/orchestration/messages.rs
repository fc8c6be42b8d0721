//! Agent-to-agent handoff wire messages.
//!
//! Three message shapes travel between agents during a handoff: the
//! request, the accept/reject answer, and the final return. All carry the
//! thread and tenant plus the participating agent ids, and all validate
//! their payloads on construction so malformed messages never enter the
//! protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted context or result summary.
pub const MAX_SUMMARY_LENGTH: usize = 2000;
/// Bounds for `recent_message_count`.
pub const RECENT_MESSAGE_RANGE: std::ops::RangeInclusive<u32> = 1..=20;
/// Default number of recent messages shared with the target.
pub const DEFAULT_RECENT_MESSAGES: u32 = 5;

/// Validation failures for handoff messages.
#[derive(Debug, Error)]
pub enum HandoffMessageError {
    /// A required identifier is empty.
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),

    /// `recent_message_count` is outside `[1, 20]`.
    #[error("recent_message_count must be in [1, 20], got {0}")]
    RecentMessageCount(u32),

    /// A summary exceeds [`MAX_SUMMARY_LENGTH`].
    #[error("{field} exceeds {MAX_SUMMARY_LENGTH} characters (got {length})")]
    SummaryTooLong {
        /// The offending field.
        field: &'static str,
        /// Its actual length.
        length: usize,
    },

    /// An estimated duration is negative.
    #[error("estimated_duration_seconds must be non-negative, got {0}")]
    NegativeDuration(i64),

    /// An artifact id is empty or whitespace.
    #[error("artifacts_created entries must not be empty or whitespace")]
    BlankArtifact,
}

/// Completion status carried by a handoff return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// The target finished the delegated work.
    Completed,
    /// The handoff was cancelled before completion.
    Cancelled,
    /// The target hit an unrecoverable error.
    Error,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Source→target request to take over a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Thread being handed off.
    pub thread_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent giving up the thread.
    pub source_agent_id: String,
    /// Agent asked to take over.
    pub target_agent_id: String,
    /// Summary of the conversation so far.
    pub context_summary: String,
    /// Why the handoff is happening.
    pub handoff_reason: String,
    /// How many recent messages to share with the target.
    pub recent_message_count: u32,
    /// Whether thread state should be preserved across the handoff.
    pub preserve_state: bool,
    /// Whether the source expects the thread back afterwards.
    pub return_expected: bool,
    /// When the request was created.
    pub timestamp: DateTime<Utc>,
    /// Free-form extension data.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl HandoffRequest {
    /// Build a validated request with default sharing settings.
    pub fn new(
        thread_id: impl Into<String>,
        tenant_id: impl Into<String>,
        source_agent_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        context_summary: impl Into<String>,
        handoff_reason: impl Into<String>,
    ) -> Result<Self, HandoffMessageError> {
        let request = Self {
            thread_id: thread_id.into(),
            tenant_id: tenant_id.into(),
            source_agent_id: source_agent_id.into(),
            target_agent_id: target_agent_id.into(),
            context_summary: context_summary.into(),
            handoff_reason: handoff_reason.into(),
            recent_message_count: DEFAULT_RECENT_MESSAGES,
            preserve_state: true,
            return_expected: false,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        };
        request.validate()?;
        Ok(request)
    }

    /// Override how many recent messages are shared.
    pub fn with_recent_message_count(mut self, count: u32) -> Result<Self, HandoffMessageError> {
        self.recent_message_count = count;
        self.validate()?;
        Ok(self)
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn with_metadata(
        mut self,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.metadata = metadata;
        self
    }

    fn validate(&self) -> Result<(), HandoffMessageError> {
        require_non_empty("thread_id", &self.thread_id)?;
        require_non_empty("tenant_id", &self.tenant_id)?;
        require_non_empty("source_agent_id", &self.source_agent_id)?;
        require_non_empty("target_agent_id", &self.target_agent_id)?;
        if !RECENT_MESSAGE_RANGE.contains(&self.recent_message_count) {
            return Err(HandoffMessageError::RecentMessageCount(
                self.recent_message_count,
            ));
        }
        if self.context_summary.len() > MAX_SUMMARY_LENGTH {
            return Err(HandoffMessageError::SummaryTooLong {
                field: "context_summary",
                length: self.context_summary.len(),
            });
        }
        Ok(())
    }
}

/// Target→source answer to a handoff request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffAccept {
    /// Thread the answer refers to.
    pub thread_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The answering agent.
    pub target_agent_id: String,
    /// Whether the target takes the thread.
    pub accepted: bool,
    /// Why the target declined, when it did.
    pub rejection_reason: Option<String>,
    /// The target's estimate for the work, in seconds.
    pub estimated_duration_seconds: Option<i64>,
    /// When the answer was created.
    pub timestamp: DateTime<Utc>,
}

impl HandoffAccept {
    /// An acceptance.
    pub fn accepted(
        thread_id: impl Into<String>,
        tenant_id: impl Into<String>,
        target_agent_id: impl Into<String>,
    ) -> Result<Self, HandoffMessageError> {
        let accept = Self {
            thread_id: thread_id.into(),
            tenant_id: tenant_id.into(),
            target_agent_id: target_agent_id.into(),
            accepted: true,
            rejection_reason: None,
            estimated_duration_seconds: None,
            timestamp: Utc::now(),
        };
        accept.validate()?;
        Ok(accept)
    }

    /// A rejection with a reason.
    pub fn rejected(
        thread_id: impl Into<String>,
        tenant_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self, HandoffMessageError> {
        let accept = Self {
            thread_id: thread_id.into(),
            tenant_id: tenant_id.into(),
            target_agent_id: target_agent_id.into(),
            accepted: false,
            rejection_reason: Some(reason.into()),
            estimated_duration_seconds: None,
            timestamp: Utc::now(),
        };
        accept.validate()?;
        Ok(accept)
    }

    /// Attach a duration estimate.
    pub fn with_estimated_duration(mut self, seconds: i64) -> Result<Self, HandoffMessageError> {
        if seconds < 0 {
            return Err(HandoffMessageError::NegativeDuration(seconds));
        }
        self.estimated_duration_seconds = Some(seconds);
        Ok(self)
    }

    fn validate(&self) -> Result<(), HandoffMessageError> {
        require_non_empty("thread_id", &self.thread_id)?;
        require_non_empty("tenant_id", &self.tenant_id)?;
        require_non_empty("target_agent_id", &self.target_agent_id)?;
        if let Some(seconds) = self.estimated_duration_seconds {
            if seconds < 0 {
                return Err(HandoffMessageError::NegativeDuration(seconds));
            }
        }
        Ok(())
    }
}

/// Target→source message returning the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffReturn {
    /// Thread being returned.
    pub thread_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent returning the thread.
    pub target_agent_id: String,
    /// How the delegated work ended.
    pub completion_status: CompletionStatus,
    /// Summary of what was done.
    pub result_summary: Option<String>,
    /// Ids of artifacts produced while the target held the thread.
    pub artifacts_created: Vec<String>,
    /// When the return was created.
    pub timestamp: DateTime<Utc>,
}

impl HandoffReturn {
    /// Build a validated return message.
    pub fn new(
        thread_id: impl Into<String>,
        tenant_id: impl Into<String>,
        target_agent_id: impl Into<String>,
        completion_status: CompletionStatus,
    ) -> Result<Self, HandoffMessageError> {
        let message = Self {
            thread_id: thread_id.into(),
            tenant_id: tenant_id.into(),
            target_agent_id: target_agent_id.into(),
            completion_status,
            result_summary: None,
            artifacts_created: Vec::new(),
            timestamp: Utc::now(),
        };
        message.validate()?;
        Ok(message)
    }

    /// Attach a result summary.
    pub fn with_result_summary(
        mut self,
        summary: impl Into<String>,
    ) -> Result<Self, HandoffMessageError> {
        let summary = summary.into();
        if summary.len() > MAX_SUMMARY_LENGTH {
            return Err(HandoffMessageError::SummaryTooLong {
                field: "result_summary",
                length: summary.len(),
            });
        }
        self.result_summary = Some(summary);
        Ok(self)
    }

    /// Attach produced artifact ids.
    pub fn with_artifacts(
        mut self,
        artifacts: Vec<String>,
    ) -> Result<Self, HandoffMessageError> {
        if artifacts.iter().any(|id| id.trim().is_empty()) {
            return Err(HandoffMessageError::BlankArtifact);
        }
        self.artifacts_created = artifacts;
        Ok(self)
    }

    fn validate(&self) -> Result<(), HandoffMessageError> {
        require_non_empty("thread_id", &self.thread_id)?;
        require_non_empty("tenant_id", &self.tenant_id)?;
        require_non_empty("target_agent_id", &self.target_agent_id)?;
        Ok(())
    }
}

fn require_non_empty(name: &'static str, value: &str) -> Result<(), HandoffMessageError> {
    if value.trim().is_empty() {
        Err(HandoffMessageError::EmptyField(name))
    } else {
        Ok(())
    }
}
