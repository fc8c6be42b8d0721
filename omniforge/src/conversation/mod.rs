//! Conversation model: tenant-scoped message threads.
//!
//! A conversation is the durable thread the orchestration layer routes
//! over. Its free-form `state_metadata` blob is persisted atomically with
//! the conversation row; handoff state lives under
//! `state_metadata.handoff_session` so it survives cache loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Key inside `state_metadata` where handoff state is mirrored.
pub const HANDOFF_SESSION_KEY: &str = "handoff_session";

/// Role of a conversation message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationRole {
    /// The human participant.
    User,
    /// An agent reply.
    Assistant,
    /// Platform-injected content.
    System,
}

/// One message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Message id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author role.
    pub role: ConversationRole,
    /// Message text.
    pub content: String,
    /// When the message was appended.
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// A message stamped now.
    #[must_use]
    pub fn new(
        conversation_id: impl Into<String>,
        role: ConversationRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// A tenant-scoped message thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Thread id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning user.
    pub user_id: String,
    /// Display title, if set.
    pub title: Option<String>,
    /// Free-form state persisted atomically with the conversation.
    pub state_metadata: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Bumped on every message append and metadata update.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// A fresh conversation for a tenant and user.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            title: None,
            state_metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}
