//! Thread context assembly for orchestration decisions.
//!
//! Collects what the orchestrator needs to route a message: thread
//! validity (tenant- and user-scoped, never an exception), recent
//! messages, and the current target agent derived from handoff state.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::handoff::HandoffManager;
use crate::conversation::ConversationMessage;
use crate::storage::{ConversationRepository, StorageError};

/// Agent id used when no handoff is active.
pub const ORCHESTRATOR_AGENT: &str = "orchestrator";

/// Context assembled for one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadContext {
    /// The thread.
    pub thread_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Owning user.
    pub user_id: String,
    /// The agent messages should go to right now.
    pub target_agent_id: String,
    /// The newest messages, oldest first.
    pub recent_messages: Vec<ConversationMessage>,
    /// The conversation's free-form state.
    pub state_metadata: serde_json::Value,
}

/// Assembles thread contexts.
pub struct ThreadContextBuilder {
    conversations: Arc<dyn ConversationRepository>,
    handoffs: Arc<HandoffManager>,
}

impl ThreadContextBuilder {
    /// Builder over the conversation store and handoff manager.
    #[must_use]
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        handoffs: Arc<HandoffManager>,
    ) -> Self {
        Self {
            conversations,
            handoffs,
        }
    }

    /// Whether the thread exists, belongs to the tenant, and (when given)
    /// to the user. Never raises; malformed ids are simply invalid.
    pub async fn validate_thread(
        &self,
        thread_id: &str,
        tenant_id: &str,
        user_id: Option<&str>,
    ) -> bool {
        match self.conversations.get(thread_id, tenant_id).await {
            Some(conversation) => user_id.is_none_or(|user| conversation.user_id == user),
            None => false,
        }
    }

    /// The newest `count` messages of a thread, oldest first.
    pub async fn get_recent_messages(
        &self,
        thread_id: &str,
        tenant_id: &str,
        count: usize,
        include_system: bool,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        self.conversations
            .get_recent_messages(thread_id, tenant_id, count, include_system)
            .await
    }

    /// Assemble the full context for a thread.
    pub async fn get_thread_context(
        &self,
        thread_id: &str,
        tenant_id: &str,
        recent_count: usize,
    ) -> Result<ThreadContext, StorageError> {
        let conversation = self
            .conversations
            .get(thread_id, tenant_id)
            .await
            .ok_or_else(|| StorageError::NotFound(thread_id.to_string()))?;

        let target_agent_id = match self.handoffs.get_active_handoff(thread_id, tenant_id).await {
            Ok(Some(session)) => session.target_agent_id,
            _ => ORCHESTRATOR_AGENT.to_string(),
        };

        let recent_messages = self
            .conversations
            .get_recent_messages(thread_id, tenant_id, recent_count, false)
            .await?;

        Ok(ThreadContext {
            thread_id: conversation.id,
            tenant_id: conversation.tenant_id,
            user_id: conversation.user_id,
            target_agent_id,
            recent_messages,
            state_metadata: conversation.state_metadata,
        })
    }
}

impl std::fmt::Debug for ThreadContextBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContextBuilder").finish_non_exhaustive()
    }
}
