//! Handoff lifecycle management.
//!
//! A handoff transfers a live thread to a specialist agent. The manager
//! keeps an in-process cache for fast routing decisions but the
//! conversation's `state_metadata` is the source of truth: a fresh manager
//! instance reconstructs active handoffs from persistence, so cache loss
//! never strands a thread.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::messages::{CompletionStatus, HandoffAccept, HandoffRequest};
use crate::conversation::HANDOFF_SESSION_KEY;
use crate::storage::ConversationRepository;

/// Errors raised by handoff operations.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The thread already has an active handoff.
    #[error("thread '{0}' already has an active handoff")]
    AlreadyActive(String),

    /// The thread does not exist within the caller's tenant. Cross-tenant
    /// lookups collapse into this same shape.
    #[error("thread '{0}' not found")]
    ThreadNotFound(String),

    /// No active handoff exists for the operation.
    #[error("thread '{0}' has no active handoff")]
    NoActiveHandoff(String),

    /// The persisted handoff state could not be read or written.
    #[error("handoff state error: {0}")]
    State(String),

    /// A protocol message failed validation.
    #[error(transparent)]
    Message(#[from] super::messages::HandoffMessageError),
}

/// Lifecycle state of a handoff session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffState {
    /// The target holds the thread.
    Active,
    /// The target finished and returned the thread.
    Completed,
    /// The handoff was cancelled.
    Cancelled,
    /// The target hit an unrecoverable error.
    Error,
}

/// A live (or finished) transfer of a thread to a specialist agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSession {
    /// The thread being transferred.
    pub thread_id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent that gave up the thread.
    pub source_agent_id: String,
    /// Agent holding the thread.
    pub target_agent_id: String,
    /// Lifecycle state.
    pub state: HandoffState,
    /// Context shared with the target at initiation.
    pub context_summary: String,
    /// Why the handoff happened.
    pub handoff_reason: String,
    /// When the handoff started.
    pub started_at: DateTime<Utc>,
    /// When the handoff finished, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Summary of the target's work, when returned.
    pub result_summary: Option<String>,
    /// Artifacts the target produced, when returned.
    pub artifacts: Option<Vec<String>>,
}

/// Manages handoff sessions over the conversation store.
pub struct HandoffManager {
    conversations: Arc<dyn ConversationRepository>,
    cache: Mutex<HashMap<String, HandoffSession>>,
}

impl HandoffManager {
    /// Manager over a conversation repository.
    #[must_use]
    pub fn new(conversations: Arc<dyn ConversationRepository>) -> Self {
        Self {
            conversations,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Initiate a handoff for a thread.
    ///
    /// Fails when an active handoff already exists (checked in cache
    /// first, then persistence). On success the session is persisted into
    /// the conversation's `state_metadata`, cached, and the target's
    /// acceptance is returned.
    pub async fn initiate_handoff(
        &self,
        request: &HandoffRequest,
    ) -> Result<HandoffAccept, HandoffError> {
        if self
            .get_active_handoff(&request.thread_id, &request.tenant_id)
            .await?
            .is_some()
        {
            return Err(HandoffError::AlreadyActive(request.thread_id.clone()));
        }

        let session = HandoffSession {
            thread_id: request.thread_id.clone(),
            tenant_id: request.tenant_id.clone(),
            source_agent_id: request.source_agent_id.clone(),
            target_agent_id: request.target_agent_id.clone(),
            state: HandoffState::Active,
            context_summary: request.context_summary.clone(),
            handoff_reason: request.handoff_reason.clone(),
            started_at: Utc::now(),
            completed_at: None,
            result_summary: None,
            artifacts: None,
        };

        self.persist_session(&session).await?;
        self.cache
            .lock()
            .await
            .insert(session.thread_id.clone(), session.clone());
        info!(
            thread_id = request.thread_id,
            source = request.source_agent_id,
            target = request.target_agent_id,
            "Handoff initiated"
        );

        Ok(HandoffAccept::accepted(
            &request.thread_id,
            &request.tenant_id,
            &request.target_agent_id,
        )?)
    }

    /// The active handoff for a thread, if any. Reads the cache first and
    /// falls back to persistence, re-populating the cache on a hit.
    pub async fn get_active_handoff(
        &self,
        thread_id: &str,
        tenant_id: &str,
    ) -> Result<Option<HandoffSession>, HandoffError> {
        {
            let cache = self.cache.lock().await;
            if let Some(session) = cache.get(thread_id) {
                if session.tenant_id == tenant_id && session.state == HandoffState::Active {
                    return Ok(Some(session.clone()));
                }
            }
        }

        let session = self.load_session(thread_id, tenant_id).await?;
        match session {
            Some(session) if session.state == HandoffState::Active => {
                debug!(thread_id, "Recovered active handoff from persistence");
                self.cache
                    .lock()
                    .await
                    .insert(thread_id.to_string(), session.clone());
                Ok(Some(session))
            }
            _ => Ok(None),
        }
    }

    /// Complete the active handoff with a final status.
    pub async fn complete_handoff(
        &self,
        thread_id: &str,
        tenant_id: &str,
        status: CompletionStatus,
        result_summary: Option<String>,
        artifacts: Option<Vec<String>>,
    ) -> Result<HandoffSession, HandoffError> {
        let mut session = self
            .get_active_handoff(thread_id, tenant_id)
            .await?
            .ok_or_else(|| HandoffError::NoActiveHandoff(thread_id.to_string()))?;

        session.state = match status {
            CompletionStatus::Completed => HandoffState::Completed,
            CompletionStatus::Cancelled => HandoffState::Cancelled,
            CompletionStatus::Error => HandoffState::Error,
        };
        session.completed_at = Some(Utc::now());
        session.result_summary = result_summary;
        session.artifacts = artifacts;

        self.persist_session(&session).await?;
        self.cache.lock().await.remove(thread_id);
        info!(thread_id, status = %status, "Handoff finished");
        Ok(session)
    }

    /// Cancel the active handoff.
    pub async fn cancel_handoff(
        &self,
        thread_id: &str,
        tenant_id: &str,
    ) -> Result<HandoffSession, HandoffError> {
        self.complete_handoff(thread_id, tenant_id, CompletionStatus::Cancelled, None, None)
            .await
    }

    /// Write the session into the conversation's `state_metadata`.
    async fn persist_session(&self, session: &HandoffSession) -> Result<(), HandoffError> {
        let mut conversation = self
            .conversations
            .get(&session.thread_id, &session.tenant_id)
            .await
            .ok_or_else(|| HandoffError::ThreadNotFound(session.thread_id.clone()))?;

        let serialized = serde_json::to_value(session)
            .map_err(|error| HandoffError::State(error.to_string()))?;
        match conversation.state_metadata.as_object_mut() {
            Some(metadata) => {
                metadata.insert(HANDOFF_SESSION_KEY.to_string(), serialized);
            }
            None => {
                conversation.state_metadata =
                    serde_json::json!({ HANDOFF_SESSION_KEY: serialized });
            }
        }

        self.conversations
            .update(&conversation)
            .await
            .map_err(|error| HandoffError::State(error.to_string()))
    }

    /// Read a session back out of the conversation's `state_metadata`.
    async fn load_session(
        &self,
        thread_id: &str,
        tenant_id: &str,
    ) -> Result<Option<HandoffSession>, HandoffError> {
        let conversation = self
            .conversations
            .get(thread_id, tenant_id)
            .await
            .ok_or_else(|| HandoffError::ThreadNotFound(thread_id.to_string()))?;

        let Some(value) = conversation.state_metadata.get(HANDOFF_SESSION_KEY) else {
            return Ok(None);
        };
        let session: HandoffSession = serde_json::from_value(value.clone())
            .map_err(|error| HandoffError::State(error.to_string()))?;
        Ok(Some(session))
    }
}

impl std::fmt::Debug for HandoffManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::storage::memory::InMemoryConversationRepository;

    async fn setup() -> (Arc<InMemoryConversationRepository>, Conversation) {
        let repository = Arc::new(InMemoryConversationRepository::new());
        let conversation = Conversation::new("tenant-1", "user-1");
        repository.create(&conversation).await.expect("create");
        (repository, conversation)
    }

    fn request(thread_id: &str) -> HandoffRequest {
        HandoffRequest::new(
            thread_id,
            "tenant-1",
            "general-agent",
            "billing-agent",
            "help",
            "billing expertise",
        )
        .expect("valid request")
    }

    #[tokio::test]
    async fn lifecycle_with_recovery_across_managers() {
        let (repository, conversation) = setup().await;

        let manager = HandoffManager::new(repository.clone());
        let accept = manager
            .initiate_handoff(&request(&conversation.id))
            .await
            .expect("initiate");
        assert!(accept.accepted);

        // A brand-new manager (empty cache) recovers the session from the
        // conversation's persisted state.
        let fresh = HandoffManager::new(repository.clone());
        let recovered = fresh
            .get_active_handoff(&conversation.id, "tenant-1")
            .await
            .expect("lookup")
            .expect("active session");
        assert_eq!(recovered.state, HandoffState::Active);
        assert_eq!(recovered.target_agent_id, "billing-agent");

        fresh
            .complete_handoff(
                &conversation.id,
                "tenant-1",
                CompletionStatus::Completed,
                Some("done".to_string()),
                None,
            )
            .await
            .expect("complete");

        let after = fresh
            .get_active_handoff(&conversation.id, "tenant-1")
            .await
            .expect("lookup");
        assert!(after.is_none());
    }

    #[tokio::test]
    async fn second_handoff_on_same_thread_is_rejected() {
        let (repository, conversation) = setup().await;
        let manager = HandoffManager::new(repository);

        manager
            .initiate_handoff(&request(&conversation.id))
            .await
            .expect("first");
        assert!(matches!(
            manager.initiate_handoff(&request(&conversation.id)).await,
            Err(HandoffError::AlreadyActive(_))
        ));
    }

    #[tokio::test]
    async fn cancel_clears_active_state() {
        let (repository, conversation) = setup().await;
        let manager = HandoffManager::new(repository);

        manager
            .initiate_handoff(&request(&conversation.id))
            .await
            .expect("initiate");
        let cancelled = manager
            .cancel_handoff(&conversation.id, "tenant-1")
            .await
            .expect("cancel");
        assert_eq!(cancelled.state, HandoffState::Cancelled);
        assert!(cancelled.completed_at.is_some());

        assert!(manager
            .get_active_handoff(&conversation.id, "tenant-1")
            .await
            .expect("lookup")
            .is_none());

        // A second cancel has nothing to act on.
        assert!(matches!(
            manager.cancel_handoff(&conversation.id, "tenant-1").await,
            Err(HandoffError::NoActiveHandoff(_))
        ));
    }

    #[tokio::test]
    async fn recovered_session_equals_the_original() {
        let (repository, conversation) = setup().await;
        let manager = HandoffManager::new(repository.clone());
        manager
            .initiate_handoff(&request(&conversation.id))
            .await
            .expect("initiate");
        let original = manager
            .get_active_handoff(&conversation.id, "tenant-1")
            .await
            .expect("lookup")
            .expect("session");

        let fresh = HandoffManager::new(repository);
        let recovered = fresh
            .get_active_handoff(&conversation.id, "tenant-1")
            .await
            .expect("lookup")
            .expect("session");
        assert_eq!(recovered, original);
    }

    #[tokio::test]
    async fn cross_tenant_lookup_is_a_missing_thread() {
        let (repository, conversation) = setup().await;
        let manager = HandoffManager::new(repository);
        manager
            .initiate_handoff(&request(&conversation.id))
            .await
            .expect("initiate");

        // The wrong tenant sees the identical error shape a nonexistent
        // thread produces; existence is not leaked.
        let wrong_tenant = manager
            .get_active_handoff(&conversation.id, "tenant-2")
            .await;
        assert!(matches!(
            wrong_tenant,
            Err(HandoffError::ThreadNotFound(_))
        ));
        let missing = manager.get_active_handoff("no-such-thread", "tenant-2").await;
        assert!(matches!(missing, Err(HandoffError::ThreadNotFound(_))));

        // Completion across tenants fails the same way.
        assert!(matches!(
            manager
                .complete_handoff(
                    &conversation.id,
                    "tenant-2",
                    CompletionStatus::Completed,
                    None,
                    None
                )
                .await,
            Err(HandoffError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn threads_have_independent_sessions() {
        let repository = Arc::new(InMemoryConversationRepository::new());
        let first = Conversation::new("tenant-1", "user-1");
        let second = Conversation::new("tenant-1", "user-1");
        repository.create(&first).await.expect("create");
        repository.create(&second).await.expect("create");

        let manager = HandoffManager::new(repository);
        manager
            .initiate_handoff(&request(&first.id))
            .await
            .expect("first thread");
        manager
            .initiate_handoff(&request(&second.id))
            .await
            .expect("second thread");

        manager
            .cancel_handoff(&first.id, "tenant-1")
            .await
            .expect("cancel first");
        assert!(manager
            .get_active_handoff(&second.id, "tenant-1")
            .await
            .expect("lookup")
            .is_some());
    }
}
