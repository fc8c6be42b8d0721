//! Repository contracts.
//!
//! The core persists through these four abstract interfaces; the choice of
//! store behind them is irrelevant to the engine. Implementations must
//! provide atomic single-row reads/writes and transactional multi-writes
//! (persisting a message and bumping the conversation's `updated_at`
//! happen together). Tenant filtering is mandatory on every tenant-scoped
//! listing.

pub mod memory;

pub use memory::{
    InMemoryAgentRepository, InMemoryConversationRepository, InMemoryOAuthRepository,
    InMemoryTaskRepository,
};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::agent::Agent;
use crate::conversation::{Conversation, ConversationMessage};
use crate::oauth::{OAuthCredential, OAuthStateRecord};
use crate::task::Task;

/// Errors raised by repositories.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An entity with the same id already exists.
    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    /// No entity with the given id exists (within the caller's tenant).
    #[error("'{0}' not found")]
    NotFound(String),

    /// Backend-specific failure.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence for tasks.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Save a new task. Saving a duplicate id is an error.
    async fn save(&self, task: &Task) -> Result<(), StorageError>;
    /// Load a task by id.
    async fn get(&self, id: &str) -> Option<Task>;
    /// Overwrite an existing task.
    async fn update(&self, task: &Task) -> Result<(), StorageError>;
    /// Delete a task by id.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
    /// Tasks addressed to an agent.
    async fn list_by_agent(&self, agent_id: &str) -> Vec<Task>;
    /// Tasks owned by a tenant.
    async fn list_by_tenant(&self, tenant_id: &str) -> Vec<Task>;
    /// A tenant's tasks for one skill.
    async fn list_by_skill(&self, tenant_id: &str, skill_name: &str) -> Vec<Task>;
}

/// Persistence for agents. Live agent instances are registered here and
/// resolved by id when tasks arrive.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Register an agent under its identity id.
    async fn save(&self, agent: Arc<dyn Agent>) -> Result<(), StorageError>;
    /// Resolve an agent by id.
    async fn get(&self, id: &str) -> Option<Arc<dyn Agent>>;
    /// Remove an agent.
    async fn delete(&self, id: &str) -> Result<(), StorageError>;
    /// All registered agents.
    async fn list_all(&self) -> Vec<Arc<dyn Agent>>;
    /// Agents scoped to a tenant (platform-wide agents excluded).
    async fn list_by_tenant(&self, tenant_id: &str) -> Vec<Arc<dyn Agent>>;
}

/// Persistence for conversations and their messages.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Create a conversation. Duplicate id is an error.
    async fn create(&self, conversation: &Conversation) -> Result<(), StorageError>;
    /// Load a conversation, scoped to the caller's tenant. Cross-tenant
    /// lookups are indistinguishable from missing threads.
    async fn get(&self, id: &str, tenant_id: &str) -> Option<Conversation>;
    /// A tenant's conversations, newest first, optionally filtered by
    /// user, with pagination.
    async fn list(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<Conversation>;
    /// Overwrite a conversation, including its `state_metadata`, as one
    /// atomic write.
    async fn update(&self, conversation: &Conversation) -> Result<(), StorageError>;
    /// Append a message and bump the conversation's `updated_at` in the
    /// same transaction.
    async fn add_message(
        &self,
        tenant_id: &str,
        message: &ConversationMessage,
    ) -> Result<(), StorageError>;
    /// All messages of a conversation, oldest first.
    async fn get_messages(
        &self,
        conversation_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<ConversationMessage>, StorageError>;
    /// The newest `count` messages, oldest first, optionally excluding
    /// system messages.
    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        tenant_id: &str,
        count: usize,
        include_system: bool,
    ) -> Result<Vec<ConversationMessage>, StorageError>;
}

/// Persistence for OAuth credentials and pending flow states.
#[async_trait]
pub trait OAuthRepository: Send + Sync {
    /// Store a pending flow state.
    async fn save_state(&self, state: &OAuthStateRecord) -> Result<(), StorageError>;
    /// Load a pending flow state by token.
    async fn get_state(&self, state: &str) -> Option<OAuthStateRecord>;
    /// Delete a consumed flow state.
    async fn delete_state(&self, state: &str) -> Result<(), StorageError>;
    /// Delete every state expiring before `now`; returns how many were
    /// deleted.
    async fn delete_expired_states(&self, now: DateTime<Utc>) -> usize;
    /// Store a credential. Duplicate id is an error.
    async fn save_credential(&self, credential: &OAuthCredential) -> Result<(), StorageError>;
    /// Load a credential by id.
    async fn get_credential(&self, id: &str) -> Option<OAuthCredential>;
    /// Overwrite an existing credential.
    async fn update_credential(&self, credential: &OAuthCredential) -> Result<(), StorageError>;
    /// Delete a credential.
    async fn delete_credential(&self, id: &str) -> Result<(), StorageError>;
    /// A user's credentials within a tenant.
    async fn list_credentials(&self, user_id: &str, tenant_id: &str) -> Vec<OAuthCredential>;
}
