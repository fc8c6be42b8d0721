//! In-memory repository implementations.
//!
//! Reference implementations of the repository contracts over
//! `tokio::sync::RwLock` maps. They are the test substrate and double as
//! the single-process deployment story; a relational store implements the
//! same traits for durable deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    AgentRepository, ConversationRepository, OAuthRepository, StorageError, TaskRepository,
};
use crate::agent::Agent;
use crate::conversation::{Conversation, ConversationMessage, ConversationRole};
use crate::oauth::{OAuthCredential, OAuthStateRecord};
use crate::task::Task;

/// In-memory task store.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskRepository {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(StorageError::DuplicateId(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    async fn update(&self, task: &Task) -> Result<(), StorageError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&task.id) {
            return Err(StorageError::NotFound(task.id.clone()));
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.tasks
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_by_agent(&self, agent_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.agent_id == agent_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.tenant_id == tenant_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    async fn list_by_skill(&self, tenant_id: &str, skill_name: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| {
                task.tenant_id == tenant_id && task.skill_name.as_deref() == Some(skill_name)
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }
}

/// In-memory agent store.
#[derive(Default)]
pub struct InMemoryAgentRepository {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl InMemoryAgentRepository {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: Arc<dyn Agent>) -> Result<(), StorageError> {
        let id = agent.identity().id;
        self.agents.write().await.insert(id, agent);
        Ok(())
    }

    async fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(id).cloned()
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.agents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_all(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.values().cloned().collect()
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Vec<Arc<dyn Agent>> {
        self.agents
            .read()
            .await
            .values()
            .filter(|agent| agent.identity().tenant_id.as_deref() == Some(tenant_id))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct ConversationState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<ConversationMessage>>,
}

/// In-memory conversation store.
#[derive(Default)]
pub struct InMemoryConversationRepository {
    state: RwLock<ConversationState>,
}

impl InMemoryConversationRepository {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(&self, conversation: &Conversation) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(StorageError::DuplicateId(conversation.id.clone()));
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        state.messages.insert(conversation.id.clone(), Vec::new());
        Ok(())
    }

    async fn get(&self, id: &str, tenant_id: &str) -> Option<Conversation> {
        self.state
            .read()
            .await
            .conversations
            .get(id)
            .filter(|conversation| conversation.tenant_id == tenant_id)
            .cloned()
    }

    async fn list(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Vec<Conversation> {
        let state = self.state.read().await;
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|conversation| conversation.tenant_id == tenant_id)
            .filter(|conversation| {
                user_id.is_none_or(|user| conversation.user_id == user)
            })
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        conversations.into_iter().skip(offset).take(limit).collect()
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let existing = state
            .conversations
            .get(&conversation.id)
            .ok_or_else(|| StorageError::NotFound(conversation.id.clone()))?;
        if existing.tenant_id != conversation.tenant_id {
            return Err(StorageError::NotFound(conversation.id.clone()));
        }
        let mut updated = conversation.clone();
        updated.updated_at = Utc::now();
        state.conversations.insert(conversation.id.clone(), updated);
        Ok(())
    }

    async fn add_message(
        &self,
        tenant_id: &str,
        message: &ConversationMessage,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(&message.conversation_id)
            .filter(|conversation| conversation.tenant_id == tenant_id)
            .ok_or_else(|| StorageError::NotFound(message.conversation_id.clone()))?;
        conversation.updated_at = Utc::now();
        state
            .messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        tenant_id: &str,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        let state = self.state.read().await;
        let owned = state
            .conversations
            .get(conversation_id)
            .is_some_and(|conversation| conversation.tenant_id == tenant_id);
        if !owned {
            return Err(StorageError::NotFound(conversation_id.to_string()));
        }
        Ok(state
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        tenant_id: &str,
        count: usize,
        include_system: bool,
    ) -> Result<Vec<ConversationMessage>, StorageError> {
        let messages = self.get_messages(conversation_id, tenant_id).await?;
        let filtered: Vec<ConversationMessage> = messages
            .into_iter()
            .filter(|message| include_system || message.role != ConversationRole::System)
            .collect();
        let skip = filtered.len().saturating_sub(count);
        Ok(filtered.into_iter().skip(skip).collect())
    }
}

#[derive(Default)]
struct OAuthState {
    states: HashMap<String, OAuthStateRecord>,
    credentials: HashMap<String, OAuthCredential>,
}

/// In-memory OAuth store.
#[derive(Default)]
pub struct InMemoryOAuthRepository {
    state: RwLock<OAuthState>,
}

impl InMemoryOAuthRepository {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OAuthRepository for InMemoryOAuthRepository {
    async fn save_state(&self, record: &OAuthStateRecord) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .states
            .insert(record.state.clone(), record.clone());
        Ok(())
    }

    async fn get_state(&self, state: &str) -> Option<OAuthStateRecord> {
        self.state.read().await.states.get(state).cloned()
    }

    async fn delete_state(&self, state: &str) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .states
            .remove(state)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(state.to_string()))
    }

    async fn delete_expired_states(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write().await;
        let before = state.states.len();
        state.states.retain(|_, record| record.expires_at >= now);
        before - state.states.len()
    }

    async fn save_credential(&self, credential: &OAuthCredential) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.credentials.contains_key(&credential.id) {
            return Err(StorageError::DuplicateId(credential.id.clone()));
        }
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    async fn get_credential(&self, id: &str) -> Option<OAuthCredential> {
        self.state.read().await.credentials.get(id).cloned()
    }

    async fn update_credential(&self, credential: &OAuthCredential) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if !state.credentials.contains_key(&credential.id) {
            return Err(StorageError::NotFound(credential.id.clone()));
        }
        state
            .credentials
            .insert(credential.id.clone(), credential.clone());
        Ok(())
    }

    async fn delete_credential(&self, id: &str) -> Result<(), StorageError> {
        self.state
            .write()
            .await
            .credentials
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn list_credentials(&self, user_id: &str, tenant_id: &str) -> Vec<OAuthCredential> {
        self.state
            .read()
            .await
            .credentials
            .values()
            .filter(|credential| {
                credential.user_id == user_id && credential.tenant_id == tenant_id
            })
            .cloned()
            .collect()
    }
}
