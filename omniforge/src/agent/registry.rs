//! Agent lookup over the agent repository.

use std::sync::Arc;

use crate::storage::AgentRepository;
use crate::task::TaskError;

use super::Agent;

/// Resolves agent ids to live agents via the backing repository.
#[derive(Clone)]
pub struct AgentRegistry {
    repository: Arc<dyn AgentRepository>,
}

impl AgentRegistry {
    /// Registry over a repository.
    #[must_use]
    pub fn new(repository: Arc<dyn AgentRepository>) -> Self {
        Self { repository }
    }

    /// Resolve an agent by id.
    pub async fn resolve(&self, agent_id: &str) -> Result<Arc<dyn Agent>, TaskError> {
        self.repository
            .get(agent_id)
            .await
            .ok_or_else(|| TaskError::AgentNotFound(agent_id.to_string()))
    }

    /// Whether an agent with the id exists.
    pub async fn exists(&self, agent_id: &str) -> bool {
        self.repository.get(agent_id).await.is_some()
    }

    /// The backing repository.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn AgentRepository> {
        &self.repository
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry").finish_non_exhaustive()
    }
}
