//! Agent contract and identity model.
//!
//! An agent converts a [`Task`] into an asynchronous stream of
//! [`TaskEvent`]s. Implementations must emit exactly one terminal done
//! event and must not mutate the task directly; the task manager applies
//! events to evolve task state.

pub mod registry;

pub use registry::AgentRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::event::EventStream;
use crate::task::Task;

/// Stable identity of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Stable agent id, the routing key for tasks.
    pub id: String,
    /// Display name.
    pub name: String,
    /// What the agent does.
    pub description: String,
    /// Agent version.
    pub version: String,
    /// Owning tenant; `None` for platform-wide agents.
    pub tenant_id: Option<String>,
}

impl AgentIdentity {
    /// Identity for a platform-wide agent.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            version: version.into(),
            tenant_id: None,
        }
    }

    /// Scope the agent to a tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Capabilities an agent advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCapabilities {
    /// Whether the agent streams incremental events.
    pub streaming: bool,
    /// Whether the agent supports push notifications.
    pub push_notifications: bool,
    /// Whether the agent holds multi-turn conversations.
    pub multi_turn: bool,
    /// Whether the agent supports human-in-the-loop pauses.
    pub hitl_support: bool,
}

/// Descriptor of a skill an agent advertises. Descriptive only; the skill
/// subsystem owns the actual bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSkillDescriptor {
    /// Skill name.
    pub name: String,
    /// What the skill does.
    pub description: String,
}

/// A named process that converts tasks into event streams.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The agent's stable identity.
    fn identity(&self) -> AgentIdentity;

    /// Advertised capabilities.
    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            streaming: true,
            ..AgentCapabilities::default()
        }
    }

    /// Skills the agent advertises.
    fn skills(&self) -> Vec<AgentSkillDescriptor> {
        Vec::new()
    }

    /// Process a task, yielding events until exactly one terminal done
    /// event.
    async fn process_task(&self, task: Task) -> EventStream;
}
