//! Message routing between the orchestrator and handoff targets.
//!
//! Each incoming user message is routed individually: when the thread has
//! an active handoff the message goes to the target agent, otherwise to
//! the orchestrator. The routing prefix makes the decision visible in
//! downstream logs and transcripts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::handoff::{HandoffError, HandoffManager};

/// Where a message was routed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteTarget {
    /// The thread's active handoff target.
    Handoff {
        /// The agent holding the thread.
        target_agent_id: String,
    },
    /// The default orchestrator.
    Orchestrator,
}

/// A routed message: destination plus the prefixed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedMessage {
    /// Destination.
    pub target: RouteTarget,
    /// The message with its routing prefix applied.
    pub content: String,
}

/// Routes incoming user messages per thread.
pub struct StreamRouter {
    handoffs: Arc<HandoffManager>,
}

impl StreamRouter {
    /// Router over a handoff manager.
    #[must_use]
    pub fn new(handoffs: Arc<HandoffManager>) -> Self {
        Self { handoffs }
    }

    /// Route one user message for a thread.
    pub async fn route_message(
        &self,
        thread_id: &str,
        tenant_id: &str,
        message: &str,
    ) -> Result<RoutedMessage, HandoffError> {
        match self.handoffs.get_active_handoff(thread_id, tenant_id).await? {
            Some(session) => {
                debug!(
                    thread_id,
                    target = session.target_agent_id,
                    "Routing message to handoff target"
                );
                Ok(RoutedMessage {
                    content: format!("[HANDOFF:{}] {message}", session.target_agent_id),
                    target: RouteTarget::Handoff {
                        target_agent_id: session.target_agent_id,
                    },
                })
            }
            None => Ok(RoutedMessage {
                target: RouteTarget::Orchestrator,
                content: format!("[ORCHESTRATOR] {message}"),
            }),
        }
    }

    /// Whether the thread currently has an active handoff.
    pub async fn is_handoff_active(
        &self,
        thread_id: &str,
        tenant_id: &str,
    ) -> Result<bool, HandoffError> {
        Ok(self
            .handoffs
            .get_active_handoff(thread_id, tenant_id)
            .await?
            .is_some())
    }
}

impl std::fmt::Debug for StreamRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRouter").finish_non_exhaustive()
    }
}
