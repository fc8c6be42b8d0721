//! Task lifecycle management.
//!
//! The manager creates tasks, enforces transition legality, and drives an
//! agent's event stream to completion with durable per-event persistence:
//! every event is applied to the task and written back to the repository
//! before it is forwarded downstream, so a consumer observing event `n`
//! can always load the state implied by events `0..=n`.

use std::sync::Arc;

use async_stream::stream;
use chrono::Utc;
use tracing::{error, warn};

use super::{Task, TaskCreateRequest, TaskError, TaskState};
use crate::agent::AgentRegistry;
use crate::event::{EventStream, TaskEvent};
use crate::storage::TaskRepository;

/// Creates tasks and drives their processing.
pub struct TaskManager {
    tasks: Arc<dyn TaskRepository>,
    agents: AgentRegistry,
}

impl TaskManager {
    /// Manager over a task repository and agent registry.
    #[must_use]
    pub fn new(tasks: Arc<dyn TaskRepository>, agents: AgentRegistry) -> Self {
        Self { tasks, agents }
    }

    /// Create a task for an agent. Fails when the agent does not resolve.
    pub async fn create_task(
        &self,
        agent_id: &str,
        request: TaskCreateRequest,
    ) -> Result<Task, TaskError> {
        if !self.agents.exists(agent_id).await {
            return Err(TaskError::AgentNotFound(agent_id.to_string()));
        }
        let task = Task::new(agent_id, request);
        self.tasks
            .save(&task)
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?;
        Ok(task)
    }

    /// Load a task by id.
    pub async fn get_task(&self, id: &str) -> Result<Task, TaskError> {
        self.tasks
            .get(id)
            .await
            .ok_or_else(|| TaskError::TaskNotFound(id.to_string()))
    }

    /// Move a task to a new state, enforcing transition legality.
    pub async fn update_state(&self, id: &str, new_state: TaskState) -> Result<Task, TaskError> {
        let mut task = self.get_task(id).await?;
        if !task.state.can_transition_to(new_state) {
            return Err(TaskError::InvalidTransition {
                from: task.state,
                to: new_state,
            });
        }
        task.state = new_state;
        task.updated_at = Utc::now();
        self.tasks
            .update(&task)
            .await
            .map_err(|e| TaskError::Storage(e.to_string()))?;
        Ok(task)
    }

    /// Process a task through its agent.
    ///
    /// Resolves the agent, consumes its event stream, persists the task
    /// after applying each event, then re-emits the event. A persistence
    /// failure fails the task; the stream still terminates with a done
    /// event.
    pub async fn process_task(&self, task: Task) -> Result<EventStream, TaskError> {
        let agent = self.agents.resolve(&task.agent_id).await?;
        let repository = self.tasks.clone();
        let mut current = task.clone();
        let mut events = agent.process_task(task).await;

        Ok(Box::pin(stream! {
            use futures::StreamExt;

            let mut saw_done = false;
            while let Some(event) = events.next().await {
                current = current.apply_event(&event);
                if let Err(storage_error) = repository.update(&current).await {
                    error!(task_id = current.id, %storage_error, "Failed to persist task state");
                    current = current.apply_event(&TaskEvent::error(
                        &current.id,
                        "persistence_failed",
                        storage_error.to_string(),
                    ));
                    let _ = repository.update(&current).await;
                    yield TaskEvent::error(
                        &current.id,
                        "persistence_failed",
                        storage_error.to_string(),
                    );
                    yield TaskEvent::done(&current.id, TaskState::Failed);
                    return;
                }
                saw_done = event.is_done();
                yield event;
            }

            if !saw_done {
                // The agent broke its contract; close the stream cleanly.
                warn!(task_id = current.id, "Agent stream ended without a done event");
                current = current.apply_event(&TaskEvent::error(
                    &current.id,
                    "agent_stream_truncated",
                    "agent ended its stream without a terminal event",
                ));
                let _ = repository.update(&current).await;
                yield TaskEvent::done(&current.id, TaskState::Failed);
            }
        }))
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentIdentity};
    use crate::storage::memory::{InMemoryAgentRepository, InMemoryTaskRepository};
    use crate::storage::AgentRepository;
    use crate::task::MessagePart;
    use async_trait::async_trait;
    use futures::StreamExt;

    struct ScriptedAgent {
        identity: AgentIdentity,
    }

    impl ScriptedAgent {
        fn new() -> Self {
            Self {
                identity: AgentIdentity::new("test-agent", "Test Agent", "A test agent", "1.0.0"),
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn identity(&self) -> AgentIdentity {
            self.identity.clone()
        }

        async fn process_task(&self, task: Task) -> EventStream {
            let task_id = task.id;
            Box::pin(stream! {
                yield TaskEvent::status(&task_id, TaskState::Working);
                yield TaskEvent::text(&task_id, "making progress");
                yield TaskEvent::done(&task_id, TaskState::Completed);
            })
        }
    }

    async fn manager() -> (TaskManager, Arc<InMemoryTaskRepository>) {
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let agents = Arc::new(InMemoryAgentRepository::new());
        agents
            .save(Arc::new(ScriptedAgent::new()))
            .await
            .expect("save agent");
        (
            TaskManager::new(tasks.clone(), AgentRegistry::new(agents)),
            tasks,
        )
    }

    fn request() -> TaskCreateRequest {
        TaskCreateRequest {
            tenant_id: "tenant-1".to_string(),
            user_id: "user-1".to_string(),
            message_parts: vec![MessagePart::text("Hello, agent!")],
            parent_task_id: None,
            skill_name: None,
        }
    }

    #[tokio::test]
    async fn create_task_persists_submitted_task() {
        let (manager, tasks) = manager().await;
        let task = manager
            .create_task("test-agent", request())
            .await
            .expect("create");

        assert_eq!(task.state, TaskState::Submitted);
        assert_eq!(task.tenant_id, "tenant-1");
        let stored = tasks.get(&task.id).await.expect("stored");
        assert_eq!(stored.id, task.id);
    }

    #[tokio::test]
    async fn create_task_for_unknown_agent_fails() {
        let (manager, _) = manager().await;
        assert!(matches!(
            manager.create_task("ghost-agent", request()).await,
            Err(TaskError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn get_task_for_unknown_id_fails() {
        let (manager, _) = manager().await;
        assert!(matches!(
            manager.get_task("nope").await,
            Err(TaskError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_state_enforces_legality() {
        let (manager, _) = manager().await;
        let task = manager
            .create_task("test-agent", request())
            .await
            .expect("create");

        let updated = manager
            .update_state(&task.id, TaskState::Working)
            .await
            .expect("submitted -> working");
        assert_eq!(updated.state, TaskState::Working);
        assert!(updated.updated_at >= task.updated_at);

        // Illegal jumps fail.
        assert!(matches!(
            manager.update_state(&task.id, TaskState::Submitted).await,
            Err(TaskError::InvalidTransition { .. })
        ));

        manager
            .update_state(&task.id, TaskState::Completed)
            .await
            .expect("working -> completed");
        // Terminal states are frozen.
        assert!(matches!(
            manager.update_state(&task.id, TaskState::Working).await,
            Err(TaskError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn process_task_persists_before_forwarding() {
        let (manager, tasks) = manager().await;
        let task = manager
            .create_task("test-agent", request())
            .await
            .expect("create");

        let mut stream = manager.process_task(task.clone()).await.expect("stream");
        let mut seen = Vec::new();
        while let Some(event) = stream.next().await {
            // At the moment an event is observed, the store already
            // reflects it.
            let stored = tasks.get(&task.id).await.expect("stored");
            match &event {
                TaskEvent::Status { state, .. } => assert_eq!(stored.state, *state),
                TaskEvent::Message { .. } => assert_eq!(stored.messages.len(), 2),
                TaskEvent::Done { final_state, .. } => assert_eq!(stored.state, *final_state),
                _ => {}
            }
            seen.push(event);
        }

        assert_eq!(seen.len(), 3);
        assert!(seen.last().expect("last").is_done());
        let final_task = tasks.get(&task.id).await.expect("stored");
        assert_eq!(final_task.state, TaskState::Completed);
    }

    #[tokio::test]
    async fn process_task_with_unknown_agent_fails() {
        let (manager, _) = manager().await;
        let mut task = Task::new("ghost-agent", request());
        task.agent_id = "ghost-agent".to_string();
        assert!(matches!(
            manager.process_task(task).await,
            Err(TaskError::AgentNotFound(_))
        ));
    }
}
