//! End-to-end scenarios for the platform: skill-driven ReAct runs through
//! the task manager, restriction enforcement, retry behavior, handoff
//! recovery, and first-success delegation.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use omniforge::event::{filter_event_stream, ConsumerRole, EventStream, TaskEvent};
use omniforge::orchestration::{
    CompletionStatus, DelegationStrategy, HandoffManager, HandoffRequest, HandoffState,
    OrchestrationManager, StreamRouter,
};
use omniforge::prelude::*;
use omniforge::reasoning::SkillAgent;
use omniforge::skill::{SkillMetadata, StorageLayer};
use omniforge::task::{MessagePart, TaskCreateRequest};
use omniforge::tool::builtin::llm::MockCompletionBackend;
use omniforge::tool::{
    JsonObject, RetryConfig, ToolExecutionError, ToolParameter,
};
use omniforge::reasoning::chain::ToolType;

// ---------------------------------------------------------------------------
// Test tools
// ---------------------------------------------------------------------------

/// Read-class stub: returns "Hello" for any path, and records invocations.
struct StubReadTool {
    definition: ToolDefinition,
    calls: Arc<AtomicU32>,
}

impl StubReadTool {
    fn new() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                definition: ToolDefinition::new("read", ToolType::FileSystem, "Read a file")
                    .with_parameter(ToolParameter::required("file_path", "string", "Path")),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Tool for StubReadTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _context: &ToolCallContext,
        _arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(serde_json::json!("Hello")))
    }
}

/// Write-class stub that must never run under a read-only skill.
struct StubWriteTool {
    definition: ToolDefinition,
    calls: Arc<AtomicU32>,
}

impl StubWriteTool {
    fn new() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                definition: ToolDefinition::new("write", ToolType::FileSystem, "Write a file")
                    .with_parameter(ToolParameter::required("file_path", "string", "Path")),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl Tool for StubWriteTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _context: &ToolCallContext,
        _arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(serde_json::json!("written")))
    }
}

fn summarizer_skill(allowed: &[&str]) -> Skill {
    Skill::new(
        SkillMetadata::new("summarizer", "A skill that summarizes files.")
            .with_allowed_tools(allowed.iter().map(|s| s.to_string()).collect()),
        "Summarize the file the user names.",
        "/tmp/skills/summarizer",
        StorageLayer::Project,
    )
}

fn request(text: &str) -> TaskCreateRequest {
    TaskCreateRequest {
        tenant_id: "tenant-1".to_string(),
        user_id: "user-1".to_string(),
        message_parts: vec![MessagePart::text(text)],
        parent_task_id: None,
        skill_name: Some("summarizer".to_string()),
    }
}

fn message_texts(events: &[TaskEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            TaskEvent::Message { parts, .. } => {
                parts.first().and_then(|p| p.as_text()).map(str::to_string)
            }
            _ => None,
        })
        .collect()
}

async fn platform_with(
    model_responses: Vec<&str>,
    skill: Skill,
) -> (TaskManager, Arc<AtomicU32>, Arc<AtomicU32>) {
    let mut registry = ToolRegistry::new();
    let (read, read_calls) = StubReadTool::new();
    let (write, write_calls) = StubWriteTool::new();
    registry.register(Arc::new(read));
    registry.register(Arc::new(write));
    registry.register(Arc::new(LlmTool::new(Arc::new(MockCompletionBackend::new(
        model_responses.into_iter().map(str::to_string).collect(),
    )))));

    let agents = Arc::new(InMemoryAgentRepository::new());
    agents
        .save(Arc::new(SkillAgent::new(
            AgentIdentity::new("skill-agent", "Skill Agent", "Runs the summarizer", "1.0.0"),
            skill,
            Arc::new(registry),
        )))
        .await
        .unwrap();

    let tasks = Arc::new(InMemoryTaskRepository::new());
    (
        TaskManager::new(tasks, AgentRegistry::new(agents)),
        read_calls,
        write_calls,
    )
}

// ---------------------------------------------------------------------------
// Basic ReAct run with one tool call
// ---------------------------------------------------------------------------

#[tokio::test]
async fn basic_react_run_with_one_tool_call() {
    let (manager, read_calls, _) = platform_with(
        vec![
            r#"{"thought": "I should read the file first", "action": "read", "action_input": {"file_path": "/docs/a.md"}, "is_final": false}"#,
            r#"{"final_answer": "The file says Hello.", "is_final": true}"#,
        ],
        summarizer_skill(&["read"]),
    )
    .await;

    let task = manager
        .create_task("skill-agent", request("summarize /docs/a.md"))
        .await
        .unwrap();
    let stream = manager.process_task(task.clone()).await.unwrap();
    let events: Vec<TaskEvent> =
        filter_event_stream(stream, ConsumerRole::Developer).collect().await;

    // Status first, done last, the narrated loop in between.
    assert!(matches!(
        events.first().unwrap(),
        TaskEvent::Status { state: TaskState::Working, .. }
    ));
    assert!(matches!(
        events.last().unwrap(),
        TaskEvent::Done { final_state: TaskState::Completed, .. }
    ));

    let texts = message_texts(&events);
    assert_eq!(texts[0], "Iteration 1");
    assert!(texts[1].starts_with("Thought: "));
    assert_eq!(texts[2], "Action: read");
    assert_eq!(texts[3], "Observation: Hello");
    assert_eq!(texts[4], "Iteration 2");
    assert_eq!(texts[5], "Final answer: The file says Hello.");

    assert_eq!(read_calls.load(Ordering::SeqCst), 1);

    // The persisted task converged to the final state.
    let stored = manager.get_task(&task.id).await.unwrap();
    assert_eq!(stored.state, TaskState::Completed);
}

// ---------------------------------------------------------------------------
// The skill blocks a disallowed tool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skill_blocks_disallowed_tool() {
    let (manager, _, write_calls) = platform_with(
        vec![
            r#"{"thought": "let me write the summary", "action": "write", "action_input": {"file_path": "/docs/summary.md"}, "is_final": false}"#,
            r#"{"final_answer": "I cannot write files with this skill.", "is_final": true}"#,
        ],
        summarizer_skill(&["read"]),
    )
    .await;

    let task = manager
        .create_task("skill-agent", request("summarize and save /docs/a.md"))
        .await
        .unwrap();
    let stream = manager.process_task(task).await.unwrap();
    let events: Vec<TaskEvent> =
        filter_event_stream(stream, ConsumerRole::Developer).collect().await;

    let texts = message_texts(&events);
    let observation = texts
        .iter()
        .find(|t| t.starts_with("Observation:"))
        .unwrap();
    assert!(observation.contains("cannot use tool 'write'"));

    // The write implementation never ran; the loop continued to completion.
    assert_eq!(write_calls.load(Ordering::SeqCst), 0);
    assert!(matches!(
        events.last().unwrap(),
        TaskEvent::Done { final_state: TaskState::Completed, .. }
    ));
}

// ---------------------------------------------------------------------------
// The skill blocks reads of its own hook scripts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn skill_blocks_hook_script_read() {
    let skill = summarizer_skill(&["read"]).with_script("pre", "/skills/s/pre.sh");
    let (manager, read_calls, _) = platform_with(
        vec![
            r#"{"thought": "peek at the hook", "action": "read", "action_input": {"file_path": "/skills/s/pre.sh"}, "is_final": false}"#,
            r#"{"final_answer": "Understood, moving on.", "is_final": true}"#,
        ],
        skill,
    )
    .await;

    let task = manager
        .create_task("skill-agent", request("read the pre hook"))
        .await
        .unwrap();
    let stream = manager.process_task(task).await.unwrap();
    let events: Vec<TaskEvent> =
        filter_event_stream(stream, ConsumerRole::Developer).collect().await;

    let texts = message_texts(&events);
    let observation = texts
        .iter()
        .find(|t| t.starts_with("Observation:"))
        .unwrap();
    assert!(observation.contains("hook scripts"));
    assert!(observation.contains("context efficiency"));
    assert_eq!(read_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Retry with exponential backoff
// ---------------------------------------------------------------------------

struct FlakyNetworkTool {
    definition: ToolDefinition,
    attempts: AtomicU32,
}

#[async_trait]
impl Tool for FlakyNetworkTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(
        &self,
        _context: &ToolCallContext,
        _arguments: JsonObject,
    ) -> Result<ToolResult, ToolExecutionError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(ToolExecutionError::Connection("network".to_string()))
        } else {
            Ok(ToolResult::ok(serde_json::json!("recovered")))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retry_with_backoff() {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(FlakyNetworkTool {
        definition: ToolDefinition::new("fetch", ToolType::Api, "Fetch a resource")
            .with_retry_config(RetryConfig {
                max_retries: 3,
                backoff_ms: 100,
                backoff_multiplier: 2.0,
                retryable_errors: Vec::new(),
            }),
        attempts: AtomicU32::new(0),
    }));
    let executor = ToolExecutor::new(Arc::new(registry));
    let chain = SharedChain::new(ReasoningChain::new("task-1", "agent-1"));

    let started = tokio::time::Instant::now();
    let result = executor
        .execute(
            "fetch",
            JsonObject::new(),
            &ToolCallContext::new("task-1", "agent-1"),
            &chain,
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.retry_count, 2);
    // 100 ms then 200 ms of backoff under the paused clock.
    assert_eq!(started.elapsed(), Duration::from_millis(300));

    let snapshot = chain.snapshot().await;
    assert!(snapshot.verify_integrity().is_ok());
}

// ---------------------------------------------------------------------------
// Handoff lifecycle with recovery and tenant isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handoff_lifecycle_with_recovery() {
    let conversations = Arc::new(InMemoryConversationRepository::new());
    let conversation = Conversation::new("tenant-t", "user-1");
    conversations.create(&conversation).await.unwrap();

    // Initiate through one manager instance.
    let manager = HandoffManager::new(conversations.clone());
    let accept = manager
        .initiate_handoff(
            &HandoffRequest::new(
                &conversation.id,
                "tenant-t",
                "agent-a",
                "agent-b",
                "help",
                "X",
            )
            .unwrap(),
        )
        .await
        .unwrap();
    assert!(accept.accepted);

    // Drop the manager; a fresh instance rebuilds from persistence.
    drop(manager);
    let fresh = HandoffManager::new(conversations.clone());
    let session = fresh
        .get_active_handoff(&conversation.id, "tenant-t")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.state, HandoffState::Active);
    assert_eq!(session.target_agent_id, "agent-b");

    // Routing follows the recovered handoff.
    let router = StreamRouter::new(Arc::new(HandoffManager::new(conversations.clone())));
    let routed = router
        .route_message(&conversation.id, "tenant-t", "next question")
        .await
        .unwrap();
    assert!(routed.content.starts_with("[HANDOFF:agent-b]"));

    // Complete and verify the active session is gone.
    fresh
        .complete_handoff(
            &conversation.id,
            "tenant-t",
            CompletionStatus::Completed,
            Some("done".to_string()),
            None,
        )
        .await
        .unwrap();
    assert!(fresh
        .get_active_handoff(&conversation.id, "tenant-t")
        .await
        .unwrap()
        .is_none());

    // Cross-tenant access is indistinguishable from a missing thread.
    let cross = fresh
        .get_active_handoff(&conversation.id, "tenant-other")
        .await;
    let missing = fresh.get_active_handoff("no-thread", "tenant-other").await;
    assert_eq!(
        format!("{:?}", cross.map_err(|e| e.to_string().replace(&conversation.id, "<id>"))),
        format!("{:?}", missing.map_err(|e| e.to_string().replace("no-thread", "<id>"))),
    );
}

// ---------------------------------------------------------------------------
// First-success delegation cancels the losers
// ---------------------------------------------------------------------------

struct TimedAgent {
    identity: AgentIdentity,
    reply: String,
    delay: Duration,
    finished: Arc<AtomicU32>,
}

#[async_trait]
impl Agent for TimedAgent {
    fn identity(&self) -> AgentIdentity {
        self.identity.clone()
    }

    async fn process_task(&self, task: omniforge::task::Task) -> EventStream {
        let task_id = task.id;
        let reply = self.reply.clone();
        let delay = self.delay;
        let finished = self.finished.clone();
        Box::pin(async_stream::stream! {
            tokio::time::sleep(delay).await;
            finished.fetch_add(1, Ordering::SeqCst);
            yield TaskEvent::text(&task_id, reply);
            yield TaskEvent::done(&task_id, TaskState::Completed);
        })
    }
}

#[tokio::test]
async fn first_success_delegation_cancels_siblings() {
    let repository = Arc::new(InMemoryAgentRepository::new());
    let mut finish_flags = Vec::new();
    for (index, delay_ms) in [(0u32, 10u64), (1, 1000), (2, 1000)] {
        let finished = Arc::new(AtomicU32::new(0));
        finish_flags.push(finished.clone());
        repository
            .save(Arc::new(TimedAgent {
                identity: AgentIdentity::new(
                    format!("agent-{index}"),
                    format!("Agent {index}"),
                    "delegation target",
                    "1.0.0",
                ),
                reply: if index == 0 { "ok".to_string() } else { "late".to_string() },
                delay: Duration::from_millis(delay_ms),
                finished,
            }))
            .await
            .unwrap();
    }

    let manager = OrchestrationManager::new(AgentRegistry::new(repository));
    let results = manager
        .delegate_to_agents(
            "thread-1",
            "tenant-1",
            "user-1",
            "who can answer fastest?",
            &[
                "agent-0".to_string(),
                "agent-1".to_string(),
                "agent-2".to_string(),
            ],
            DelegationStrategy::FirstSuccess,
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].agent_id, "agent-0");
    assert!(results[0].success);
    assert_eq!(results[0].response.as_deref(), Some("ok"));
    assert_eq!(manager.synthesize_responses(&results), "ok");

    // The slow agents were aborted; their side effects never happened.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(finish_flags[1].load(Ordering::SeqCst), 0);
    assert_eq!(finish_flags[2].load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Visibility filtering across a real run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_user_sees_only_summary_events_and_redacted_text() {
    let (manager, _, _) = platform_with(
        vec![
            r#"{"thought": "the key is api_key=sk-secret123", "action": "read", "action_input": {"file_path": "/docs/a.md"}, "is_final": false}"#,
            r#"{"final_answer": "Done, connected with api_key=sk-secret123 earlier.", "is_final": true}"#,
        ],
        summarizer_skill(&["read"]),
    )
    .await;

    let task = manager
        .create_task("skill-agent", request("summarize /docs/a.md"))
        .await
        .unwrap();
    let stream = manager.process_task(task).await.unwrap();
    let events: Vec<TaskEvent> =
        filter_event_stream(stream, ConsumerRole::EndUser).collect().await;

    let texts = message_texts(&events);
    // Full-detail iteration/thought/observation lines were filtered out.
    assert!(texts.iter().all(|t| !t.starts_with("Iteration")));
    assert!(texts.iter().all(|t| !t.starts_with("Thought:")));
    assert!(texts.iter().all(|t| !t.starts_with("Observation:")));
    // Summary lines survive, with secrets redacted.
    assert!(texts.iter().any(|t| t == "Action: read"));
    let final_line = texts.iter().find(|t| t.starts_with("Final answer:")).unwrap();
    assert!(final_line.contains("api_key=[REDACTED]"));
    assert!(!final_line.contains("sk-secret123"));
    // The terminal event always arrives.
    assert!(events.last().unwrap().is_done());
}
