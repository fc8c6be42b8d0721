//! ReAct loop driver.
//!
//! Drives the bounded model→action→observation loop for a skill-backed
//! agent: each iteration builds the system prompt (skill body after
//! substitution and command injection, the allowed-tools section, and the
//! supporting-files index), asks the model for its next move through the
//! reasoning engine, and either executes the named tool, asks the user a
//! clarifying question, or finishes with the final answer. Hitting the
//! iteration limit fails the task.

use std::sync::Arc;

use async_stream::stream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::engine::{LlmRequest, ReasoningEngine, TaskRef};
use super::parser::{ParsedResponse, ReActParser};
use crate::agent::{Agent, AgentCapabilities, AgentIdentity, AgentSkillDescriptor};
use crate::event::{EventStream, TaskEvent};
use crate::reasoning::chain::{ReasoningChain, SharedChain};
use crate::skill::{
    ContextLoader, DynamicInjector, Skill, StringSubstitutor, SubstitutionContext,
};
use crate::task::{Task, TaskState};
use crate::tool::{JsonObject, ToolExecutor, ToolRegistry};

/// Default bound on loop iterations.
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The model produced a final answer.
    Success(String),
    /// The model asked the user a clarifying question.
    InputRequired(String),
    /// The loop failed; carries code and message.
    Failed {
        /// Stable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// The bounded reasoning loop for one skill and one task.
pub struct ReActLoop {
    engine: ReasoningEngine,
    skill: Skill,
    max_iterations: usize,
}

impl ReActLoop {
    /// Loop over an engine and an activated skill.
    #[must_use]
    pub fn new(engine: ReasoningEngine, skill: Skill) -> Self {
        Self {
            engine,
            skill,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Override the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the loop, emitting progress events through `events`.
    pub async fn run(
        &self,
        task_id: &str,
        user_message: &str,
        events: &mpsc::UnboundedSender<TaskEvent>,
    ) -> LoopOutcome {
        let (body, files_section) = self.prepare_skill_content(user_message).await;
        let tools_section = self.build_tools_section();
        let mut transcript: Vec<String> = Vec::new();
        let mut thinking_step_ids: Vec<String> = Vec::new();

        for iteration in 1..=self.max_iterations {
            let _ = events.send(TaskEvent::text(task_id, format!("Iteration {iteration}")));

            let system_prompt =
                self.build_system_prompt(&body, &tools_section, &files_section, iteration);
            let user_prompt = build_user_prompt(user_message, &transcript);

            let response_text = match self
                .engine
                .call_llm(LlmRequest::prompt(user_prompt).with_system(system_prompt))
                .await
            {
                Ok(outcome) if outcome.success() => extract_response_text(outcome.value()),
                Ok(outcome) => {
                    let error = outcome.error().unwrap_or("model call failed").to_string();
                    warn!(iteration, error, "Model call failed, continuing loop");
                    transcript.push(format!("Model call failed: {error}"));
                    continue;
                }
                Err(error) => {
                    warn!(iteration, %error, "Model call errored, continuing loop");
                    transcript.push(format!("Model call failed: {error}"));
                    continue;
                }
            };

            let parsed = ReActParser::parse(&response_text);

            if let Some(thought) = &parsed.thought {
                if let Ok(step) = self.engine.add_thinking(thought.clone(), None).await {
                    thinking_step_ids.push(step.id.to_string());
                }
                let _ = events.send(TaskEvent::text(task_id, format!("Thought: {thought}")));
            }

            if parsed.is_final {
                let answer = parsed
                    .final_answer
                    .clone()
                    .unwrap_or_else(|| "Task completed.".to_string());
                let _ = self
                    .engine
                    .add_synthesis(answer.clone(), &thinking_step_ids)
                    .await;
                let _ = events.send(TaskEvent::summary_text(
                    task_id,
                    format!("Final answer: {answer}"),
                ));
                self.engine.complete().await;
                return LoopOutcome::Success(answer);
            }

            if parsed.is_clarification {
                let question = parsed
                    .clarification_question
                    .clone()
                    .unwrap_or_else(|| "Additional input is required.".to_string());
                let _ = events.send(TaskEvent::summary_text(task_id, question.clone()));
                return LoopOutcome::InputRequired(question);
            }

            match &parsed.action {
                Some(action) => {
                    let _ = events.send(TaskEvent::summary_text(
                        task_id,
                        format!("Action: {action}"),
                    ));
                    let observation = self.execute_action(action, &parsed).await;
                    let _ = events.send(TaskEvent::text(
                        task_id,
                        format!("Observation: {observation}"),
                    ));
                    transcript.push(format!(
                        "Action: {action}\nObservation: {observation}"
                    ));
                }
                None => {
                    // Malformed or empty move; note it and advance.
                    debug!(iteration, "Response named no action and was not terminal");
                    transcript.push(
                        "The previous response was not a valid action, a clarification, \
                         or a final answer. Respond with the required JSON object."
                            .to_string(),
                    );
                }
            }
        }

        let message = format!(
            "No final answer after {} iterations",
            self.max_iterations
        );
        self.engine.fail("iteration_limit_exceeded", &message).await;
        LoopOutcome::Failed {
            code: "iteration_limit_exceeded".to_string(),
            message,
        }
    }

    /// Expand the skill body: variable substitution, then command
    /// injection, then the supporting-files index.
    async fn prepare_skill_content(&self, arguments: &str) -> (String, String) {
        let context = SubstitutionContext::build(
            arguments,
            None,
            self.skill.base_path.display().to_string(),
        );
        let substituted = StringSubstitutor::new().substitute(&self.skill.content, &context);

        let injector = DynamicInjector::new(self.skill.metadata.allowed_tools.clone());
        let injected = injector
            .process(&substituted.content, &self.skill.base_path)
            .await;

        let loader = ContextLoader::new();
        let loaded = loader.load_initial_context(&injected.content, &self.skill.base_path);
        let files_section = loader.build_available_files_prompt(&loaded);

        (injected.content, files_section)
    }

    fn build_tools_section(&self) -> String {
        let allowed = self
            .skill
            .metadata
            .allowed_tools
            .as_ref()
            .map(|tools| {
                tools
                    .iter()
                    .map(|entry| {
                        entry
                            .split_once('(')
                            .map_or(entry.as_str(), |(base, _)| base)
                            .to_lowercase()
                    })
                    .collect::<Vec<_>>()
            });

        let mut section = String::from("AVAILABLE TOOLS:\n");
        for definition in self.engine.get_available_tools() {
            let permitted = allowed
                .as_ref()
                .is_none_or(|names| names.contains(&definition.name.to_lowercase()));
            if !permitted || definition.name == "llm" {
                continue;
            }
            section.push_str(&format!(
                "- {}: {}\n",
                definition.name, definition.description
            ));
            for parameter in &definition.parameters {
                section.push_str(&format!(
                    "    {} ({}{}): {}\n",
                    parameter.name,
                    parameter.param_type,
                    if parameter.required { ", required" } else { "" },
                    parameter.description
                ));
            }
        }
        section
    }

    fn build_system_prompt(
        &self,
        body: &str,
        tools_section: &str,
        files_section: &str,
        iteration: usize,
    ) -> String {
        format!(
            "You are executing the skill '{name}'.\n\
             SKILL DESCRIPTION: {description}\n\n\
             SKILL INSTRUCTIONS:\n{body}\n\n\
             {tools_section}\n\
             {files_section}\n\
             This is iteration {iteration} of {max}.\n\n\
             Respond with a single JSON object:\n\
             {{\"thought\": \"...\", \"action\": \"tool_name\", \"action_input\": {{...}}, \
             \"is_final\": false, \"final_answer\": \"...\", \"clarification_question\": \"...\"}}\n\
             Use exactly one of: an action, is_final=true with final_answer, \
             or a clarification_question.",
            name = self.skill.metadata.name,
            description = self.skill.metadata.description,
            max = self.max_iterations,
        )
    }

    async fn execute_action(&self, action: &str, parsed: &ParsedResponse) -> String {
        let arguments = parsed.action_input.clone().unwrap_or_default();
        match self.engine.call_tool(action, arguments, None).await {
            Ok(outcome) if outcome.success() => render_observation(outcome.value()),
            Ok(outcome) => outcome.error().unwrap_or("tool failed").to_string(),
            Err(error) => error.to_string(),
        }
    }
}

fn build_user_prompt(user_message: &str, transcript: &[String]) -> String {
    if transcript.is_empty() {
        return format!("USER REQUEST:\n{user_message}");
    }
    format!(
        "USER REQUEST:\n{user_message}\n\nPROGRESS SO FAR:\n{}",
        transcript.join("\n")
    )
}

/// Pull the completion text out of an llm tool result.
fn extract_response_text(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(value) => value
            .get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        None => String::new(),
    }
}

/// Render a tool result payload as observation text.
fn render_observation(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
        None => "(no output)".to_string(),
    }
}

/// An agent that runs one skill through the ReAct loop.
///
/// The executor, chain, and engine are created per task; the activation
/// stack lives on that per-task executor, so concurrent tasks never share
/// restrictions.
pub struct SkillAgent {
    identity: AgentIdentity,
    skill: Skill,
    registry: Arc<ToolRegistry>,
    default_llm_model: Option<String>,
    max_iterations: usize,
}

impl SkillAgent {
    /// Agent running `skill` over the tools in `registry`.
    #[must_use]
    pub fn new(identity: AgentIdentity, skill: Skill, registry: Arc<ToolRegistry>) -> Self {
        Self {
            identity,
            skill,
            registry,
            default_llm_model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Override the model used for loop reasoning.
    #[must_use]
    pub fn with_default_llm_model(mut self, model: impl Into<String>) -> Self {
        self.default_llm_model = Some(model.into());
        self
    }

    /// Override the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[async_trait::async_trait]
impl Agent for SkillAgent {
    fn identity(&self) -> AgentIdentity {
        self.identity.clone()
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities {
            streaming: true,
            multi_turn: true,
            ..AgentCapabilities::default()
        }
    }

    fn skills(&self) -> Vec<AgentSkillDescriptor> {
        vec![AgentSkillDescriptor {
            name: self.skill.metadata.name.clone(),
            description: self.skill.metadata.description.clone(),
        }]
    }

    async fn process_task(&self, task: Task) -> EventStream {
        let executor = Arc::new(ToolExecutor::new(self.registry.clone()));
        let chain = SharedChain::new(
            ReasoningChain::new(&task.id, &self.identity.id).with_tenant(task.tenant_id.clone()),
        );
        let mut engine = ReasoningEngine::new(
            chain,
            executor.clone(),
            TaskRef {
                task_id: task.id.clone(),
                agent_id: self.identity.id.clone(),
                tenant_id: Some(task.tenant_id.clone()),
            },
        );
        if let Some(model) = &self.default_llm_model {
            engine = engine.with_default_model(model.clone());
        }

        let skill = self.skill.clone();
        let max_iterations = self.max_iterations;
        let task_id = task.id.clone();
        let user_message = task
            .messages
            .iter()
            .find_map(|message| {
                message
                    .parts
                    .iter()
                    .find_map(|part| part.as_text().map(str::to_string))
            })
            .unwrap_or_default();

        Box::pin(stream! {
            yield TaskEvent::status(&task_id, TaskState::Working);

            if let Err(error) = executor.activate_skill(skill.clone()) {
                yield TaskEvent::error(&task_id, "skill_activation_failed", error.to_string());
                yield TaskEvent::done(&task_id, TaskState::Failed);
                return;
            }

            let (sender, mut receiver) = mpsc::unbounded_channel();
            let runner = ReActLoop::new(engine, skill.clone())
                .with_max_iterations(max_iterations);
            let loop_task_id = task_id.clone();
            let run = tokio::spawn(async move {
                runner.run(&loop_task_id, &user_message, &sender).await
            });

            // Forward loop events as they arrive; the channel closes when
            // the loop finishes and drops its sender.
            while let Some(event) = receiver.recv().await {
                yield event;
            }
            let outcome = run.await.unwrap_or_else(|join_error| LoopOutcome::Failed {
                code: "loop_panicked".to_string(),
                message: join_error.to_string(),
            });

            if let Err(error) = executor.deactivate_skill(skill.name()) {
                warn!(%error, "Skill deactivation failed at end of loop");
            }

            match outcome {
                LoopOutcome::Success(_) => {
                    yield TaskEvent::done(&task_id, TaskState::Completed);
                }
                LoopOutcome::InputRequired(_) => {
                    yield TaskEvent::done(&task_id, TaskState::InputRequired);
                }
                LoopOutcome::Failed { code, message } => {
                    yield TaskEvent::error(&task_id, code, message);
                    yield TaskEvent::done(&task_id, TaskState::Failed);
                }
            }
        })
    }
}
