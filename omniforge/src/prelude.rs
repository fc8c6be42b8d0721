//! Convenience re-exports for platform consumers.

pub use crate::agent::{
    Agent, AgentCapabilities, AgentIdentity, AgentRegistry, AgentSkillDescriptor,
};
pub use crate::config::PlatformConfig;
pub use crate::error::PlatformError;
pub use crate::conversation::{Conversation, ConversationMessage, ConversationRole};
pub use crate::event::{
    filter_event_stream, ConsumerRole, EventStream, TaskEvent, VisibilityLevel,
};
pub use crate::oauth::{OAuthConfig, OAuthError, OAuthManager, TokenCipher};
pub use crate::orchestration::{
    CompletionStatus, DelegationStrategy, HandoffManager, HandoffRequest, HandoffSession,
    OrchestrationManager, StreamRouter, SubAgentResult,
};
pub use crate::reasoning::{
    ChainStatus, LlmRequest, ReasoningChain, ReasoningEngine, ReActLoop, ReActParser,
    SharedChain, SkillAgent, StepType, TaskRef,
};
pub use crate::skill::{
    Skill, SkillContext, SkillError, SkillLoader, SkillMetadata, StorageLayer,
};
pub use crate::storage::{
    AgentRepository, ConversationRepository, InMemoryAgentRepository,
    InMemoryConversationRepository, InMemoryOAuthRepository, InMemoryTaskRepository,
    OAuthRepository, TaskRepository,
};
pub use crate::task::{
    Task, TaskCreateRequest, TaskManager, TaskState,
};
pub use crate::tool::{
    builtin::LlmTool, builtin::SkillTool, builtin::SubAgentTool, Tool, ToolCallContext,
    ToolDefinition, ToolExecutor, ToolRegistry, ToolResult,
};
