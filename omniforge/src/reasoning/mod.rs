//! Per-task reasoning: the append-only chain, the agent-facing engine,
//! the ReAct response parser, and the loop driver.

pub mod chain;
pub mod engine;
pub mod events;
pub mod parser;
pub mod react;

pub use chain::{
    ChainError, ChainMetrics, ChainStatus, ReasoningChain, ReasoningStep, SharedChain,
    StepPayload, StepType, SynthesisInfo, ThinkingInfo, ToolCallInfo, ToolResultInfo, ToolType,
    VisibilityConfig,
};
pub use engine::{EngineError, LlmRequest, ReasoningEngine, TaskRef, ToolCallOutcome};
pub use events::{ChainEvent, ChainEventSink};
pub use parser::{ParsedResponse, ReActParser};
pub use react::{LoopOutcome, ReActLoop, SkillAgent, DEFAULT_MAX_ITERATIONS};
