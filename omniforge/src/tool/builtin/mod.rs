//! Built-in platform tools.
//!
//! Only the tools the core itself depends on live here: the synthetic
//! `llm` tool, the `skill` pseudo-tool, and the `sub_agent` delegation
//! tool. File, shell, and HTTP tools are deployment concerns and are
//! registered by the host.

pub mod llm;
pub mod skill;
pub mod sub_agent;

pub use llm::{CompletionBackend, CompletionRequest, CompletionResponse, LlmTool};
pub use skill::SkillTool;
pub use sub_agent::SubAgentTool;
