//! Omniforge is a multi-tenant agent-execution platform: clients submit
//! natural-language tasks to named agents, the platform activates packaged
//! skills, drives a ReAct reasoning loop over a restricted tool surface,
//! and streams lifecycle events back through per-role visibility
//! filtering.
//!
//! # Architecture
//!
//! ```text
//! TaskManager ── resolves ──> Agent (e.g. SkillAgent)
//!      │                         │
//!      │ applies + persists      │ drives
//!      v                         v
//!  TaskEvent stream         ReActLoop ──> ReasoningEngine ──> ToolExecutor
//!      │                                        │                  │
//!      v                                        v                  v
//!  visibility filter                      ReasoningChain      ToolRegistry
//! ```
//!
//! Everything an agent does is recorded in an append-only reasoning chain
//! with correlated tool-call/tool-result pairs; the chain, the task event
//! stream, and the skill activation stack are the load-bearing invariants
//! of the whole platform.

// Core model
pub mod config;
pub mod error;
pub mod event;
pub mod task;

// Reasoning and execution
pub mod reasoning;
pub mod tool;

// Skills
pub mod skill;

// Agents and orchestration
pub mod agent;
pub mod conversation;
pub mod orchestration;

// Integrations and persistence
pub mod oauth;
pub mod storage;

pub mod prelude;
