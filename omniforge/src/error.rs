//! Platform-level error type.
//!
//! Each subsystem raises its own error enum; this umbrella exists for
//! embedders that drive several subsystems from one call site and want a
//! single `?`-able type.

use thiserror::Error;

/// A type alias for `Result<T, PlatformError>`.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Any error the platform can raise.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Task lifecycle error.
    #[error(transparent)]
    Task(#[from] crate::task::TaskError),

    /// Skill subsystem error.
    #[error(transparent)]
    Skill(#[from] crate::skill::SkillError),

    /// Tool layer error.
    #[error(transparent)]
    Tool(#[from] crate::tool::ToolError),

    /// Reasoning engine error.
    #[error(transparent)]
    Engine(#[from] crate::reasoning::EngineError),

    /// Reasoning chain error.
    #[error(transparent)]
    Chain(#[from] crate::reasoning::ChainError),

    /// Handoff protocol error.
    #[error(transparent)]
    Handoff(#[from] crate::orchestration::HandoffError),

    /// Delegation error.
    #[error(transparent)]
    Orchestration(#[from] crate::orchestration::OrchestrationError),

    /// OAuth error.
    #[error(transparent)]
    OAuth(#[from] crate::oauth::OAuthError),

    /// Repository error.
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
}
