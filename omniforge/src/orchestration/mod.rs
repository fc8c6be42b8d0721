//! Agent orchestration: handoffs, delegation, and message routing.

pub mod handoff;
pub mod manager;
pub mod messages;
pub mod router;
pub mod thread;

pub use handoff::{HandoffError, HandoffManager, HandoffSession, HandoffState};
pub use manager::{
    DelegationStrategy, OrchestrationError, OrchestrationManager, SubAgentResult,
    DEFAULT_AGENT_TIMEOUT,
};
pub use messages::{
    CompletionStatus, HandoffAccept, HandoffMessageError, HandoffRequest, HandoffReturn,
};
pub use router::{RouteTarget, RoutedMessage, StreamRouter};
pub use thread::{ThreadContext, ThreadContextBuilder, ORCHESTRATOR_AGENT};
