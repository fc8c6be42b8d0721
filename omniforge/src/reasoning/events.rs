//! Chain lifecycle events.
//!
//! The reasoning engine publishes these as a chain progresses so observers
//! (debug UIs, telemetry sinks) can follow reasoning in real time without
//! polling the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::chain::{ChainMetrics, ReasoningStep};

/// Events describing the life of one reasoning chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ChainEvent {
    /// A chain began.
    ChainStarted {
        /// Owning task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The new chain.
        chain_id: String,
    },
    /// A step was appended.
    ReasoningStep {
        /// Owning task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The chain the step belongs to.
        chain_id: String,
        /// The appended step.
        step: Box<ReasoningStep>,
    },
    /// The chain finished successfully.
    ChainCompleted {
        /// Owning task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The finished chain.
        chain_id: String,
        /// Final metrics.
        metrics: ChainMetrics,
    },
    /// The chain failed.
    ChainFailed {
        /// Owning task.
        task_id: String,
        /// Event time.
        timestamp: DateTime<Utc>,
        /// The failed chain.
        chain_id: String,
        /// Stable error code.
        error_code: String,
        /// Human-readable failure description.
        error_message: String,
    },
}

impl ChainEvent {
    /// A chain-started event stamped now.
    #[must_use]
    pub fn started(task_id: &str, chain_id: &str) -> Self {
        Self::ChainStarted {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            chain_id: chain_id.to_string(),
        }
    }

    /// A reasoning-step event stamped now.
    #[must_use]
    pub fn step(task_id: &str, chain_id: &str, step: ReasoningStep) -> Self {
        Self::ReasoningStep {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            chain_id: chain_id.to_string(),
            step: Box::new(step),
        }
    }

    /// A chain-completed event stamped now.
    #[must_use]
    pub fn completed(task_id: &str, chain_id: &str, metrics: ChainMetrics) -> Self {
        Self::ChainCompleted {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            chain_id: chain_id.to_string(),
            metrics,
        }
    }

    /// A chain-failed event stamped now.
    #[must_use]
    pub fn failed(
        task_id: &str,
        chain_id: &str,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::ChainFailed {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
            chain_id: chain_id.to_string(),
            error_code: error_code.into(),
            error_message: error_message.into(),
        }
    }
}

/// Where chain events are sent. Dropped receivers are fine; publishing is
/// fire-and-forget.
pub type ChainEventSink = tokio::sync::mpsc::UnboundedSender<ChainEvent>;
