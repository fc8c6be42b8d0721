//! Per-role event filtering and sensitive-value redaction.
//!
//! Every event (except the terminal done event) carries a
//! [`VisibilityLevel`]. A consumer connects with a [`ConsumerRole`], and
//! [`filter_event_stream`] drops events the role may not see while rewriting
//! credential-shaped values in message text to `[REDACTED]`.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{EventStream, TaskEvent};
use crate::task::MessagePart;

/// How much of an event a consumer is allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityLevel {
    /// Detailed internals: iteration traces, thoughts, observations.
    Full,
    /// High-level progress suitable for end users.
    Summary,
    /// Withheld from regular consumers; visible to auditors only.
    Hidden,
}

/// The role a stream consumer connects with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerRole {
    /// The requesting end user: summary-level progress only.
    EndUser,
    /// A developer debugging the agent: full detail.
    Developer,
    /// Compliance review: everything, including hidden events.
    Auditor,
    /// Platform operations: everything, including hidden events.
    Operator,
}

impl ConsumerRole {
    /// Whether this role may see an event at the given level.
    #[must_use]
    pub fn can_see(self, level: VisibilityLevel) -> bool {
        match self {
            Self::EndUser => level == VisibilityLevel::Summary,
            Self::Developer => matches!(level, VisibilityLevel::Summary | VisibilityLevel::Full),
            Self::Auditor | Self::Operator => true,
        }
    }
}

static KEY_VALUE_SECRET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(api_key|password|token|secret)\s*=\s*[^\s,;]+")
        .expect("secret pattern is valid")
});

static AUTHORIZATION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    // Header values may contain spaces ("Bearer <token>"), so redact to the
    // end of the segment.
    Regex::new(r"(?i)\b(authorization)\s*:\s*[^,;\r\n]+").expect("header pattern is valid")
});

/// Rewrite credential-shaped values in `text` to `[REDACTED]`.
#[must_use]
pub fn redact_sensitive(text: &str) -> String {
    let pass = KEY_VALUE_SECRET.replace_all(text, "$1=[REDACTED]");
    AUTHORIZATION_HEADER
        .replace_all(&pass, "$1: [REDACTED]")
        .into_owned()
}

fn redact_event(event: TaskEvent) -> TaskEvent {
    match event {
        TaskEvent::Message {
            task_id,
            timestamp,
            parts,
            is_partial,
            visibility,
        } => {
            let parts = parts
                .into_iter()
                .map(|part| match part {
                    MessagePart::Text { text } => MessagePart::Text {
                        text: redact_sensitive(&text),
                    },
                    other => other,
                })
                .collect();
            TaskEvent::Message {
                task_id,
                timestamp,
                parts,
                is_partial,
                visibility,
            }
        }
        other => other,
    }
}

/// Filter an event stream for a consumer role.
///
/// Events whose visibility the role may not see are dropped. Done events
/// always pass, unmodified. Message text parts are redacted before
/// forwarding.
#[must_use]
pub fn filter_event_stream(stream: EventStream, role: ConsumerRole) -> EventStream {
    Box::pin(stream.filter_map(move |event| {
        let forwarded = match event.visibility() {
            None => Some(event),
            Some(level) if role.can_see(level) => Some(redact_event(event)),
            Some(_) => None,
        };
        async move { forwarded }
    }))
}
