//! # Hub Events
//!
//! Everything a subscriber can observe on the push-event bus.

use crate::ipc::ForwardEnvelope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All events published by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HubEvent {
    /// A peer relayed a payload to us through the hub. Carries the full
    /// envelope, `data` included.
    Forwarded(ForwardEnvelope),

    /// A `binding` handshake was processed.
    Bound {
        address: String,
        /// True when this replaced an earlier binding after a disconnect.
        reconnected: bool,
    },

    /// The transport reported connection loss.
    Disconnected,

    /// Something went wrong that no single caller owns.
    Diagnostic(Diagnostic),
}

impl HubEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Forwarded(_) => EventTopic::Forward,
            Self::Bound { .. } | Self::Disconnected => EventTopic::Connection,
            Self::Diagnostic(_) => EventTopic::Diagnostic,
        }
    }
}

/// Non-fatal problems surfaced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// An inbound frame could not be classified. Dispatch continued.
    MalformedMessage { error: String, frame_len: usize },
    /// The transport reported an I/O fault.
    TransportFault { message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage { error, frame_len } => {
                write!(f, "malformed message ({frame_len} bytes): {error}")
            }
            Self::TransportFault { message } => write!(f, "transport fault: {message}"),
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Relayed peer payloads.
    Forward,
    /// Bound / Disconnected.
    Connection,
    /// Malformed frames and transport faults.
    Diagnostic,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &HubEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
