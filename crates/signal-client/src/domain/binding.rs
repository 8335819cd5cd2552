//! Binding and connection state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The identity the hub assigned to this client for the current connection
/// epoch. Replaced wholesale by each new `binding` handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Opaque address other peers use to reach this client.
    pub address: String,
    /// Transport configuration blob (relay/negotiation parameters), passed
    /// through untouched to higher layers.
    pub configuration: serde_json::Value,
}

impl Binding {
    pub fn new(address: impl Into<String>, configuration: serde_json::Value) -> Self {
        Self {
            address: address.into(),
            configuration,
        }
    }
}

/// Client lifecycle.
///
/// ```text
/// AwaitingHandshake --binding--> Ready --closed--> Paused --binding--> Ready
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    AwaitingHandshake,
    Ready,
    Paused,
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingHandshake => write!(f, "awaiting-handshake"),
            Self::Ready => write!(f, "ready"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    binding: Option<Binding>,
    state: ConnectionState,
}

/// Current binding and lifecycle state of one client.
#[derive(Debug, Default)]
pub struct Session {
    inner: RwLock<SessionInner>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh binding and mark the session ready.
    ///
    /// Returns the state the session was in before.
    pub fn bind(&self, binding: Binding) -> ConnectionState {
        let mut inner = self.inner.write();
        inner.binding = Some(binding);
        std::mem::replace(&mut inner.state, ConnectionState::Ready)
    }

    /// Mark the connection lost. The last binding is kept until replaced.
    ///
    /// Returns the state the session was in before.
    pub fn disconnect(&self) -> ConnectionState {
        std::mem::replace(&mut self.inner.write().state, ConnectionState::Paused)
    }

    pub fn binding(&self) -> Option<Binding> {
        self.inner.read().binding.clone()
    }

    pub fn address(&self) -> Option<String> {
        self.inner.read().binding.as_ref().map(|b| b.address.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_lifecycle() {
        let session = Session::new();
        assert_eq!(session.state(), ConnectionState::AwaitingHandshake);
        assert!(session.binding().is_none());

        let previous = session.bind(Binding::new("peer-1", json!({})));
        assert_eq!(previous, ConnectionState::AwaitingHandshake);
        assert!(session.state().is_ready());
        assert_eq!(session.address().as_deref(), Some("peer-1"));

        assert_eq!(session.disconnect(), ConnectionState::Ready);
        assert_eq!(session.state(), ConnectionState::Paused);
        assert_eq!(session.address().as_deref(), Some("peer-1"));

        let previous = session.bind(Binding::new("peer-2", json!({"relay": true})));
        assert_eq!(previous, ConnectionState::Paused);
        assert_eq!(
            session.binding(),
            Some(Binding::new("peer-2", json!({"relay": true})))
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::AwaitingHandshake.to_string(), "awaiting-handshake");
        assert_eq!(ConnectionState::Paused.to_string(), "paused");
    }
}
