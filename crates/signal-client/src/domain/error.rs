//! Client error types.
//!
//! Every public operation returns [`ClientResult`]. Application failures
//! reported by the hub are kept apart from local misuse and transport faults
//! so callers can tell "the hub said no" from "the request never went out".

use crate::domain::correlation::{RequestId, RequestKind};
use crate::ports::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Result alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by [`crate::HubClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The hub answered with `register-fail` / `lookup-fail`.
    /// Displays as the server-supplied reason.
    #[error("{reason}")]
    Rejected {
        kind: RequestKind,
        request_id: RequestId,
        reason: String,
    },

    /// `forward` was attempted before any binding was received.
    #[error("no binding received from hub yet")]
    NotBound,

    /// A slot for this identifier is already registered.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    /// The transport refused the outbound frame.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The outbound envelope could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] crate::ipc::EnvelopeError),

    /// No response within the configured request timeout.
    #[error("{kind} request {request_id} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        kind: RequestKind,
        request_id: RequestId,
        timeout: Duration,
    },

    /// The connection dropped while the request was pending and the client
    /// is configured to fail pending requests on disconnect.
    #[error("connection to hub lost")]
    Disconnected,

    /// The client was disposed.
    #[error("client disposed")]
    Disposed,
}

impl ClientError {
    /// Server-supplied reason, if this is an application-level failure.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether the hub itself rejected the request.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_displays_reason() {
        let err = ClientError::Rejected {
            kind: RequestKind::Lookup,
            request_id: RequestId::new(3),
            reason: "not-found".into(),
        };
        assert_eq!(err.to_string(), "not-found");
        assert_eq!(err.reason(), Some("not-found"));
        assert!(err.is_rejection());
    }

    #[test]
    fn test_timeout_display() {
        let err = ClientError::Timeout {
            kind: RequestKind::Register,
            request_id: RequestId::new(7),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "register request 7 timed out after 250ms");
        assert!(err.reason().is_none());
    }

    #[test]
    fn test_transport_conversion() {
        let err: ClientError = TransportError::Closed.into();
        assert!(matches!(err, ClientError::Transport(TransportError::Closed)));
    }
}
