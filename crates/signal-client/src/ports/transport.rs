//! # Driven Port: Transport
//!
//! What the client requires from the duplex connection to the hub.
//!
//! The outbound half is [`Transport`] (`send`, `close`). The inbound half is
//! [`TransportReceiver`], a stream of [`TransportEvent`]s consumed by exactly
//! one dispatch loop:
//!
//! - one `Message` per inbound text frame, in arrival order
//! - one `Closed` per connection loss
//! - `Error` for unrecoverable I/O faults
//!
//! A transport that reconnects underneath may keep delivering events on the
//! same receiver after `Closed`; the client resumes when the hub sends a new
//! `binding`. Returning `None` from `receive` ends the stream for good.

use async_trait::async_trait;
use thiserror::Error;

/// Inbound transport notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One raw text frame.
    Message(String),
    /// Unrecoverable I/O fault. Does not imply `Closed`.
    Error(String),
    /// The connection was lost.
    Closed,
}

/// Errors from transport operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("connect failed: {0}")]
    ConnectFailed(String),
}

/// Outbound half of the connection.
///
/// Implementations must be `Send + Sync`; concurrent callers share one
/// transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Queue or transmit one text frame.
    async fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Terminate the connection. Resolves once the connection is shut down
    /// (or the attempt to shut it down has finished).
    async fn close(&self) -> Result<(), TransportError>;
}

/// Inbound half of the connection.
#[async_trait]
pub trait TransportReceiver: Send {
    /// Next event, or `None` once the transport is gone for good.
    async fn receive(&mut self) -> Option<TransportEvent>;
}
