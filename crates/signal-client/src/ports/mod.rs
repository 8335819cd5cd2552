//! # Ports
//!
//! The transport is an injected capability: the client never opens or
//! reconnects a connection itself.

pub mod transport;

pub use transport::{Transport, TransportError, TransportEvent, TransportReceiver};
