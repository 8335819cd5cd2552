//! # Signal Client - Rendezvous Hub Client
//!
//! Client side of the rendezvous signalling protocol: peers learn their own
//! address from the hub, register and look up hostnames, and relay opaque
//! payloads to each other over one persistent duplex connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          HubClient                               │
//! │                                                                  │
//! │  register / lookup / forward / address / configuration           │
//! │         │                                                        │
//! │  ┌──────┴─────────┐      ┌────────────────────┐                  │
//! │  │ ConnectionGate │      │  CorrelationTable  │◄──────┐          │
//! │  │ (admission)    │      │  (request_id → tx) │       │          │
//! │  └──────┬─────────┘      └────────────────────┘       │          │
//! │         │ send                                        │ resolve  │
//! │         ▼                                             │ reject   │
//! │  ┌────────────────┐   frames    ┌─────────────────────┴──────┐   │
//! │  │   Transport    │ ──────────► │       MessageRouter        │   │
//! │  │   (port)       │             │ binding / forward / -ok /  │   │
//! │  └────────────────┘             │ -fail / unknown            │   │
//! │                                 └─────────────┬──────────────┘   │
//! │                                               │ publish          │
//! │                                     ┌─────────▼─────────┐        │
//! │                                     │   HubEventBus     │        │
//! │                                     └───────────────────┘        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Domain:** gate, correlation table, binding, configuration, errors
//! - **Ports:** the `Transport` / `TransportReceiver` capability
//! - **IPC:** wire envelopes and the inbound message router
//! - **Events:** push-event bus for forwarded payloads and diagnostics
//! - **Adapters:** in-memory transport, WebSocket transport (feature `websocket`)
//!
//! ## Example
//!
//! ```rust,no_run
//! use signal_client::adapters::memory::memory_transport;
//! use signal_client::{ClientConfig, HubClient};
//!
//! # async fn run() -> Result<(), signal_client::ClientError> {
//! let (transport, receiver, _hub) = memory_transport();
//! let client = HubClient::connect(transport, receiver, ClientConfig::default());
//!
//! // Blocks until the hub sends the `binding` handshake.
//! let address = client.address().await?;
//! let quota = client.register("alice").await?;
//! # let _ = (address, quota);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod events;
pub mod ipc;
pub mod ports;
pub mod service;
pub mod telemetry;

pub use domain::{
    Binding, ClientConfig, ClientError, ClientResult, ConfigError, ConnectionGate,
    ConnectionState, CorrelationStats, CorrelationTable, RequestId, RequestKind, SuccessPayload,
};
pub use events::{Diagnostic, EventFilter, EventTopic, HubEvent, HubEventBus, Subscription};
pub use ipc::{Envelope, EnvelopeError, ForwardEnvelope, MessageRouter};
pub use ports::{Transport, TransportError, TransportEvent, TransportReceiver};
pub use service::HubClient;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
