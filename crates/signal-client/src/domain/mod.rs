//! Domain types for the signal client.
//!
//! The gate, the correlation table and the binding are owned by the client;
//! nothing in here touches the network.

pub mod binding;
pub mod config;
pub mod correlation;
pub mod error;
pub mod gate;
pub mod pending;

pub use binding::{Binding, ConnectionState, Session};
pub use config::{ClientConfig, ConfigError};
pub use correlation::{RequestId, RequestIdAllocator, RequestKind};
pub use error::{ClientError, ClientResult};
pub use gate::{Admission, ConnectionGate};
pub use pending::{
    CompletionOutcome, CorrelationStats, CorrelationTable, PendingResponse, SuccessPayload,
};
