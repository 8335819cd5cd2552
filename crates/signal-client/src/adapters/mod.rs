//! Transport adapters.

pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;
