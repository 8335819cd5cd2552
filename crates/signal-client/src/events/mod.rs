//! # Push Events
//!
//! Messages the hub pushes without a matching request, plus connection
//! lifecycle and diagnostic notifications, fan out to subscribers through
//! an in-memory broadcast bus.
//!
//! ```text
//! MessageRouter ── publish() ──► HubEventBus ──► Subscription (filter: Forward)
//!                                           └──► Subscription (filter: all)
//! ```

pub mod publisher;
pub mod subscriber;
pub mod types;

pub use publisher::{EventPublisher, HubEventBus};
pub use subscriber::{EventStream, Subscription, SubscriptionError};
pub use types::{Diagnostic, EventFilter, EventTopic, HubEvent};
