//! # Event Publisher
//!
//! Publishing side of the push-event bus.

use crate::domain::config::DEFAULT_EVENT_CAPACITY;
use crate::events::subscriber::{EventStream, Subscription};
use crate::events::types::{EventFilter, HubEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing events to subscribers.
pub trait EventPublisher: Send + Sync {
    /// Publish an event.
    ///
    /// Returns the number of active subscribers that received it.
    fn publish(&self, event: HubEvent) -> usize;

    /// Total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory push-event bus.
///
/// Uses `tokio::sync::broadcast`: every subscriber sees every event, filtered
/// on its side. A subscriber that falls more than `capacity` events behind
/// skips the oldest ones.
pub struct HubEventBus {
    sender: broadcast::Sender<HubEvent>,
    events_published: AtomicU64,
    capacity: usize,
}

impl HubEventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a bus with the given per-subscriber capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; `ClientConfig::validate` rules that out.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// Only events published after this call are delivered.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Subscribe and wrap the subscription as a `Stream`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.subscribe(filter))
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HubEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for HubEventBus {
    fn publish(&self, event: HubEvent) -> usize {
        let topic = event.topic();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = ?topic, receivers = receivers, "Event published");
                receivers
            }
            Err(_) => {
                // Nobody listening; push events are best-effort.
                trace!(topic = ?topic, "Event dropped (no subscribers)");
                0
            }
        }
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::EventTopic;

    #[test]
    fn test_publish_no_subscribers() {
        let bus = HubEventBus::new();
        assert_eq!(bus.publish(HubEvent::Disconnected), 0);
        assert_eq!(bus.events_published(), 1);
    }

    #[test]
    fn test_publish_with_subscribers() {
        let bus = HubEventBus::new();
        let _all = bus.subscribe(EventFilter::all());
        let _forward = bus.subscribe(EventFilter::topics(vec![EventTopic::Forward]));

        // Filtering happens on the subscriber side.
        assert_eq!(bus.publish(HubEvent::Disconnected), 2);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_subscriber_count_drops() {
        let bus = HubEventBus::with_capacity(8);
        {
            let _a = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 8);
    }
}
