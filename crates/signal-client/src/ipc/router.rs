//! Message Router - inbound dispatch.
//!
//! Consumes transport events one at a time, in arrival order. Every effect
//! of an event (gate transition, slot completion, published push event) is
//! applied before the next event is looked at, so a response can never be
//! observed ahead of the handshake that admitted its request.

use crate::domain::{
    Binding, ClientError, CompletionOutcome, ConnectionGate, ConnectionState, CorrelationTable,
    RequestId, Session,
};
use crate::events::{Diagnostic, EventPublisher, HubEvent, HubEventBus};
use crate::ipc::envelope::Envelope;
use crate::ports::{TransportEvent, TransportReceiver};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the router did with one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Binding installed and gate opened.
    Bound { reconnected: bool },
    /// Forward envelope published to subscribers.
    Forwarded,
    /// `-ok` response handed to the correlation table.
    Resolved {
        request_id: RequestId,
        outcome: CompletionOutcome,
    },
    /// `-fail` response handed to the correlation table.
    Rejected {
        request_id: RequestId,
        outcome: CompletionOutcome,
    },
    /// Unknown discriminant, or a message only the hub should receive.
    Ignored,
    /// Frame could not be classified; diagnostic published.
    Malformed,
    /// Transport fault; diagnostic published.
    TransportFault,
    /// Connection lost; gate paused.
    Disconnected { failed_pending: usize },
}

/// Routes inbound hub traffic to the gate, the correlation table or the
/// push-event bus.
pub struct MessageRouter {
    gate: Arc<ConnectionGate>,
    pending: Arc<CorrelationTable>,
    session: Arc<Session>,
    events: Arc<HubEventBus>,
    fail_pending_on_disconnect: bool,
    max_frame_size: usize,
}

impl MessageRouter {
    pub fn new(
        gate: Arc<ConnectionGate>,
        pending: Arc<CorrelationTable>,
        session: Arc<Session>,
        events: Arc<HubEventBus>,
    ) -> Self {
        Self {
            gate,
            pending,
            session,
            events,
            fail_pending_on_disconnect: false,
            max_frame_size: crate::domain::config::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Reject all pending requests when the connection drops.
    pub fn with_fail_pending_on_disconnect(mut self, enabled: bool) -> Self {
        self.fail_pending_on_disconnect = enabled;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Dispatch loop. Runs until the receiver ends.
    pub async fn run(self, mut receiver: Box<dyn TransportReceiver>) {
        while let Some(event) = receiver.receive().await {
            self.handle_event(event);
        }

        // A stream that ends without a close notification still means the
        // connection is gone.
        if self.session.state() != ConnectionState::Paused {
            self.handle_closed();
        }
        info!("Transport event stream ended, dispatch loop stopped");
    }

    /// Apply one transport event.
    pub fn handle_event(&self, event: TransportEvent) -> Dispatch {
        match event {
            TransportEvent::Message(frame) => self.handle_frame(&frame),
            TransportEvent::Error(message) => self.handle_fault(message),
            TransportEvent::Closed => self.handle_closed(),
        }
    }

    /// Decode and route one inbound frame.
    pub fn handle_frame(&self, frame: &str) -> Dispatch {
        let envelope = match Envelope::decode_bounded(frame, self.max_frame_size) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(frame_len = frame.len(), "Ignoring message with unknown type");
                return Dispatch::Ignored;
            }
            Err(e) => {
                warn!(error = %e, frame_len = frame.len(), "Dropping malformed message");
                self.events.publish(HubEvent::Diagnostic(Diagnostic::MalformedMessage {
                    error: e.to_string(),
                    frame_len: frame.len(),
                }));
                return Dispatch::Malformed;
            }
        };

        match envelope {
            Envelope::Binding(binding) => self.handle_binding(binding),
            Envelope::Forward(forward) => {
                debug!(from = %forward.from, to = %forward.to, "Forward received");
                self.events.publish(HubEvent::Forwarded(forward));
                Dispatch::Forwarded
            }
            Envelope::Success {
                kind,
                request_id,
                payload,
            } => {
                debug!(request_id = %request_id, kind = %kind, "Request accepted by hub");
                let outcome = self.pending.resolve(request_id, payload);
                Dispatch::Resolved {
                    request_id,
                    outcome,
                }
            }
            Envelope::Failure {
                kind,
                request_id,
                reason,
            } => {
                debug!(request_id = %request_id, kind = %kind, reason = %reason, "Request rejected by hub");
                let outcome = self.pending.reject(request_id, reason);
                Dispatch::Rejected {
                    request_id,
                    outcome,
                }
            }
            Envelope::Request {
                kind, request_id, ..
            } => {
                debug!(request_id = %request_id, kind = %kind, "Ignoring hub-bound request echoed to client");
                Dispatch::Ignored
            }
        }
    }

    fn handle_binding(&self, binding: Binding) -> Dispatch {
        let address = binding.address.clone();
        let previous = self.session.bind(binding);
        let reconnected = previous == ConnectionState::Paused;
        let queued = self.gate.resume();

        info!(
            address = %address,
            reconnected = reconnected,
            queued = queued,
            "Bound to hub"
        );
        self.events.publish(HubEvent::Bound {
            address,
            reconnected,
        });
        Dispatch::Bound { reconnected }
    }

    fn handle_fault(&self, message: String) -> Dispatch {
        warn!(error = %message, "Transport fault");
        self.events
            .publish(HubEvent::Diagnostic(Diagnostic::TransportFault { message }));
        Dispatch::TransportFault
    }

    fn handle_closed(&self) -> Dispatch {
        self.gate.pause();
        let previous = self.session.disconnect();

        let failed_pending = if self.fail_pending_on_disconnect {
            self.pending.fail_all(|| ClientError::Disconnected)
        } else {
            0
        };

        info!(
            previous = %previous,
            pending = self.pending.pending_count(),
            failed_pending = failed_pending,
            "Connection to hub lost, gate paused"
        );
        self.events.publish(HubEvent::Disconnected);
        Dispatch::Disconnected { failed_pending }
    }
}
