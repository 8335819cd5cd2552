//! In-memory transport.
//!
//! Both halves of a connection live in-process: the client side is a
//! [`MemoryTransport`] / [`MemoryReceiver`] pair, the hub side is a
//! [`MemoryHub`] that injects inbound events and inspects outbound frames.
//! Used by the test suites and for embedding the client next to an
//! in-process hub.

use crate::ports::{Transport, TransportError, TransportEvent, TransportReceiver};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Default)]
struct Outbound {
    log: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

/// Client-side outbound half.
pub struct MemoryTransport {
    outbound: Arc<Outbound>,
    frames: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.outbound.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        if self.outbound.fail_sends.load(Ordering::Acquire) {
            return Err(TransportError::SendFailed("send rejected by memory hub".into()));
        }

        self.outbound.log.lock().push(frame.clone());
        // The hub may have stopped draining; the log still has the frame.
        let _ = self.frames.send(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.outbound.closed.swap(true, Ordering::AcqRel) {
            return Err(TransportError::Closed);
        }
        debug!("Memory transport closed");
        Ok(())
    }
}

/// Client-side inbound half.
pub struct MemoryReceiver {
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MemoryReceiver {
    async fn receive(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }
}

/// Hub side of an in-memory connection.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct MemoryHub {
    outbound: Arc<Outbound>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
    frames: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

/// Create a connected transport, receiver and hub handle.
pub fn memory_transport() -> (Arc<MemoryTransport>, MemoryReceiver, MemoryHub) {
    let outbound = Arc::new(Outbound::default());
    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let transport = Arc::new(MemoryTransport {
        outbound: Arc::clone(&outbound),
        frames: frames_tx,
    });
    let receiver = MemoryReceiver { events: events_rx };
    let hub = MemoryHub {
        outbound,
        inbound: Arc::new(Mutex::new(Some(events_tx))),
        frames: Arc::new(tokio::sync::Mutex::new(frames_rx)),
    };

    (transport, receiver, hub)
}

impl MemoryHub {
    /// Deliver a raw event to the client.
    ///
    /// Returns false once the connection has ended or the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.inbound.lock().as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => {
                warn!("Event emitted after memory hub ended");
                false
            }
        }
    }

    /// Deliver one JSON message.
    pub fn push(&self, message: Value) -> bool {
        self.emit(TransportEvent::Message(message.to_string()))
    }

    /// Deliver one raw text frame, as-is.
    pub fn push_raw(&self, frame: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(frame.into()))
    }

    /// Send the `binding` handshake.
    pub fn bind(&self, address: &str, configuration: Value) -> bool {
        self.push(json!({
            "type": "binding",
            "address": address,
            "configuration": configuration,
        }))
    }

    /// Report a transport fault.
    pub fn fault(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    /// Report connection loss. The connection can be re-bound afterwards.
    pub fn disconnect(&self) -> bool {
        self.emit(TransportEvent::Closed)
    }

    /// End the inbound stream for good.
    pub fn end(&self) {
        self.inbound.lock().take();
    }

    /// Make every following client send fail (or succeed again).
    pub fn fail_sends(&self, enabled: bool) {
        self.outbound.fail_sends.store(enabled, Ordering::Release);
    }

    /// Every frame the client has sent so far, parsed as JSON.
    pub fn sent(&self) -> Vec<Value> {
        self.outbound
            .log
            .lock()
            .iter()
            .map(|frame| serde_json::from_str(frame).unwrap_or(Value::String(frame.clone())))
            .collect()
    }

    /// Wait for the next frame the client sends, parsed as JSON.
    ///
    /// Frames are handed out once each, in send order.
    pub async fn next_sent(&self) -> Option<Value> {
        let frame = self.frames.lock().await.recv().await?;
        Some(serde_json::from_str(&frame).unwrap_or(Value::String(frame)))
    }

    /// Whether the client closed its transport.
    pub fn is_closed(&self) -> bool {
        self.outbound.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_reach_hub_in_order() {
        let (transport, _receiver, hub) = memory_transport();
        transport.send(r#"{"n":1}"#.into()).await.unwrap();
        transport.send(r#"{"n":2}"#.into()).await.unwrap();

        assert_eq!(hub.next_sent().await, Some(json!({"n": 1})));
        assert_eq!(hub.next_sent().await, Some(json!({"n": 2})));
        assert_eq!(hub.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_events_reach_receiver() {
        let (_transport, mut receiver, hub) = memory_transport();
        assert!(hub.fault("reset"));
        assert!(hub.disconnect());
        hub.end();

        assert_eq!(
            receiver.receive().await,
            Some(TransportEvent::Error("reset".into()))
        );
        assert_eq!(receiver.receive().await, Some(TransportEvent::Closed));
        assert_eq!(receiver.receive().await, None);
        assert!(!hub.push(json!({})));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (transport, _receiver, hub) = memory_transport();
        transport.close().await.unwrap();
        assert!(hub.is_closed());
        assert_eq!(transport.close().await, Err(TransportError::Closed));
        assert_eq!(
            transport.send("{}".into()).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn test_injected_send_failure() {
        let (transport, _receiver, hub) = memory_transport();
        hub.fail_sends(true);
        assert!(matches!(
            transport.send("{}".into()).await,
            Err(TransportError::SendFailed(_))
        ));
        assert!(hub.sent().is_empty());

        hub.fail_sends(false);
        transport.send("{}".into()).await.unwrap();
        assert_eq!(hub.sent(), vec![json!({})]);
    }
}
