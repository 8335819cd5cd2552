//! Hub client - main entry point.
//!
//! Wires the gate, the correlation table, the session and the event bus
//! around an injected transport, and spawns the message router that feeds
//! them.

use crate::domain::{
    Binding, ClientConfig, ClientError, ClientResult, ConnectionGate, ConnectionState,
    CorrelationStats, CorrelationTable, PendingResponse, RequestIdAllocator, RequestKind, Session,
    SuccessPayload,
};
use crate::events::{EventFilter, EventStream, HubEventBus, Subscription};
use crate::ipc::{Envelope, ForwardEnvelope, MessageRouter};
use crate::ports::{Transport, TransportError, TransportReceiver};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct ClientInner {
    transport: Arc<dyn Transport>,
    gate: Arc<ConnectionGate>,
    pending: Arc<CorrelationTable>,
    session: Arc<Session>,
    events: Arc<HubEventBus>,
    ids: RequestIdAllocator,
    config: ClientConfig,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
        if self.gate.is_shut_down() {
            return;
        }

        // Dropped without close(): release the transport in the background
        // if a runtime is still around to run it.
        self.gate.shutdown();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let transport = Arc::clone(&self.transport);
                runtime.spawn(async move {
                    if let Err(e) = transport.close().await {
                        debug!(error = %e, "Transport close on drop failed");
                    }
                });
            }
            Err(_) => warn!("Hub client dropped outside a runtime, transport left open"),
        }
    }
}

/// Client for the rendezvous hub.
///
/// Cheap to clone; clones share one connection. Every operation waits at
/// the connection gate until the hub's `binding` handshake has arrived.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

impl HubClient {
    /// Attach a client to an already-open transport and start dispatching
    /// inbound events.
    ///
    /// Must be called from within a Tokio runtime. `config` is expected to
    /// have passed [`ClientConfig::validate`].
    pub fn connect(
        transport: Arc<dyn Transport>,
        receiver: impl TransportReceiver + 'static,
        config: ClientConfig,
    ) -> Self {
        let gate = Arc::new(ConnectionGate::new());
        let pending = Arc::new(CorrelationTable::new());
        let session = Arc::new(Session::new());
        let events = Arc::new(HubEventBus::with_capacity(config.event_capacity.max(1)));

        let router = MessageRouter::new(
            Arc::clone(&gate),
            Arc::clone(&pending),
            Arc::clone(&session),
            Arc::clone(&events),
        )
        .with_fail_pending_on_disconnect(config.fail_pending_on_disconnect)
        .with_max_frame_size(config.max_frame_size);

        let dispatcher = tokio::spawn(router.run(Box::new(receiver)));

        info!(
            request_timeout = ?config.request_timeout,
            fail_pending_on_disconnect = config.fail_pending_on_disconnect,
            "Hub client started, awaiting binding"
        );

        Self {
            inner: Arc::new(ClientInner {
                transport,
                gate,
                pending,
                session,
                events,
                ids: RequestIdAllocator::new(),
                config,
                dispatcher: Mutex::new(Some(dispatcher)),
            }),
        }
    }

    /// Claim `hostname` at the hub.
    ///
    /// Resolves with the `register-ok` payload (minus `type` and
    /// `request_id`), or fails with [`ClientError::Rejected`] carrying the
    /// hub's reason.
    pub async fn register(&self, hostname: impl Into<String>) -> ClientResult<SuccessPayload> {
        self.request(RequestKind::Register, hostname.into()).await
    }

    /// Resolve `hostname` to a peer address via the hub.
    pub async fn lookup(&self, hostname: impl Into<String>) -> ClientResult<SuccessPayload> {
        self.request(RequestKind::Lookup, hostname.into()).await
    }

    /// Relay `data` to the peer at `to`. Fire-and-forget: completes once the
    /// frame is handed to the transport.
    ///
    /// `from` is the address of the binding current at send time.
    pub async fn forward(&self, to: impl Into<String>, data: Value) -> ClientResult<()> {
        let inner = &self.inner;
        let _admission = inner.gate.admit().await?;

        let from = inner.session.address().ok_or(ClientError::NotBound)?;
        let envelope = Envelope::Forward(ForwardEnvelope {
            to: to.into(),
            from,
            data,
        });
        let frame = envelope.encode()?;

        inner.transport.send(frame).await?;
        debug!("Forward sent");
        Ok(())
    }

    /// Address assigned by the most recent binding.
    pub async fn address(&self) -> ClientResult<String> {
        Ok(self.binding().await?.address)
    }

    /// Transport configuration blob from the most recent binding.
    pub async fn configuration(&self) -> ClientResult<Value> {
        Ok(self.binding().await?.configuration)
    }

    /// The most recent binding, once the gate admits the caller.
    pub async fn binding(&self) -> ClientResult<Binding> {
        let _admission = self.inner.gate.admit().await?;
        self.inner.session.binding().ok_or(ClientError::NotBound)
    }

    /// Subscribe to push events (forwards, connection changes, diagnostics).
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.inner.events.subscribe(filter)
    }

    /// Subscribe to push events as a `Stream`.
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.inner.events.event_stream(filter)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    pub fn stats(&self) -> CorrelationStats {
        self.inner.pending.stats()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.gate.is_shut_down()
    }

    /// Dispose of the client.
    ///
    /// Pending requests and callers queued at the gate fail with
    /// [`ClientError::Disposed`], the dispatch loop stops and the transport
    /// is closed; the call returns once the transport has finished closing.
    /// Idempotent. Dropping the last clone without calling this closes the
    /// transport in the background instead.
    pub async fn close(&self) -> ClientResult<()> {
        let inner = &self.inner;
        if inner.gate.is_shut_down() {
            return Ok(());
        }

        inner.gate.shutdown();
        let failed = inner.pending.fail_all(|| ClientError::Disposed);
        if let Some(handle) = inner.dispatcher.lock().take() {
            handle.abort();
        }
        info!(failed_pending = failed, "Hub client disposed");

        match inner.transport.close().await {
            Ok(()) | Err(TransportError::Closed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn request(&self, kind: RequestKind, hostname: String) -> ClientResult<SuccessPayload> {
        let inner = &self.inner;
        // Admission covers id allocation and the send, not the wait for the
        // response.
        let response = inner.gate.run(|| inner.issue(kind, hostname)).await??;
        inner.complete(response).await
    }
}

impl ClientInner {
    /// Allocate an id, register its slot and send the request envelope.
    ///
    /// The slot exists before the frame leaves, so a response can never
    /// arrive for an unregistered id.
    async fn issue(&self, kind: RequestKind, hostname: String) -> ClientResult<PendingResponse> {
        let request_id = self.ids.next_id();
        let envelope = match kind {
            RequestKind::Register => Envelope::register(request_id, hostname),
            RequestKind::Lookup => Envelope::lookup(request_id, hostname),
        };
        let frame = envelope.encode()?;
        let response = self.pending.wait(request_id, kind)?;

        if let Err(e) = self.transport.send(frame).await {
            warn!(request_id = %request_id, kind = %kind, error = %e, "Failed to send request");
            self.pending.cancel(request_id);
            return Err(e.into());
        }

        debug!(request_id = %request_id, kind = %kind, "Request sent");
        Ok(response)
    }

    async fn complete(&self, response: PendingResponse) -> ClientResult<SuccessPayload> {
        let Some(limit) = self.config.request_timeout else {
            return response.await;
        };

        let request_id = response.request_id();
        let kind = response.kind();
        match tokio::time::timeout(limit, response).await {
            Ok(result) => result,
            Err(_) => {
                self.pending.cancel(request_id);
                warn!(request_id = %request_id, kind = %kind, timeout = ?limit, "Request timed out");
                Err(ClientError::Timeout {
                    kind,
                    request_id,
                    timeout: limit,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::memory_transport;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_register_resolves_after_binding() {
        let (transport, receiver, hub) = memory_transport();
        let client = HubClient::connect(transport, receiver, ClientConfig::default());

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.register("alice").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(hub.sent().is_empty());
        assert_eq!(client.state(), ConnectionState::AwaitingHandshake);

        hub.bind("peer-1", json!({}));
        let request = hub.next_sent().await.unwrap();
        assert_eq!(
            request,
            json!({"type": "register", "request_id": 0, "hostname": "alice"})
        );

        hub.push(json!({"type": "register-ok", "request_id": 0, "ttl": 60}));
        let payload = task.await.unwrap().unwrap();
        assert_eq!(payload.get("ttl"), Some(&json!(60)));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.stats().resolved, 1);
    }

    #[tokio::test]
    async fn test_send_failure_cancels_slot() {
        let (transport, receiver, hub) = memory_transport();
        let client = HubClient::connect(transport, receiver, ClientConfig::default());
        hub.bind("peer-1", json!({}));
        hub.fail_sends(true);

        let err = client.lookup("bob").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.stats().cancelled, 1);
    }

    #[tokio::test]
    async fn test_timeout_cancels_slot() {
        let (transport, receiver, hub) = memory_transport();
        let config = ClientConfig {
            request_timeout: Some(Duration::from_millis(30)),
            ..ClientConfig::default()
        };
        let client = HubClient::connect(transport, receiver, config);
        hub.bind("peer-1", json!({}));

        let err = client.lookup("bob").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Timeout { kind: RequestKind::Lookup, .. }
        ));
        assert_eq!(client.pending_count(), 0);

        // A late answer is dropped as unmatched.
        hub.push(json!({"type": "lookup-ok", "request_id": 0}));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.stats().unmatched, 1);
    }

    #[tokio::test]
    async fn test_drop_closes_transport() {
        let (transport, receiver, hub) = memory_transport();
        let client = HubClient::connect(transport, receiver, ClientConfig::default());
        hub.bind("peer-1", json!({}));
        assert_eq!(client.address().await.unwrap(), "peer-1");

        drop(client);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (transport, receiver, hub) = memory_transport();
        let client = HubClient::connect(transport, receiver, ClientConfig::default());

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(hub.is_closed());
        assert!(matches!(client.address().await, Err(ClientError::Disposed)));
    }
}
