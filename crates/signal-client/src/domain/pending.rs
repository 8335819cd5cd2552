//! Correlation Table - maps request identifiers to single-completion slots.
//!
//! Flow:
//! 1. The issuer allocates a `RequestId` and calls `wait()` to get a `PendingResponse`
//! 2. The issuer sends the request envelope carrying that id
//! 3. The router receives `-ok` / `-fail` and calls `resolve()` / `reject()`
//! 4. The issuer awaits the `PendingResponse`
//!
//! A slot is removed the moment it is completed, so a second completion for
//! the same id finds nothing and is a no-op.

use crate::domain::correlation::{RequestId, RequestKind};
use crate::domain::error::{ClientError, ClientResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Success payload of a `register-ok` / `lookup-ok` response: every field
/// except `type` and `request_id`.
pub type SuccessPayload = serde_json::Map<String, serde_json::Value>;

type Completion = ClientResult<SuccessPayload>;

struct PendingRequest {
    sender: oneshot::Sender<Completion>,
    kind: RequestKind,
    created_at: Instant,
}

/// What happened to a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The waiting caller received the result.
    Delivered,
    /// The slot existed but its caller had stopped waiting.
    Abandoned,
    /// No slot for this id (never registered, or already completed).
    Unknown,
}

#[derive(Debug, Default)]
struct Counters {
    registered: AtomicU64,
    resolved: AtomicU64,
    rejected: AtomicU64,
    abandoned: AtomicU64,
    cancelled: AtomicU64,
    unmatched: AtomicU64,
}

/// Point-in-time copy of the table counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub registered: u64,
    pub resolved: u64,
    pub rejected: u64,
    /// Completed after the caller dropped its `PendingResponse`.
    pub abandoned: u64,
    /// Removed without completion (send failure, timeout, disposal).
    pub cancelled: u64,
    /// Responses that matched no pending slot.
    pub unmatched: u64,
    pub pending: u64,
}

/// Future returned by [`CorrelationTable::wait`].
///
/// Resolves with the success payload, or with the error the slot was
/// completed with. If the table is dropped first it yields
/// [`ClientError::Disposed`].
#[derive(Debug)]
pub struct PendingResponse {
    request_id: RequestId,
    kind: RequestKind,
    receiver: oneshot::Receiver<Completion>,
}

impl PendingResponse {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }
}

impl Future for PendingResponse {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(completion)) => Poll::Ready(completion),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::Disposed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Pending request table for correlated hub requests.
#[derive(Default)]
pub struct CorrelationTable {
    pending: DashMap<RequestId, PendingRequest>,
    counters: Counters,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a completion slot for `request_id`.
    ///
    /// Fails with [`ClientError::DuplicateRequestId`] if the id is already
    /// pending; the existing slot is left untouched.
    pub fn wait(&self, request_id: RequestId, kind: RequestKind) -> ClientResult<PendingResponse> {
        let (sender, receiver) = oneshot::channel();

        match self.pending.entry(request_id) {
            Entry::Occupied(_) => {
                warn!(request_id = %request_id, kind = %kind, "Duplicate pending request id");
                return Err(ClientError::DuplicateRequestId(request_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender,
                    kind,
                    created_at: Instant::now(),
                });
            }
        }

        self.counters.registered.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %request_id, kind = %kind, "Registered pending request");

        Ok(PendingResponse {
            request_id,
            kind,
            receiver,
        })
    }

    /// Complete a slot successfully.
    pub fn resolve(&self, request_id: RequestId, payload: SuccessPayload) -> CompletionOutcome {
        let outcome = self.complete(request_id, |_| Ok(payload));
        if outcome != CompletionOutcome::Unknown {
            self.counters.resolved.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    /// Complete a slot with the hub's failure reason.
    pub fn reject(&self, request_id: RequestId, reason: impl Into<String>) -> CompletionOutcome {
        let reason = reason.into();
        let outcome = self.complete(request_id, |kind| {
            Err(ClientError::Rejected {
                kind,
                request_id,
                reason,
            })
        });
        if outcome != CompletionOutcome::Unknown {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        outcome
    }

    fn complete(
        &self,
        request_id: RequestId,
        completion: impl FnOnce(RequestKind) -> Completion,
    ) -> CompletionOutcome {
        let Some((_, pending)) = self.pending.remove(&request_id) else {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            warn!(request_id = %request_id, "Response for unknown or completed request id");
            return CompletionOutcome::Unknown;
        };

        let elapsed = pending.created_at.elapsed();
        match pending.sender.send(completion(pending.kind)) {
            Ok(()) => {
                debug!(
                    request_id = %request_id,
                    kind = %pending.kind,
                    response_time_ms = elapsed.as_millis(),
                    "Completed pending request"
                );
                CompletionOutcome::Delivered
            }
            Err(_) => {
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request_id,
                    kind = %pending.kind,
                    "Pending request receiver dropped"
                );
                CompletionOutcome::Abandoned
            }
        }
    }

    /// Remove a slot without completing it. Its `PendingResponse` yields
    /// `Disposed`.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        if self.pending.remove(&request_id).is_some() {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Complete every pending slot with an error built by `error`.
    ///
    /// Returns the number of slots failed.
    pub fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;

        for request_id in ids {
            if let Some((_, pending)) = self.pending.remove(&request_id) {
                let _ = pending.sender.send(Err(error()));
                self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                failed += 1;
            }
        }

        if failed > 0 {
            debug!(failed = failed, "Failed all pending requests");
        }
        failed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn stats(&self) -> CorrelationStats {
        CorrelationStats {
            registered: self.counters.registered.load(Ordering::Relaxed),
            resolved: self.counters.resolved.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            unmatched: self.counters.unmatched.load(Ordering::Relaxed),
            pending: self.pending.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> SuccessPayload {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_wait_and_resolve() {
        let table = CorrelationTable::new();
        let id = RequestId::new(0);

        let response = table.wait(id, RequestKind::Register).unwrap();
        assert!(table.is_pending(id));
        assert_eq!(table.pending_count(), 1);

        let outcome = table.resolve(id, payload(json!({"quota": 5})));
        assert_eq!(outcome, CompletionOutcome::Delivered);
        assert_eq!(table.pending_count(), 0);

        let result = response.await.unwrap();
        assert_eq!(result.get("quota"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_reject_carries_reason() {
        let table = CorrelationTable::new();
        let id = RequestId::new(3);
        let response = table.wait(id, RequestKind::Lookup).unwrap();

        assert_eq!(table.reject(id, "not-found"), CompletionOutcome::Delivered);

        match response.await {
            Err(ClientError::Rejected {
                kind,
                request_id,
                reason,
            }) => {
                assert_eq!(kind, RequestKind::Lookup);
                assert_eq!(request_id, id);
                assert_eq!(reason, "not-found");
            }
            other => panic!("unexpected completion: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let table = CorrelationTable::new();
        let id = RequestId::new(1);
        let _first = table.wait(id, RequestKind::Register).unwrap();

        let second = table.wait(id, RequestKind::Lookup);
        assert!(matches!(second, Err(ClientError::DuplicateRequestId(dup)) if dup == id));
        assert_eq!(table.pending_count(), 1);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let table = CorrelationTable::new();
        assert_eq!(
            table.resolve(RequestId::new(9), SuccessPayload::new()),
            CompletionOutcome::Unknown
        );
        assert_eq!(table.reject(RequestId::new(9), "x"), CompletionOutcome::Unknown);
        assert_eq!(table.stats().unmatched, 2);
        assert_eq!(table.stats().resolved, 0);
    }

    #[tokio::test]
    async fn test_second_completion_is_noop() {
        let table = CorrelationTable::new();
        let id = RequestId::new(0);
        let response = table.wait(id, RequestKind::Register).unwrap();

        assert_eq!(
            table.resolve(id, payload(json!({"first": true}))),
            CompletionOutcome::Delivered
        );
        assert_eq!(table.reject(id, "late"), CompletionOutcome::Unknown);

        let result = response.await.unwrap();
        assert_eq!(result.get("first"), Some(&json!(true)));
    }

    #[test]
    fn test_abandoned_receiver() {
        let table = CorrelationTable::new();
        let id = RequestId::new(0);
        drop(table.wait(id, RequestKind::Register).unwrap());

        assert_eq!(
            table.resolve(id, SuccessPayload::new()),
            CompletionOutcome::Abandoned
        );
        assert_eq!(table.stats().abandoned, 1);
        assert_eq!(table.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_yields_disposed() {
        let table = CorrelationTable::new();
        let id = RequestId::new(4);
        let response = table.wait(id, RequestKind::Lookup).unwrap();

        assert!(table.cancel(id));
        assert!(!table.cancel(id));
        assert!(matches!(response.await, Err(ClientError::Disposed)));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = CorrelationTable::new();
        let a = table.wait(RequestId::new(0), RequestKind::Register).unwrap();
        let b = table.wait(RequestId::new(1), RequestKind::Lookup).unwrap();

        assert_eq!(table.fail_all(|| ClientError::Disconnected), 2);
        assert_eq!(table.pending_count(), 0);
        assert!(matches!(a.await, Err(ClientError::Disconnected)));
        assert!(matches!(b.await, Err(ClientError::Disconnected)));
        assert_eq!(table.fail_all(|| ClientError::Disconnected), 0);
    }

    #[tokio::test]
    async fn test_stats() {
        let table = CorrelationTable::new();
        let _a = table.wait(RequestId::new(0), RequestKind::Register).unwrap();
        let _b = table.wait(RequestId::new(1), RequestKind::Lookup).unwrap();
        let _c = table.wait(RequestId::new(2), RequestKind::Lookup).unwrap();

        table.resolve(RequestId::new(0), SuccessPayload::new());
        table.reject(RequestId::new(1), "no");

        let stats = table.stats();
        assert_eq!(stats.registered, 3);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.pending, 1);
    }
}
