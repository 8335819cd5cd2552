//! Connection Gate - admission control for hub operations.
//!
//! Closed until the hub's `binding` handshake arrives, closed again when the
//! transport drops. Callers arriving while closed are queued.
//!
//! Admission is a hand-off: at most one caller holds an [`Admission`] at a
//! time, and dropping it admits the next queued caller. Whatever an admitted
//! caller does before releasing its admission (allocating an id, sending a
//! frame) therefore happens in arrival order regardless of how the runtime
//! schedules the woken tasks. The gate only orders admission; what the
//! admitted action does and how it completes is not its concern.

use crate::domain::error::{ClientError, ClientResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    shut_down: bool,
    /// An [`Admission`] is outstanding, or granted but not yet observed.
    admitting: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl GateState {
    /// Grant admission to the first queued caller still waiting.
    fn admit_next(&mut self) -> bool {
        if !self.open || self.shut_down || self.admitting {
            return false;
        }
        while let Some(waiter) = self.waiters.pop_front() {
            // A failed send is a caller that gave up waiting.
            if waiter.send(()).is_ok() {
                self.admitting = true;
                return true;
            }
        }
        false
    }
}

/// Binary admission gate with a FIFO wait queue.
#[derive(Debug, Default)]
pub struct ConnectionGate {
    state: Mutex<GateState>,
}

/// Proof of admission. Dropping it admits the next queued caller.
#[must_use = "admission is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct Admission<'a> {
    gate: &'a ConnectionGate,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.gate.hand_off();
    }
}

/// A queued caller's ticket. If the caller stops waiting after admission was
/// granted but before it saw it, the grant is passed on.
struct Ticket<'a> {
    gate: &'a ConnectionGate,
    receiver: Option<oneshot::Receiver<()>>,
}

impl Ticket<'_> {
    async fn wait(&mut self) -> ClientResult<()> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(ClientError::Disposed);
        };
        let granted = receiver.await;
        self.receiver = None;
        // Sender dropped without firing means shutdown.
        granted.map_err(|_| ClientError::Disposed)
    }
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        if let Some(mut receiver) = self.receiver.take() {
            // After close() a grant can no longer race in; one sent before it
            // is still readable.
            receiver.close();
            if receiver.try_recv().is_ok() {
                trace!("Admitted caller gave up, passing admission on");
                self.gate.hand_off();
            }
        }
    }
}

impl ConnectionGate {
    /// New gate, initially closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` once the gate admits the caller.
    ///
    /// Admission is held until `action` completes, so admitted actions run
    /// one at a time in arrival order. Fails only if the gate is shut down
    /// before admission.
    pub async fn run<F, Fut, T>(&self, action: F) -> ClientResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _admission = self.admit().await?;
        Ok(action().await)
    }

    /// Wait for admission.
    ///
    /// Returns immediately when open and nobody is ahead in the queue. A
    /// caller admitted before a `pause()` keeps its admission; the callers
    /// behind it wait for the next `resume()`.
    pub async fn admit(&self) -> ClientResult<Admission<'_>> {
        let receiver = {
            let mut state = self.state.lock();
            if state.shut_down {
                return Err(ClientError::Disposed);
            }
            if state.open && !state.admitting && state.waiters.is_empty() {
                state.admitting = true;
                return Ok(Admission { gate: self });
            }
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            debug!(queued = state.waiters.len(), "Operation queued at gate");
            receiver
        };

        let mut ticket = Ticket {
            gate: self,
            receiver: Some(receiver),
        };
        ticket.wait().await?;
        Ok(Admission { gate: self })
    }

    fn hand_off(&self) {
        let mut state = self.state.lock();
        state.admitting = false;
        state.admit_next();
    }

    /// Close the gate. Later callers wait until the next `resume()`.
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.open {
            debug!("Gate paused");
        }
        state.open = false;
    }

    /// Open the gate and start admitting queued callers in arrival order.
    ///
    /// Returns the number of callers queued at that moment. No-op after
    /// shutdown.
    pub fn resume(&self) -> usize {
        let mut state = self.state.lock();
        if state.shut_down {
            return 0;
        }
        state.open = true;
        let queued = state.waiters.len();
        state.admit_next();

        debug!(queued = queued, "Gate resumed");
        queued
    }

    /// Close the gate for good; queued and future callers fail with
    /// `Disposed`.
    pub fn shutdown(&self) {
        let waiters = {
            let mut state = self.state.lock();
            state.shut_down = true;
            state.open = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(dropped = waiters.len(), "Gate shut down");
        drop(waiters);
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Number of callers currently queued, including any that stopped
    /// waiting and have not been skipped yet.
    pub fn queued(&self) -> usize {
        self.state.lock().waiters.len()
    }
}
