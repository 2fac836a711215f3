//! The shared bus between producers, the I/O thread, and the dispatcher:
//! two bounded queues, two wake flags, and the run flag.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::query::{QueryRequest, QueryResponse};

// ============================================================================
// Wake Flag
// ============================================================================

/// An edge-triggered wake-up flag.
///
/// Producers `raise` after every queue push; the sole consumer `wait`s,
/// drains, then `clear`s. Raising an already-raised flag is a no-op; a raise
/// wakes exactly one sleeper. The raised check on the hot path is a single
/// atomic read, no lock.
///
/// Consumer discipline after `clear`: re-check queue emptiness before
/// sleeping again, since a push can land between the drain and the clear.
pub(crate) struct WakeFlag {
    raised: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl WakeFlag {
    pub(crate) fn new() -> Self {
        Self {
            raised: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Raise the flag, waking one sleeper. No-op when already raised.
    pub(crate) fn raise(&self) {
        if !self.raised.swap(true, Ordering::AcqRel) {
            let _guard = self.lock.lock();
            self.cond.notify_one();
        }
    }

    /// Block until the flag is raised. Returns immediately when it already
    /// is.
    pub(crate) fn wait(&self) {
        if self.raised.load(Ordering::Acquire) {
            return;
        }

        let mut guard = self.lock.lock();
        while !self.raised.load(Ordering::Acquire) {
            self.cond.wait(&mut guard);
        }
    }

    /// Lower the flag.
    pub(crate) fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }
}

// ============================================================================
// Processing State
// ============================================================================

/// Shared engine state: the request and response queues (bounded, MPMC,
/// blocking push on full, which is the engine's only back-pressure
/// mechanism), the wake flags, and the lifecycle flags.
pub(crate) struct ProcessingState {
    running: AtomicBool,
    /// Set by the I/O thread when it exits; after this no response will
    /// ever be pushed again, so the dispatcher may finish.
    pool_exited: AtomicBool,

    requests_tx: Sender<QueryRequest>,
    requests_rx: Receiver<QueryRequest>,
    pub(crate) request_flag: WakeFlag,

    responses_tx: Sender<QueryResponse>,
    responses_rx: Receiver<QueryResponse>,
    pub(crate) response_flag: WakeFlag,
}

impl ProcessingState {
    /// Build the bus with both queues bounded at `queue_capacity`.
    pub(crate) fn new(queue_capacity: usize) -> Self {
        let (requests_tx, requests_rx) = bounded(queue_capacity.max(1));
        let (responses_tx, responses_rx) = bounded(queue_capacity.max(1));

        Self {
            running: AtomicBool::new(true),
            pool_exited: AtomicBool::new(false),
            requests_tx,
            requests_rx,
            request_flag: WakeFlag::new(),
            responses_tx,
            responses_rx,
            response_flag: WakeFlag::new(),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queue a request and wake the I/O thread. Blocks while the request
    /// queue is full.
    pub(crate) fn push_request(&self, request: QueryRequest) {
        let _ = self.requests_tx.send(request);
        self.request_flag.raise();
    }

    /// Non-blocking pop for the I/O thread's drain loop.
    pub(crate) fn try_pop_request(&self) -> Option<QueryRequest> {
        self.requests_rx.try_recv().ok()
    }

    pub(crate) fn requests_empty(&self) -> bool {
        self.requests_rx.is_empty()
    }

    /// The sink the I/O thread pushes responses into. Blocks while the
    /// response queue is full.
    pub(crate) fn response_sink(&self) -> &Sender<QueryResponse> {
        &self.responses_tx
    }

    /// Non-blocking pop for the dispatcher's drain loop.
    pub(crate) fn try_pop_response(&self) -> Option<QueryResponse> {
        self.responses_rx.try_recv().ok()
    }

    pub(crate) fn responses_empty(&self) -> bool {
        self.responses_rx.is_empty()
    }

    pub(crate) fn mark_pool_exited(&self) {
        self.pool_exited.store(true, Ordering::Release);
    }

    pub(crate) fn pool_exited(&self) -> bool {
        self.pool_exited.load(Ordering::Acquire)
    }

    /// Begin shutdown: stop accepting work, wake both consumers, and drop
    /// every request still queued. Dropped requests' callbacks are never
    /// invoked; queries already in flight on a connection complete normally.
    pub(crate) fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.request_flag.raise();
        self.response_flag.raise();

        let mut dropped = 0usize;
        while self.requests_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "discarded queued requests at shutdown");
        }
    }
}
