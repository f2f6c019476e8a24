//! Pipe lifecycle: one-shot closing sequence and the owner-facing handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

/// Caller-supplied completion callback, invoked exactly once when the
/// pipe's closing sequence runs.
pub type DoneFn = Box<dyn FnOnce() + Send>;

/// State shared between a pipe's loop tasks and its handles.
///
/// Every close trigger (read failure, owner close, hub shutdown) funnels
/// through the one latch in [`PipeShared::close`].
pub(crate) struct PipeShared {
    closed: AtomicBool,
    done_tx: watch::Sender<bool>,
    on_done: Mutex<Option<DoneFn>>,
    /// Keeps the interval channel open for write-only pipes, where no
    /// inbound loop holds a sender.
    _interval_tx: mpsc::Sender<Duration>,
}

impl PipeShared {
    pub(crate) fn new(
        done_tx: watch::Sender<bool>,
        on_done: Option<DoneFn>,
        interval_tx: mpsc::Sender<Duration>,
    ) -> Self {
        Self {
            closed: AtomicBool::new(false),
            done_tx,
            on_done: Mutex::new(on_done),
            _interval_tx: interval_tx,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run the closing sequence at most once: notify the owner first (so it
    /// can drop the pipe from shared state), then latch the done signal.
    /// The queues close when the loop tasks observe the latch and drop
    /// their endpoints.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(on_done) = self.on_done.lock().take() {
            on_done();
        }
        let _ = self.done_tx.send(true);
    }
}

/// Owner-facing handle to a subscriber pipe.
#[derive(Clone)]
pub struct PipeHandle {
    id: u64,
    done_rx: watch::Receiver<bool>,
    shared: Arc<PipeShared>,
}

impl PipeHandle {
    pub(crate) fn new(id: u64, done_rx: watch::Receiver<bool>, shared: Arc<PipeShared>) -> Self {
        Self {
            id,
            done_rx,
            shared,
        }
    }

    /// Identity of the pipe within its hub.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the closing sequence has run.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Trigger the closing sequence. Idempotent; safe to race against a
    /// read failure or a hub-wide shutdown.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Resolves once the pipe has finished closing.
    pub async fn closed(&self) {
        let mut done_rx = self.done_rx.clone();
        let _ = done_rx.wait_for(|done| *done).await;
    }
}
