//! Subscriber pipe
//!
//! Wraps one subscriber's duplex message flow in two independent loop
//! tasks. The inbound loop turns raw reads into owner deliveries or
//! interval updates; the outbound loop consumes broadcast messages and
//! batches them per the subscriber's current flush interval.
//!
//! ```text
//!   transport read ──► [read loop] ──► delivery queue ──► owner
//!                           │
//!                           └── interval updates (rendezvous)
//!                                        │
//!   hub send_all ──► outbound queue ──► [write loop] ──► transport write
//!                                        batching + flush deadline
//! ```
//!
//! A pipe has no dependency on the hub; the hub is just one possible
//! owner. Lifecycle ends in exactly one closing sequence regardless of
//! which trigger fires first: a read failure, an owner close, or a
//! hub-wide shutdown.

mod handle;
mod message;
mod worker;

pub use handle::{DoneFn, PipeHandle};
pub use message::Inbound;

pub(crate) use worker::fold;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::ErrorSink;
use crate::transport::{MessageRead, MessageWrite};

use handle::PipeShared;

/// Merge function folding a diff into an accumulated value. Called with
/// `None` when there is nothing accumulated yet.
pub type MergeFn<M> = Arc<dyn Fn(Option<&M>, &M) -> M + Send + Sync>;

/// Everything a pipe needs besides its transport halves.
pub(crate) struct PipeOptions<M> {
    pub(crate) id: u64,
    pub(crate) snapshot: Option<Arc<M>>,
    pub(crate) interval: Duration,
    pub(crate) outbound_capacity: usize,
    pub(crate) delivery_capacity: usize,
    pub(crate) merge: Option<MergeFn<M>>,
    pub(crate) on_error: ErrorSink,
    pub(crate) on_done: Option<DoneFn>,
}

/// A spawned pipe, as seen by its owner.
pub(crate) struct Pipe<M> {
    pub(crate) outbound_tx: mpsc::Sender<Arc<M>>,
    pub(crate) delivery_rx: mpsc::Receiver<M>,
    pub(crate) handle: PipeHandle,
}

impl<M: Send + Sync + 'static> Pipe<M> {
    /// Wire up the channels and start the loop tasks.
    ///
    /// The seeded snapshot is the outbound task's first write, ahead of
    /// anything the owner enqueues. A pipe without a reader never spawns
    /// an inbound loop and closes only on request.
    pub(crate) fn spawn<R, W>(reader: Option<R>, writer: W, opts: PipeOptions<M>) -> Self
    where
        R: MessageRead<M>,
        W: MessageWrite<M>,
    {
        let PipeOptions {
            id,
            snapshot,
            interval,
            outbound_capacity,
            delivery_capacity,
            merge,
            on_error,
            on_done,
        } = opts;

        let (outbound_tx, outbound_rx) = mpsc::channel(outbound_capacity);
        let (delivery_tx, delivery_rx) = mpsc::channel(delivery_capacity);
        let (interval_tx, interval_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);

        let shared = Arc::new(PipeShared::new(done_tx, on_done, interval_tx.clone()));
        let handle = PipeHandle::new(id, done_rx.clone(), Arc::clone(&shared));

        let has_reader = reader.is_some();
        if let Some(reader) = reader {
            tokio::spawn(worker::read_loop(
                reader,
                delivery_tx,
                interval_tx,
                done_rx.clone(),
                Arc::clone(&shared),
                Arc::clone(&on_error),
            ));
        }
        tokio::spawn(worker::write_loop(
            writer,
            snapshot,
            outbound_rx,
            interval_rx,
            done_rx,
            shared,
            merge,
            on_error,
            interval,
        ));

        tracing::debug!(pipe_id = id, has_reader, "pipe started");

        Pipe {
            outbound_tx,
            delivery_rx,
            handle,
        }
    }
}
