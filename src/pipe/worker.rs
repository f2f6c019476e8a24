//! The pipe's two loop tasks
//!
//! Inbound loop: turns raw reads into owner deliveries and interval
//! updates. Outbound loop: consumes broadcast messages, batches them while
//! an interval is set, and flushes on a recomputed deadline. The loops
//! share nothing but the done signal and the rendezvous interval channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use crate::error::{ErrorSink, HubError};
use crate::transport::{MessageRead, MessageWrite};

use super::handle::PipeShared;
use super::message::Inbound;
use super::MergeFn;

/// Runs the closing sequence when a loop task exits, panicking included.
/// A panicking user callback (decode, merge, write) must still latch the
/// done signal and fire the completion callback.
struct CloseGuard(Arc<PipeShared>);

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Deadline for the next flush. Oversized intervals would overflow the
/// instant; those park the deadline a year out, where it never fires.
fn flush_deadline(interval: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(interval)
        .unwrap_or_else(|| now + Duration::from_secs(365 * 24 * 60 * 60))
}

/// Inbound loop. Runs only when the pipe has a read primitive.
///
/// A read error terminates the loop; everything else keeps it running.
/// Termination always runs the closing sequence, no matter how the loop
/// fell out.
pub(super) async fn read_loop<M, R>(
    mut reader: R,
    delivery_tx: mpsc::Sender<M>,
    interval_tx: mpsc::Sender<Duration>,
    mut done_rx: watch::Receiver<bool>,
    shared: Arc<PipeShared>,
    on_error: ErrorSink,
) where
    M: Send + Sync + 'static,
    R: MessageRead<M>,
{
    let _close = CloseGuard(shared);
    loop {
        let frame = tokio::select! {
            biased;
            _ = done_rx.changed() => break,
            result = reader.read() => match result {
                Ok(frame) => frame,
                Err(e) => {
                    on_error(HubError::Read(e));
                    break;
                }
            },
        };
        match frame {
            Inbound::Skip => {}
            Inbound::ControlError(e) => on_error(HubError::Control(e)),
            Inbound::SetInterval(interval) => {
                // Rendezvous with the outbound loop; suspends until the
                // update is accepted.
                if interval_tx.send(interval).await.is_err() {
                    break;
                }
            }
            Inbound::Data(msg) => {
                // The one place this loop can stall, bounded by the owner
                // draining the delivery queue.
                if delivery_tx.send(msg).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Outbound loop: a four-way wait over the done signal, interval updates,
/// new broadcast messages, and the flush deadline.
///
/// The snapshot, when present, is always the first write: it goes out
/// before the loop starts consuming the outbound queue.
#[allow(clippy::too_many_arguments)]
pub(super) async fn write_loop<M, W>(
    mut writer: W,
    snapshot: Option<Arc<M>>,
    mut outbound_rx: mpsc::Receiver<Arc<M>>,
    mut interval_rx: mpsc::Receiver<Duration>,
    mut done_rx: watch::Receiver<bool>,
    shared: Arc<PipeShared>,
    merge: Option<MergeFn<M>>,
    on_error: ErrorSink,
    mut interval: Duration,
) where
    M: Send + Sync + 'static,
    W: MessageWrite<M>,
{
    let _close = CloseGuard(Arc::clone(&shared));

    if let Some(snapshot) = snapshot {
        write_one(&mut writer, snapshot, &on_error).await;
    }

    let mut accumulated: Option<Arc<M>> = None;
    let mut next = flush_deadline(interval);

    loop {
        tokio::select! {
            biased;
            _ = done_rx.changed() => break,
            update = interval_rx.recv() => {
                let Some(new_interval) = update else { break };
                interval = new_interval;
                if !interval.is_zero() {
                    next = flush_deadline(interval);
                }
            }
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };
                if interval.is_zero() {
                    if shared.is_closed() {
                        break;
                    }
                    write_one(&mut writer, msg, &on_error).await;
                    accumulated = None;
                } else {
                    accumulated = Some(fold(merge.as_ref(), accumulated.take(), &msg));
                }
            }
            // Armed only while batching; a zero interval disables the
            // deadline entirely.
            _ = time::sleep_until(next), if !interval.is_zero() => {
                if shared.is_closed() {
                    break;
                }
                if let Some(batch) = accumulated.take() {
                    write_one(&mut writer, batch, &on_error).await;
                }
                // Recompute from now so the schedule does not drift.
                next = flush_deadline(interval);
            }
        }
    }
}

async fn write_one<M, W>(writer: &mut W, msg: Arc<M>, on_error: &ErrorSink)
where
    M: Send + Sync + 'static,
    W: MessageWrite<M>,
{
    // Write failures cost one message, never the pipe.
    if let Err(e) = writer.write(msg).await {
        on_error(HubError::Write(e));
    }
}

/// Fold a new message into an accumulated value. With no merge function the
/// fold is "replace": the latest message wins, and no copy of `M` is made.
pub(crate) fn fold<M>(
    merge: Option<&MergeFn<M>>,
    source: Option<Arc<M>>,
    diff: &Arc<M>,
) -> Arc<M> {
    match merge {
        Some(merge) => Arc::new(merge(source.as_deref(), diff)),
        None => Arc::clone(diff),
    }
}
