//! Hub implementation
//!
//! The central registry that manages live subscriber pipes, fans broadcast
//! messages out to them, and folds every message into the shared snapshot
//! replayed to late joiners.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};

use crate::error::{noop_sink, BoxError, ErrorSink};
use crate::pipe::{fold, DoneFn, Inbound, MergeFn, Pipe, PipeHandle, PipeOptions};
use crate::transport::{MessageRead, MessageWrite};

use super::config::HubConfig;

struct PipeEntry<M> {
    outbound_tx: mpsc::Sender<Arc<M>>,
    handle: PipeHandle,
}

struct HubState<M> {
    pipes: HashMap<u64, PipeEntry<M>>,
    snapshot: Option<Arc<M>>,
}

/// Fan-out hub over a dynamic set of subscriber pipes.
///
/// Messages are broadcast as `Arc<M>`: every pipe's outbound queue and the
/// snapshot share one allocation. Membership and the snapshot live behind
/// one `RwLock` whose critical sections never cross an await point; the
/// `broadcast_order` mutex serializes `send_all` against registration so a
/// joining pipe either sees a message in its seeded snapshot or receives
/// it on its queue, never neither.
pub struct Hub<M> {
    state: RwLock<HubState<M>>,
    broadcast_order: Mutex<()>,
    merge: Option<MergeFn<M>>,
    on_error: ErrorSink,
    config: HubConfig,
    next_pipe_id: AtomicU64,
}

impl<M: Send + Sync + 'static> Hub<M> {
    /// Create a hub with an empty live set.
    ///
    /// `on_error` receives every runtime error from every pipe; `merge`
    /// folds broadcast messages into batches and the snapshot (`None`
    /// means "latest value wins").
    pub fn new(
        on_error: Option<ErrorSink>,
        merge: Option<MergeFn<M>>,
        default_interval: Duration,
    ) -> Self {
        Self::with_config(on_error, merge, HubConfig::with_interval(default_interval))
    }

    /// Create a hub with full configuration.
    pub fn with_config(
        on_error: Option<ErrorSink>,
        merge: Option<MergeFn<M>>,
        config: HubConfig,
    ) -> Self {
        Self {
            state: RwLock::new(HubState {
                pipes: HashMap::new(),
                snapshot: None,
            }),
            broadcast_order: Mutex::new(()),
            merge,
            on_error: on_error.unwrap_or_else(noop_sink),
            config,
            next_pipe_id: AtomicU64::new(1),
        }
    }

    /// Get the hub configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Number of live pipes.
    pub fn pipe_count(&self) -> usize {
        self.state.read().pipes.len()
    }

    /// Current merged snapshot, if anything has been broadcast.
    pub fn snapshot(&self) -> Option<Arc<M>> {
        self.state.read().snapshot.clone()
    }

    /// Register a subscriber.
    ///
    /// The pipe is seeded with the current snapshot (always its first
    /// write), the hub's default interval, and the shared merge and error
    /// callbacks. Returns the pipe's inbound delivery queue and its
    /// handle; `on_done` fires exactly once when the pipe closes, after
    /// it has been removed from the live set.
    pub async fn add<R, W>(
        self: &Arc<Self>,
        reader: R,
        writer: W,
        on_done: Option<DoneFn>,
    ) -> (mpsc::Receiver<M>, PipeHandle)
    where
        R: MessageRead<M>,
        W: MessageWrite<M>,
    {
        self.register(Some(reader), writer, on_done).await
    }

    /// Register a write-only subscriber: no inbound loop, closes only on
    /// request or hub shutdown.
    pub async fn add_write_only<W>(self: &Arc<Self>, writer: W, on_done: Option<DoneFn>) -> PipeHandle
    where
        W: MessageWrite<M>,
    {
        let (_delivery, handle) = self.register(None::<NeverRead>, writer, on_done).await;
        handle
    }

    async fn register<R, W>(
        self: &Arc<Self>,
        reader: Option<R>,
        writer: W,
        on_done: Option<DoneFn>,
    ) -> (mpsc::Receiver<M>, PipeHandle)
    where
        R: MessageRead<M>,
        W: MessageWrite<M>,
    {
        let id = self.next_pipe_id.fetch_add(1, Ordering::Relaxed);

        // Completion callback: self-removal from the live set, then the
        // caller's own notification.
        let hub = Arc::downgrade(self);
        let on_done: DoneFn = Box::new(move || {
            if let Some(hub) = hub.upgrade() {
                hub.state.write().pipes.remove(&id);
                tracing::debug!(pipe_id = id, "pipe removed");
            }
            if let Some(on_done) = on_done {
                on_done();
            }
        });

        // Serialized against in-flight broadcasts: the snapshot captured
        // here is a consistent prior state, and anything broadcast after
        // the insert lands on the new pipe's queue behind it.
        let _order = self.broadcast_order.lock().await;
        let (pipe, count) = {
            let mut state = self.state.write();
            let pipe = Pipe::spawn(
                reader,
                writer,
                PipeOptions {
                    id,
                    snapshot: state.snapshot.clone(),
                    interval: self.config.default_interval,
                    outbound_capacity: self.config.outbound_capacity,
                    delivery_capacity: self.config.delivery_capacity,
                    merge: self.merge.clone(),
                    on_error: Arc::clone(&self.on_error),
                    on_done: Some(on_done),
                },
            );
            state.pipes.insert(
                id,
                PipeEntry {
                    outbound_tx: pipe.outbound_tx.clone(),
                    handle: pipe.handle.clone(),
                },
            );
            (pipe, state.pipes.len())
        };
        tracing::debug!(pipe_id = id, pipes = count, "pipe added");

        (pipe.delivery_rx, pipe.handle)
    }

    /// Broadcast a message to every live pipe and fold it into the
    /// snapshot so future joiners see it.
    ///
    /// Enqueueing is non-blocking except when a pipe's bounded outbound
    /// queue is full: that one slow subscriber backpressures this call
    /// without affecting what the others already received. Pipes whose
    /// done signal has fired are pruned opportunistically.
    pub async fn send_all(&self, msg: Arc<M>) {
        let _order = self.broadcast_order.lock().await;

        let targets: Vec<(u64, mpsc::Sender<Arc<M>>, bool)> = self
            .state
            .read()
            .pipes
            .iter()
            .map(|(id, entry)| (*id, entry.outbound_tx.clone(), entry.handle.is_closed()))
            .collect();

        let mut dead = Vec::new();
        for (id, outbound_tx, closed) in targets {
            if closed {
                dead.push(id);
                continue;
            }
            if outbound_tx.send(Arc::clone(&msg)).await.is_err() {
                dead.push(id);
            }
        }

        let mut state = self.state.write();
        for id in &dead {
            if state.pipes.remove(id).is_some() {
                tracing::debug!(pipe_id = id, "pipe pruned");
            }
        }
        state.snapshot = Some(fold(self.merge.as_ref(), state.snapshot.take(), &msg));
    }

    /// Close every live pipe and wait for each to finish closing.
    /// Already-closed pipes are unaffected.
    pub async fn shutdown(&self) {
        let handles: Vec<PipeHandle> = self
            .state
            .read()
            .pipes
            .values()
            .map(|entry| entry.handle.clone())
            .collect();

        tracing::debug!(pipes = handles.len(), "hub shutting down");
        for handle in &handles {
            handle.close();
        }
        for handle in &handles {
            handle.closed().await;
        }
    }

    /// Close every live pipe when `signal` resolves.
    ///
    /// Returns the watcher task's handle; aborting it detaches the hub
    /// from the signal without closing anything.
    pub fn spawn_shutdown_watcher<F>(self: &Arc<Self>, signal: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            signal.await;
            hub.shutdown().await;
        })
    }
}

/// Reader type for write-only pipes; never constructed.
enum NeverRead {}

impl<M: Send + Sync + 'static> MessageRead<M> for NeverRead {
    async fn read(&mut self) -> Result<Inbound<M>, BoxError> {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex as PlMutex;
    use tokio::time::{sleep, Instant};

    use crate::transport::{ReadFn, WriteFn};

    use super::*;

    fn recording_writer<M: Send + Sync + 'static>(
        sink: Arc<PlMutex<Vec<Arc<M>>>>,
    ) -> impl MessageWrite<M> {
        WriteFn(move |msg: Arc<M>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(msg);
                Ok::<(), BoxError>(())
            }
        })
    }

    fn silent_reader<M: Send + Sync + 'static>() -> impl MessageRead<M> {
        ReadFn(|| async { std::future::pending::<Result<Inbound<M>, BoxError>>().await })
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_receives_the_snapshot_first() {
        let hub = Arc::new(Hub::<String>::new(None, None, Duration::ZERO));

        hub.send_all(Arc::new("first".to_string())).await;
        hub.send_all(Arc::new("second".to_string())).await;

        let written = Arc::new(PlMutex::new(Vec::new()));
        let _handle = hub
            .add_write_only(recording_writer(Arc::clone(&written)), None)
            .await;
        hub.send_all(Arc::new("third".to_string())).await;
        sleep(Duration::from_millis(1)).await;

        let written = written.lock();
        // Default merge is replace, so the seeded snapshot is the latest
        // pre-join message.
        assert_eq!(written.len(), 2);
        assert_eq!(*written[0], "second");
        assert_eq!(*written[1], "third");
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_is_a_linear_fold_of_broadcasts() {
        let merge: MergeFn<String> = Arc::new(|source, diff| {
            let mut merged = source.cloned().unwrap_or_default();
            merged.push_str(diff);
            merged
        });
        let hub = Arc::new(Hub::new(None, Some(merge), Duration::ZERO));

        hub.send_all(Arc::new("a".to_string())).await;
        hub.send_all(Arc::new("b".to_string())).await;
        hub.send_all(Arc::new("c".to_string())).await;

        assert_eq!(*hub.snapshot().unwrap(), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn every_pipe_sees_immediate_broadcasts_in_order() {
        let hub = Arc::new(Hub::<u64>::new(None, None, Duration::ZERO));

        let sinks: Vec<_> = (0..3).map(|_| Arc::new(PlMutex::new(Vec::new()))).collect();
        for sink in &sinks {
            hub.add(silent_reader(), recording_writer(Arc::clone(sink)), None)
                .await;
        }

        for i in 0..10u64 {
            hub.send_all(Arc::new(i)).await;
        }
        sleep(Duration::from_millis(1)).await;

        for sink in &sinks {
            let written = sink.lock();
            assert_eq!(written.len(), 10);
            for (i, msg) in written.iter().enumerate() {
                assert_eq!(**msg, i as u64);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn closing_a_pipe_removes_it_from_the_live_set() {
        let hub = Arc::new(Hub::<u64>::new(None, None, Duration::ZERO));
        let dones = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&dones);
        let (_delivery, handle) = hub
            .add(
                silent_reader(),
                recording_writer(Arc::new(PlMutex::new(Vec::new()))),
                Some(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await;
        assert_eq!(hub.pipe_count(), 1);

        handle.close();
        handle.closed().await;
        assert_eq!(hub.pipe_count(), 0);
        assert_eq!(dones.load(Ordering::SeqCst), 1);

        // Broadcasting to an empty set still folds the snapshot.
        hub.send_all(Arc::new(7)).await;
        assert_eq!(*hub.snapshot().unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn broadcast_prunes_entries_whose_done_signal_fired() {
        let hub = Arc::new(Hub::<u64>::new(None, None, Duration::ZERO));

        // A pipe that closed without a completion callback stays in the
        // set until the next broadcast discovers it.
        let pipe = Pipe::spawn(
            Some(silent_reader()),
            recording_writer(Arc::new(PlMutex::new(Vec::new()))),
            PipeOptions {
                id: 42,
                snapshot: None,
                interval: Duration::ZERO,
                outbound_capacity: 1,
                delivery_capacity: 1,
                merge: None,
                on_error: noop_sink(),
                on_done: None,
            },
        );
        hub.state.write().pipes.insert(
            42,
            PipeEntry {
                outbound_tx: pipe.outbound_tx.clone(),
                handle: pipe.handle.clone(),
            },
        );
        pipe.handle.close();
        assert_eq!(hub.pipe_count(), 1);

        hub.send_all(Arc::new(1)).await;
        assert_eq!(hub.pipe_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_watcher_closes_every_pipe() {
        let hub = Arc::new(Hub::<u64>::new(None, None, Duration::ZERO));
        let dones = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let counter = Arc::clone(&dones);
            let (_delivery, handle) = hub
                .add(
                    silent_reader(),
                    recording_writer(Arc::new(PlMutex::new(Vec::new()))),
                    Some(Box::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })),
                )
                .await;
            handles.push(handle);
        }

        let watcher = hub.spawn_shutdown_watcher(async {
            sleep(Duration::from_millis(50)).await;
        });

        sleep(Duration::from_millis(100)).await;
        watcher.await.unwrap();

        for handle in &handles {
            assert!(handle.is_closed());
        }
        assert_eq!(hub.pipe_count(), 0);
        assert_eq!(dones.load(Ordering::SeqCst), 3);

        // Shutting down again is a no-op.
        hub.shutdown().await;
    }

    #[derive(Debug)]
    struct Indexed {
        idx: u64,
        idxs: Vec<u64>,
    }

    /// Port of the reference stress scenario: 100 pipes batching at 100ms
    /// while the hub broadcasts an indexed message every 10ms for 5s.
    /// Every pipe must reconstruct the exact ascending index sequence from
    /// its seeded snapshot plus its flushes, with at most one flush per
    /// interval window.
    #[tokio::test(start_paused = true)]
    async fn batched_fanout_preserves_order_across_pipes() {
        let interval = Duration::from_millis(100);
        let limit = Duration::from_secs(5);

        let merge: MergeFn<Indexed> = Arc::new(|source, diff| {
            let mut idxs = source.map(|s| s.idxs.clone()).unwrap_or_default();
            idxs.push(diff.idx);
            Indexed { idx: diff.idx, idxs }
        });
        let hub = Arc::new(Hub::new(None, Some(merge), interval));
        let _watcher = hub.spawn_shutdown_watcher(async move {
            sleep(limit).await;
        });

        let stats: Arc<PlMutex<HashMap<usize, (usize, Vec<u64>)>>> =
            Arc::new(PlMutex::new(HashMap::new()));
        let dones = Arc::new(AtomicUsize::new(0));

        for i in 0..100 {
            let reader = ReadFn(move || async move {
                sleep(limit).await;
                Err::<Inbound<Indexed>, BoxError>("EOF".into())
            });
            let sink = Arc::clone(&stats);
            let writer = WriteFn(move |msg: Arc<Indexed>| {
                let sink = Arc::clone(&sink);
                async move {
                    let mut stats = sink.lock();
                    let entry = stats.entry(i).or_default();
                    entry.0 += 1;
                    entry.1.extend_from_slice(&msg.idxs);
                    Ok::<(), BoxError>(())
                }
            });
            let counter = Arc::clone(&dones);
            hub.add(
                reader,
                writer,
                Some(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .await;
        }

        let start = Instant::now();
        let mut idx = 0u64;
        while start.elapsed() < limit {
            hub.send_all(Arc::new(Indexed {
                idx,
                idxs: Vec::new(),
            }))
            .await;
            idx += 1;
            sleep(Duration::from_millis(10)).await;
        }

        hub.shutdown().await;
        assert_eq!(dones.load(Ordering::SeqCst), 100);
        assert_eq!(hub.pipe_count(), 0);

        let windows = (limit.as_millis() / interval.as_millis()) as usize;
        let stats = stats.lock();
        assert_eq!(stats.len(), 100);
        for (flushes, idxs) in stats.values() {
            assert!(
                *flushes <= windows + 1,
                "{flushes} flushes for {windows} windows"
            );
            assert!(!idxs.is_empty());
            for (expected, idx) in idxs.iter().enumerate() {
                assert_eq!(*idx, expected as u64, "gap or reorder in {idxs:?}");
            }
        }
    }
}
