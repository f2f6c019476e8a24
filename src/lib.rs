//! fancast: fan-out message hub with per-subscriber adaptive batching
//!
//! Distributes a stream of update messages to a dynamic set of
//! subscribers. Each subscriber runs behind its own duplex pipe: an
//! inbound loop that decodes application and control frames, and an
//! outbound loop that batches broadcast messages at a flush interval the
//! subscriber can change at runtime. Late joiners are seeded with a
//! merged snapshot of everything broadcast so far, so they observe a
//! coherent starting state rather than only future deltas.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use fancast::{Hub, IntervalCodec, LineReader, LineWriter};
//!
//! # async fn demo(socket: tokio::net::TcpStream) {
//! let hub = Arc::new(Hub::new(None, None, Duration::from_millis(100)));
//! let _watcher = hub.spawn_shutdown_watcher(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! });
//!
//! let (rd, wr) = socket.into_split();
//! let reader = LineReader::new(rd, IntervalCodec::new(), |line: &str| {
//!     serde_json::from_str::<serde_json::Value>(line).map_err(Into::into)
//! });
//! let (mut inbox, _handle) = hub.add(reader, LineWriter::new(wr), None).await;
//!
//! hub.send_all(Arc::new(serde_json::json!({ "tick": 0 }))).await;
//! if let Some(msg) = inbox.recv().await {
//!     println!("subscriber sent {msg}");
//! }
//! # }
//! ```
//!
//! Delivery is best effort, in order, per subscriber, while connected.
//! There is no history beyond the snapshot and no retry anywhere in the
//! core; retry policy belongs to the transport primitives.

pub mod error;
pub mod hub;
pub mod pipe;
pub mod transport;

pub use error::{BoxError, ErrorSink, HubError};
pub use hub::{Hub, HubConfig};
pub use pipe::{DoneFn, Inbound, MergeFn, PipeHandle};
pub use transport::{
    IntervalCodec, LineReader, LineWriter, MessageRead, MessageWrite, ReadFn, WirePayload,
    WriteFn, INTERVAL_MARKER,
};
