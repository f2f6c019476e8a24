//! Transport seam between a pipe and its connection
//!
//! The hub core never touches sockets. Each subscriber supplies two
//! primitives: a blocking read that yields one decoded [`Inbound`] frame,
//! and a blocking write that sends one outbound value. Everything byte- or
//! protocol-shaped lives behind this pair.
//!
//! [`ReadFn`] and [`WriteFn`] adapt async closures into the trait pair;
//! [`line`] is a ready-made newline-delimited JSON adapter for any
//! `AsyncRead`/`AsyncWrite` transport.

pub mod codec;
pub mod line;

use std::future::Future;
use std::sync::Arc;

use crate::error::BoxError;
use crate::pipe::Inbound;

pub use codec::{IntervalCodec, WirePayload, INTERVAL_MARKER};
pub use line::{LineReader, LineWriter};

/// Blocking receive of one inbound unit.
///
/// An `Err` means the connection is no longer readable; it always
/// terminates the pipe. Frames that should produce no output are returned
/// as [`Inbound::Skip`], not as errors.
pub trait MessageRead<M>: Send + 'static {
    fn read(&mut self) -> impl Future<Output = Result<Inbound<M>, BoxError>> + Send;
}

/// Blocking send of one outbound unit.
///
/// An `Err` is reported through the error sink but is non-fatal to the
/// pipe. The value arrives as `Arc<M>` because the same instance is shared
/// with every other subscriber and the hub snapshot.
pub trait MessageWrite<M>: Send + 'static {
    fn write(&mut self, msg: Arc<M>) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Adapter turning an async closure into a read primitive.
pub struct ReadFn<F>(pub F);

impl<M, F, Fut> MessageRead<M> for ReadFn<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Inbound<M>, BoxError>> + Send,
{
    fn read(&mut self) -> impl Future<Output = Result<Inbound<M>, BoxError>> + Send {
        (self.0)()
    }
}

/// Adapter turning an async closure into a write primitive.
pub struct WriteFn<F>(pub F);

impl<M, F, Fut> MessageWrite<M> for WriteFn<F>
where
    F: FnMut(Arc<M>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    fn write(&mut self, msg: Arc<M>) -> impl Future<Output = Result<(), BoxError>> + Send {
        (self.0)(msg)
    }
}
