//! Crate error types
//!
//! Runtime failures are not logged or returned to callers; every pipe
//! funnels them through a single hub-wide [`ErrorSink`] supplied at
//! construction. The variants carry the failure taxonomy: read failures
//! are fatal to the pipe that hit them, everything else is not.

use std::sync::Arc;

use thiserror::Error;

/// Boxed transport-level error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runtime failure reported through the hub's error sink.
#[derive(Debug, Error)]
pub enum HubError {
    /// The transport is no longer readable. Terminates the pipe's inbound
    /// loop and triggers its closing sequence.
    #[error("transport read failed: {0}")]
    Read(#[source] BoxError),

    /// A single outbound write failed. The pipe keeps running; only that
    /// one message is lost.
    #[error("transport write failed: {0}")]
    Write(#[source] BoxError),

    /// A control frame was recognized but could not be decoded. No state
    /// changes.
    #[error("malformed control frame: {0}")]
    Control(#[source] BoxError),
}

/// Hub-wide error callback. All runtime errors from every pipe end up here.
pub type ErrorSink = Arc<dyn Fn(HubError) + Send + Sync>;

/// Sink used when the caller does not supply one.
pub(crate) fn noop_sink() -> ErrorSink {
    Arc::new(|_| {})
}
