//! Inbound frame type
//!
//! The control-vs-data split is first class: control frames never reach
//! the owner's delivery queue, are never broadcast, and are never merged.

use std::time::Duration;

use crate::error::BoxError;

/// One decoded inbound unit from a subscriber's transport.
#[derive(Debug)]
pub enum Inbound<M> {
    /// Application payload, delivered to the pipe owner's inbound queue.
    Data(M),

    /// The subscriber asked for a new flush interval. Zero means "write
    /// every message immediately, no batching".
    SetInterval(Duration),

    /// A control frame was recognized but could not be decoded. Reported
    /// through the error sink and otherwise discarded.
    ControlError(BoxError),

    /// A frame that produces no output (keepalive, empty frame). Reading
    /// continues.
    Skip,
}
