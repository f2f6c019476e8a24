//! Interval control-frame codec and wire payload helper
//!
//! Subscribers adjust their own flush interval in-band: a text frame of the
//! form `_DELAY=<millis>` becomes an [`Inbound::SetInterval`] control frame
//! instead of reaching the application decoder. Out-of-range requests are
//! clamped, never rejected; unparseable ones become
//! [`Inbound::ControlError`] and change nothing.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::error::BoxError;
use crate::pipe::Inbound;

/// Default marker prefix for interval commands.
pub const INTERVAL_MARKER: &str = "_DELAY=";

/// Decodes text frames arriving from a subscriber into [`Inbound`] frames.
#[derive(Debug, Clone)]
pub struct IntervalCodec {
    marker: String,
    min: Duration,
    max: Duration,
}

impl Default for IntervalCodec {
    fn default() -> Self {
        Self {
            marker: INTERVAL_MARKER.to_string(),
            min: Duration::ZERO,
            max: Duration::from_secs(1),
        }
    }
}

impl IntervalCodec {
    /// Codec with the default marker and a [0, 1s] interval bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker prefix that identifies interval commands.
    pub fn marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Bounds for requested intervals. Requests outside the range clamp;
    /// `max` is floored at `min`.
    pub fn bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min = min;
        self.max = max.max(min);
        self
    }

    /// Decode one text frame.
    ///
    /// Empty frames are skipped. Frames carrying the marker prefix plus a
    /// payload become interval updates; a bare marker is an ordinary data
    /// frame. Everything else goes through `decode`; its error is a read
    /// error and terminates the pipe, matching a transport that cannot
    /// recover mid-stream.
    pub fn decode<M, D>(&self, frame: &str, decode: D) -> Result<Inbound<M>, BoxError>
    where
        D: FnOnce(&str) -> Result<M, BoxError>,
    {
        if frame.is_empty() {
            return Ok(Inbound::Skip);
        }
        let command = frame
            .strip_prefix(self.marker.as_str())
            .filter(|raw| !raw.is_empty());
        if let Some(raw) = command {
            return Ok(match raw.trim().parse::<f64>() {
                Ok(millis) if millis.is_finite() => {
                    // Clamp in the float domain: a huge finite request must
                    // not overflow the duration construction.
                    let secs = (millis / 1000.0)
                        .clamp(self.min.as_secs_f64(), self.max.as_secs_f64());
                    Inbound::SetInterval(Duration::from_secs_f64(secs))
                }
                Ok(_) => Inbound::ControlError(format!("non-finite interval: {raw}").into()),
                Err(e) => Inbound::ControlError(Box::new(e)),
            });
        }
        decode(frame).map(Inbound::Data)
    }
}

/// Outbound value on its way to the wire.
///
/// Already-encoded byte frames pass through untouched; everything else is
/// encoded with the ambient structured format (JSON). This lets data
/// messages and protocol frames share one write path.
#[derive(Debug, Clone)]
pub enum WirePayload<M> {
    /// Raw frame, forwarded as-is.
    Raw(Bytes),
    /// Structured value, JSON-encoded on write.
    Value(M),
}

impl<M: Serialize> WirePayload<M> {
    /// Encode the payload for the wire.
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        match self {
            WirePayload::Raw(bytes) => Ok(bytes.clone()),
            WirePayload::Value(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(frame: &str) -> Result<serde_json::Value, BoxError> {
        serde_json::from_str(frame).map_err(Into::into)
    }

    #[test]
    fn interval_command_is_decoded() {
        let codec = IntervalCodec::new();
        match codec.decode("_DELAY=250", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::from_millis(250)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn out_of_range_intervals_clamp() {
        let codec = IntervalCodec::new();
        match codec.decode("_DELAY=99999", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::from_secs(1)),
            other => panic!("unexpected frame: {other:?}"),
        }
        match codec.decode("_DELAY=-5", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::ZERO),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn huge_finite_intervals_clamp() {
        let codec = IntervalCodec::new();
        // 1e300 is finite and parses; it must clamp, not overflow.
        match codec.decode("_DELAY=1e300", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::from_secs(1)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn inverted_bounds_floor_at_the_minimum() {
        let codec =
            IntervalCodec::new().bounds(Duration::from_secs(1), Duration::from_millis(10));
        match codec.decode("_DELAY=500", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::from_secs(1)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn bare_marker_is_an_ordinary_frame() {
        let codec = IntervalCodec::new();
        // No payload means no command; the decoder's failure is a read
        // error like any other undecodable frame.
        assert!(codec.decode("_DELAY=", json).is_err());
    }

    #[test]
    fn malformed_interval_becomes_control_error() {
        let codec = IntervalCodec::new();
        assert!(matches!(
            codec.decode("_DELAY=fast", json).unwrap(),
            Inbound::ControlError(_)
        ));
        assert!(matches!(
            codec.decode("_DELAY=inf", json).unwrap(),
            Inbound::ControlError(_)
        ));
    }

    #[test]
    fn empty_frame_is_skipped() {
        let codec = IntervalCodec::new();
        assert!(matches!(codec.decode("", json).unwrap(), Inbound::Skip));
    }

    #[test]
    fn data_frames_reach_the_decoder() {
        let codec = IntervalCodec::new();
        match codec.decode(r#"{"x":1}"#, json).unwrap() {
            Inbound::Data(v) => assert_eq!(v["x"], 1),
            other => panic!("unexpected frame: {other:?}"),
        }
        // Decoder failure is a read error, not a control error.
        assert!(codec.decode("not json", json).is_err());
    }

    #[test]
    fn custom_marker_and_bounds() {
        let codec = IntervalCodec::new()
            .marker("interval:")
            .bounds(Duration::from_millis(10), Duration::from_secs(5));
        match codec.decode("interval:2", json).unwrap() {
            Inbound::SetInterval(d) => assert_eq!(d, Duration::from_millis(10)),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn raw_payload_passes_through() {
        let raw = WirePayload::<serde_json::Value>::Raw(Bytes::from_static(b"already encoded"));
        assert_eq!(raw.encode().unwrap(), Bytes::from_static(b"already encoded"));
    }

    #[test]
    fn structured_payload_is_json_encoded() {
        let value = WirePayload::Value(serde_json::json!({ "tick": 7 }));
        assert_eq!(value.encode().unwrap(), Bytes::from_static(b"{\"tick\":7}"));
    }
}
