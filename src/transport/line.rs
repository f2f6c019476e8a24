//! Newline-delimited JSON transport adapter
//!
//! Reference adapter for byte-stream transports: each frame is one line.
//! Inbound lines run through an [`IntervalCodec`] so subscribers can issue
//! interval commands in-band; outbound values are written as one JSON line
//! each. EOF is a read error and terminates the pipe, the same way a
//! closed connection does.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

use crate::error::BoxError;
use crate::pipe::Inbound;

use super::codec::IntervalCodec;
use super::{MessageRead, MessageWrite};

/// Reads newline-delimited frames and runs them through an [`IntervalCodec`].
pub struct LineReader<R, D> {
    lines: Lines<BufReader<R>>,
    codec: IntervalCodec,
    decode: D,
}

impl<R, D> LineReader<R, D>
where
    R: AsyncRead + Unpin,
{
    /// Wrap a byte reader. `decode` turns non-control lines into
    /// application messages; its error terminates the pipe.
    pub fn new(reader: R, codec: IntervalCodec, decode: D) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            codec,
            decode,
        }
    }
}

impl<M, R, D> MessageRead<M> for LineReader<R, D>
where
    M: Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
    D: Fn(&str) -> Result<M, BoxError> + Send + 'static,
{
    async fn read(&mut self) -> Result<Inbound<M>, BoxError> {
        match self.lines.next_line().await? {
            Some(line) => self.codec.decode(line.trim_end(), &self.decode),
            None => Err("connection closed".into()),
        }
    }
}

/// Writes each outbound value as one JSON line.
pub struct LineWriter<W, M> {
    inner: W,
    _marker: PhantomData<fn(M)>,
}

impl<W, M> LineWriter<W, M> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<M, W> MessageWrite<M> for LineWriter<W, M>
where
    M: Serialize + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&mut self, msg: Arc<M>) -> Result<(), BoxError> {
        let mut frame = serde_json::to_vec(msg.as_ref())?;
        frame.push(b'\n');
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
