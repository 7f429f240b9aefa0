//! # Incremental Packet Reader
//!
//! Pulls frames off an `AsyncRead` with a single growable buffer and a pair of cursors.
//! Consumed bytes are compacted to the front only when more room is needed, and capacity
//! doubles when a frame outgrows the buffer, so steady-state reads allocate nothing.
//!
//! One reader owns one stream half. Do not share a reader between tasks; a full-duplex
//! stream can still be written concurrently through its write half.
//!
//! ## Cancellation
//! [`PacketReader::read_frame`] may be dropped at any await point. Bytes already read stay in
//! the buffer and the next call resumes from the same frame boundary.

use crate::core::codec::{Decoded, Frame, PacketCodec};
use crate::error::{ProtocolError, Result};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

pub struct PacketReader<R> {
    inner: R,
    codec: Arc<dyn PacketCodec>,
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl<R: AsyncRead + Unpin> PacketReader<R> {
    pub fn new(inner: R, codec: Arc<dyn PacketCodec>) -> Self {
        Self::with_capacity(inner, codec, crate::config::DEFAULT_READ_BUFFER)
    }

    pub fn with_capacity(inner: R, codec: Arc<dyn PacketCodec>, capacity: usize) -> Self {
        Self {
            inner,
            codec,
            buf: vec![0u8; capacity.max(1)],
            start: 0,
            end: 0,
        }
    }

    /// Read the next complete frame.
    ///
    /// A clean end of stream between frames yields [`ProtocolError::ConnectionClosed`]; an end
    /// of stream inside a frame is an `UnexpectedEof` I/O error. Framing errors are fatal for
    /// the stream.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.codec.decode(&self.buf[self.start..self.end])? {
                Decoded::Frame { frame, consumed } => {
                    self.start += consumed;
                    if self.start == self.end {
                        self.start = 0;
                        self.end = 0;
                    }
                    trace!(
                        sequence = frame.sequence,
                        message_type = %frame.message_type,
                        consumed,
                        "Frame decoded"
                    );
                    return Ok(frame);
                }
                Decoded::Incomplete { needed } => self.ensure_bytes(needed).await?,
            }
        }
    }

    /// Block until at least `n` unconsumed bytes are buffered
    async fn ensure_bytes(&mut self, n: usize) -> Result<()> {
        if self.end - self.start >= n {
            return Ok(());
        }

        if self.buf.len() - self.start < n {
            self.compact();
        }
        if self.buf.len() < n {
            let mut capacity = self.buf.len();
            while capacity < n {
                capacity *= 2;
            }
            self.buf.resize(capacity, 0);
        }

        while self.end - self.start < n {
            let read = self.inner.read(&mut self.buf[self.end..]).await?;
            if read == 0 {
                if self.start == self.end {
                    return Err(ProtocolError::ConnectionClosed);
                }
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "stream ended with {} of {n} bytes buffered",
                        self.end - self.start
                    ),
                )));
            }
            self.end += read;
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// Bytes read from the stream but not yet returned as frames
    pub fn buffered(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
