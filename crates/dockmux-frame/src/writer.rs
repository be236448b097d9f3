use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, Chunk};
use crate::error::{FrameError, Result};
use crate::stream_type::StreamType;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete attach frames to any `Write` stream.
///
/// Mostly useful for producing fixtures and for peers that speak the
/// multiplexed format themselves.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a chunk as one frame (blocking).
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        self.send(chunk.stream, chunk.payload.as_ref())
    }

    /// Encode and send a payload on a stream.
    pub fn send(&mut self, stream: StreamType, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(stream, payload, &mut self.buf)?;
        self.inner.write_all(&self.buf)?;
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
