use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use tracing::debug;

use crate::codec::Chunk;
use crate::config::DecoderConfig;
use crate::decoder::{End, FrameDecoder};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Demultiplexes attach frames from any `Read` stream.
///
/// Payload is copied out of the decoder into owned [`Chunk`]s, so callers may
/// keep them as long as they like. Frames larger than the decoder's capacity
/// arrive as several chunks.
///
/// A decode error is reported after every chunk decoded ahead of it, and ends
/// the stream.
pub struct Demuxer<T> {
    inner: T,
    decoder: FrameDecoder,
    pending: VecDeque<Chunk>,
    failed: Option<FrameError>,
    eof: bool,
}

impl<T: Read> Demuxer<T> {
    /// Create a demuxer with the default decoder configuration.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::default(),
            pending: VecDeque::new(),
            failed: None,
            eof: false,
        }
    }

    /// Create a demuxer with an explicit decoder configuration.
    pub fn with_config(inner: T, config: DecoderConfig) -> Result<Self> {
        Ok(Self {
            inner,
            decoder: FrameDecoder::with_config(config)?,
            pending: VecDeque::new(),
            failed: None,
            eof: false,
        })
    }

    /// Read the next chunk of payload (blocking).
    ///
    /// Returns `Ok(None)` once the stream is exhausted. If the stream ended
    /// inside a frame, the buffered remainder is returned as a final chunk.
    pub fn read_chunk(&mut self) -> Result<Option<Chunk>> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }
            if let Some(err) = self.failed.take() {
                return Err(err);
            }
            if self.eof {
                return Ok(None);
            }

            let mut buf = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut buf) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.eof = true;
                if let End::Partial { stream, payload } = self.decoder.close() {
                    debug!(%stream, len = payload.len(), "input ended inside a frame");
                    if !payload.is_empty() {
                        self.pending.push_back(Chunk::copy_from(stream, payload));
                    }
                }
                continue;
            }

            let pending = &mut self.pending;
            let pushed = self.decoder.push(&buf[..read], |stream, payload| {
                pending.push_back(Chunk::copy_from(stream, payload));
            });
            if let Err(err) = pushed {
                self.failed = Some(err);
                self.eof = true;
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

    /// Consume the demuxer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for Demuxer<T> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_chunk().transpose()
    }
}
