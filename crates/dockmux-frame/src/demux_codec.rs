//! `tokio_util::codec` integration.
//!
//! [`DemuxCodec`] turns any `AsyncRead` into a stream of owned [`Chunk`]s via
//! `FramedRead`, and any `AsyncWrite` into a frame sink via `FramedWrite`.

use std::collections::VecDeque;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::codec::{encode_frame, Chunk};
use crate::config::DecoderConfig;
use crate::decoder::{End, FrameDecoder};
use crate::error::{FrameError, Result};

/// Frame codec backed by a [`FrameDecoder`].
#[derive(Debug, Default)]
pub struct DemuxCodec {
    decoder: FrameDecoder,
    pending: VecDeque<Chunk>,
    /// Error raised by a push whose earlier events are still queued.
    failed: Option<FrameError>,
}

impl DemuxCodec {
    /// Create a codec with the default decoder configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec with an explicit decoder configuration.
    pub fn with_config(config: DecoderConfig) -> Result<Self> {
        Ok(Self {
            decoder: FrameDecoder::with_config(config)?,
            pending: VecDeque::new(),
            failed: None,
        })
    }
}

impl Decoder for DemuxCodec {
    type Item = Chunk;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }
        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        if src.is_empty() {
            return Ok(None);
        }

        // The decoder keeps its own partial-frame state, so every buffered
        // byte can be consumed now.
        let input = src.split();
        let pending = &mut self.pending;
        let pushed = self.decoder.push(&input, |stream, payload| {
            pending.push_back(Chunk::copy_from(stream, payload));
        });
        if let Err(err) = pushed {
            if self.pending.is_empty() {
                return Err(err);
            }
            self.failed = Some(err);
        }
        Ok(self.pending.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        match self.decoder.close() {
            End::Partial { stream, payload } if !payload.is_empty() => {
                debug!(%stream, len = payload.len(), "input ended inside a frame");
                Ok(Some(Chunk::copy_from(stream, payload)))
            }
            _ => Ok(None),
        }
    }
}

impl Encoder<Chunk> for DemuxCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Chunk, dst: &mut BytesMut) -> Result<()> {
        encode_frame(item.stream, item.payload.as_ref(), dst)
    }
}
