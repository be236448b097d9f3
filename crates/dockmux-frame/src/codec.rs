use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::stream_type::StreamType;

/// Frame header: stream type (1) + reserved (3) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest payload the 32-bit length field can describe.
pub const MAX_PAYLOAD: usize = u32::MAX as usize;

/// A decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// The stream the payload belongs to.
    pub stream: StreamType,
    /// Declared payload length in bytes.
    pub length: u32,
}

impl FrameHeader {
    /// Decode a header. Reserved bytes 1-3 are ignored.
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        Ok(Self {
            stream: decode_type(buf)?,
            length: decode_length(buf),
        })
    }

    /// Encode this header into its wire form.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        encode_header(self.stream, self.length)
    }
}

/// Read the stream type from byte 0 of a header.
pub fn decode_type(buf: &[u8; HEADER_SIZE]) -> Result<StreamType> {
    StreamType::try_from(buf[0])
}

/// Read the big-endian payload length from bytes 4-7 of a header.
pub fn decode_length(buf: &[u8; HEADER_SIZE]) -> u32 {
    u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]])
}

/// Build a header with zeroed reserved bytes.
///
/// Wire format:
/// ```text
/// ┌───────────┬────────────────┬─────────────┬─────────────────┐
/// │ Type (1B) │ Reserved (3B)  │ Length (4B) │ Payload         │
/// │ 0/1/2     │ 0x00 0x00 0x00 │ big-endian  │ (Length bytes)  │
/// └───────────┴────────────────┴─────────────┴─────────────────┘
/// ```
pub fn encode_header(stream: StreamType, length: u32) -> [u8; HEADER_SIZE] {
    let len = length.to_be_bytes();
    [stream.tag(), 0, 0, 0, len[0], len[1], len[2], len[3]]
}

/// Append one complete frame (header + payload) to `dst`.
pub fn encode_frame(stream: StreamType, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&encode_header(stream, payload.len() as u32));
    dst.put_slice(payload);
    Ok(())
}

/// An owned piece of payload routed to one stream.
///
/// Decoder events borrow the decoder's buffer; a `Chunk` is the copy
/// adapters hand out when a payload must outlive the next decoder call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The stream this payload belongs to.
    pub stream: StreamType,
    /// The payload bytes.
    pub payload: Bytes,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(stream: StreamType, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }

    /// Copy a borrowed decoder event into an owned chunk.
    pub fn copy_from(stream: StreamType, payload: &[u8]) -> Self {
        Self {
            stream,
            payload: Bytes::copy_from_slice(payload),
        }
    }
}
