//! Streaming demultiplexer for the attach frame format.
//!
//! Container runtimes multiplex stdin, stdout, and stderr onto one
//! connection. Every frame carries:
//! - A 1-byte stream type (0 = stdin, 1 = stdout, 2 = stderr)
//! - 3 reserved bytes, ignored when decoding
//! - A 4-byte big-endian payload length
//!
//! [`FrameDecoder`] reassembles frames from chunks of any size using a single
//! fixed-capacity buffer; [`Demuxer`] and (with the `async` feature)
//! `DemuxCodec` wrap it for blocking and tokio I/O.

pub mod codec;
pub mod concat;
pub mod config;
pub mod decoder;
#[cfg(feature = "async")]
pub mod demux_codec;
pub mod error;
pub mod reader;
pub mod stream_type;
pub mod writer;

pub use codec::{
    decode_length, decode_type, encode_frame, encode_header, Chunk, FrameHeader, HEADER_SIZE,
    MAX_PAYLOAD,
};
pub use concat::concat_chunks;
pub use config::{
    parse_buffer_capacity, DecoderConfig, BUFFER_CAPACITY_ENV, DEFAULT_BUFFER_CAPACITY,
};
pub use decoder::{Demuxed, End, FrameDecoder};
#[cfg(feature = "async")]
pub use demux_codec::DemuxCodec;
pub use error::{ConfigError, FrameError, Result};
pub use reader::Demuxer;
pub use stream_type::StreamType;
pub use writer::FrameWriter;
