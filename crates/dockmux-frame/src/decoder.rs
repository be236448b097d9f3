use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::codec::{FrameHeader, HEADER_SIZE};
use crate::concat::concat_chunks;
use crate::config::DecoderConfig;
use crate::error::{FrameError, Result};
use crate::stream_type::StreamType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHeader,
    AwaitingPayload,
    Poisoned,
}

/// What [`FrameDecoder::close`] found at the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End<'a> {
    /// The stream ended between frames, or part-way through a header.
    Boundary,
    /// The stream ended inside a payload; `payload` holds the bytes buffered
    /// since the last data event (possibly none).
    Partial {
        stream: StreamType,
        payload: &'a [u8],
    },
}

/// Per-stream payloads recovered by [`FrameDecoder::decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demuxed {
    pub stdin: Bytes,
    pub stdout: Bytes,
    pub stderr: Bytes,
}

impl Demuxed {
    /// The payload collected for one stream.
    pub fn get(&self, stream: StreamType) -> &Bytes {
        match stream {
            StreamType::Stdin => &self.stdin,
            StreamType::Stdout => &self.stdout,
            StreamType::Stderr => &self.stderr,
        }
    }
}

/// Streaming decoder for attach frames.
///
/// Bytes may be pushed in chunks of any size; headers and payloads can be
/// split anywhere. Payload is staged in a fixed-capacity buffer and handed to
/// the caller as borrowed slices that alias that buffer, so a frame larger
/// than the capacity arrives as several capacity-sized slices.
///
/// Not synchronized: feed each instance from a single task.
pub struct FrameDecoder {
    state: State,
    buf: Box<[u8]>,
    /// Bytes written into `buf` since the last emission (or header reset).
    filled: usize,
    /// Payload bytes of the current frame seen so far.
    frame_read: u32,
    stream: StreamType,
    frame_len: u32,
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("state", &self.state)
            .field("capacity", &self.buf.len())
            .field("filled", &self.filled)
            .field("stream", &self.stream)
            .field("frame_read", &self.frame_read)
            .field("frame_len", &self.frame_len)
            .finish()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::from_valid_capacity(DecoderConfig::default().buffer_capacity)
    }
}

impl FrameDecoder {
    /// Create a decoder with the given buffer capacity.
    ///
    /// The capacity must be larger than [`HEADER_SIZE`].
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_config(DecoderConfig::with_capacity(capacity))
    }

    /// Create a decoder from a config.
    pub fn with_config(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_capacity(config.buffer_capacity))
    }

    fn from_valid_capacity(capacity: usize) -> Self {
        Self {
            state: State::AwaitingHeader,
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
            frame_read: 0,
            stream: StreamType::Stdout,
            frame_len: 0,
        }
    }

    /// Buffer capacity, which is also the largest slice a data event carries.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// True while a frame's payload is only partly delivered.
    pub fn is_mid_frame(&self) -> bool {
        self.state == State::AwaitingPayload
    }

    /// Feed a chunk of wire bytes.
    ///
    /// `on_data` is called once per completed frame, and once per full buffer
    /// for frames larger than the capacity. The slice aliases the decoder's
    /// buffer and is only valid for the duration of the call.
    ///
    /// On a malformed header, events already delivered for this chunk stand,
    /// the error is returned, and the decoder refuses further input with
    /// [`FrameError::Poisoned`] until [`close`](Self::close) or
    /// [`reset`](Self::reset).
    pub fn push<F>(&mut self, mut chunk: &[u8], mut on_data: F) -> Result<()>
    where
        F: FnMut(StreamType, &[u8]),
    {
        if self.state == State::Poisoned {
            return Err(FrameError::Poisoned);
        }

        while !chunk.is_empty() {
            let before = chunk.len();

            if self.state == State::AwaitingHeader {
                let n = (HEADER_SIZE - self.filled).min(chunk.len());
                self.buf[self.filled..self.filled + n].copy_from_slice(&chunk[..n]);
                chunk = &chunk[n..];
                self.filled += n;

                if self.filled == HEADER_SIZE {
                    self.filled = 0;
                    self.read_header()?;
                }
            }

            if self.state == State::AwaitingPayload && !chunk.is_empty() {
                let frame_left = (self.frame_len - self.frame_read) as usize;
                let n = frame_left
                    .min(self.buf.len() - self.filled)
                    .min(chunk.len());
                self.buf[self.filled..self.filled + n].copy_from_slice(&chunk[..n]);
                chunk = &chunk[n..];
                self.filled += n;
                self.frame_read += n as u32;

                let complete = self.frame_read == self.frame_len;
                if complete || self.filled == self.buf.len() {
                    if complete {
                        self.state = State::AwaitingHeader;
                        self.frame_read = 0;
                    }
                    let len = std::mem::take(&mut self.filled);
                    on_data(self.stream, &self.buf[..len]);
                }
            }

            assert!(
                chunk.len() < before,
                "frame decoder made no progress ({} bytes left, capacity {})",
                chunk.len(),
                self.buf.len()
            );
        }

        Ok(())
    }

    fn read_header(&mut self) -> Result<()> {
        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&self.buf[..HEADER_SIZE]);
        let header = match FrameHeader::decode(&raw) {
            Ok(header) => header,
            Err(err) => {
                warn!(tag = raw[0], "malformed frame header");
                self.state = State::Poisoned;
                return Err(err);
            }
        };
        trace!(stream = %header.stream, length = header.length, "frame header");

        self.stream = header.stream;
        self.frame_len = header.length;
        if header.length > 0 {
            self.state = State::AwaitingPayload;
        }
        Ok(())
    }

    /// Signal the end of the input stream and reset for reuse.
    ///
    /// Returns the in-flight frame's buffered payload if the stream stopped
    /// mid-payload. The returned slice stays valid until the next call that
    /// takes `&mut self`.
    pub fn close(&mut self) -> End<'_> {
        let mid_frame = self.state == State::AwaitingPayload;
        let stream = self.stream;
        let len = if mid_frame { self.filled } else { 0 };
        self.reset();

        if mid_frame {
            debug!(%stream, buffered = len, "stream closed mid-frame");
            End::Partial {
                stream,
                payload: &self.buf[..len],
            }
        } else {
            End::Boundary
        }
    }

    /// Discard any partial frame and clear a poisoned state.
    pub fn reset(&mut self) {
        self.state = State::AwaitingHeader;
        self.filled = 0;
        self.frame_read = 0;
        self.frame_len = 0;
    }

    /// Decode a complete byte sequence into per-stream payloads.
    ///
    /// A trailing partial frame is kept. The decoder is reset afterwards,
    /// including when an error is returned.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Demuxed> {
        let mut parts: [Vec<Bytes>; 3] = Default::default();
        let mut collect = |stream: StreamType, payload: &[u8]| {
            parts[stream.tag() as usize].push(Bytes::copy_from_slice(payload));
        };

        if let Err(err) = self.push(chunk, &mut collect) {
            self.reset();
            return Err(err);
        }
        if let End::Partial { stream, payload } = self.close() {
            collect(stream, payload);
        }

        let [stdin, stdout, stderr] = parts;
        Ok(Demuxed {
            stdin: concat_chunks(&stdin),
            stdout: concat_chunks(&stdout),
            stderr: concat_chunks(&stderr),
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;
    use crate::error::ConfigError;

    fn frame(stream: StreamType, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(stream, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    fn push_collect(decoder: &mut FrameDecoder, chunk: &[u8]) -> Vec<(StreamType, Vec<u8>)> {
        let mut events = Vec::new();
        decoder
            .push(chunk, |stream, payload| events.push((stream, payload.to_vec())))
            .unwrap();
        events
    }

    #[test]
    fn parses_single_frame() {
        let mut decoder = FrameDecoder::default();
        let events = push_collect(&mut decoder, &frame(StreamType::Stdin, &[3, 2, 1, 6, 7]));
        assert_eq!(events, vec![(StreamType::Stdin, vec![3, 2, 1, 6, 7])]);
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn parses_two_frames_in_one_chunk() {
        let mut wire = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);
        wire.extend(frame(StreamType::Stderr, &[1, 2, 3, 4, 5]));

        let mut decoder = FrameDecoder::default();
        let events = push_collect(&mut decoder, &wire);
        assert_eq!(
            events,
            vec![
                (StreamType::Stdin, vec![3, 2, 1, 6, 7]),
                (StreamType::Stderr, vec![1, 2, 3, 4, 5]),
            ]
        );
    }

    #[test]
    fn large_frame_is_split_at_buffer_capacity() {
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 10) as u8).collect();
        let mut decoder = FrameDecoder::default();
        let cap = decoder.capacity();
        assert!(cap < payload.len());

        let events = push_collect(&mut decoder, &frame(StreamType::Stderr, &payload));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, StreamType::Stderr);
        assert_eq!(events[0].1, payload[..cap]);
        assert_eq!(events[1].0, StreamType::Stderr);
        assert_eq!(events[1].1, payload[cap..]);
    }

    #[test]
    fn payload_of_k_buffers_plus_remainder() {
        let cap = 16;
        let payload: Vec<u8> = (0..(3 * cap + 5) as u8).collect();
        let mut decoder = FrameDecoder::new(cap).unwrap();

        let events = push_collect(&mut decoder, &frame(StreamType::Stdout, &payload));
        let sizes: Vec<usize> = events.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(sizes, vec![cap, cap, cap, 5]);
        let joined: Vec<u8> = events.into_iter().flat_map(|(_, p)| p).collect();
        assert_eq!(joined, payload);
    }

    #[test]
    fn payload_of_exact_buffer_multiple() {
        let cap = 16;
        let payload = vec![7u8; 2 * cap];
        let mut decoder = FrameDecoder::new(cap).unwrap();

        let events = push_collect(&mut decoder, &frame(StreamType::Stdout, &payload));
        let sizes: Vec<usize> = events.iter().map(|(_, p)| p.len()).collect();
        assert_eq!(sizes, vec![cap, cap]);
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn zero_length_frames_emit_nothing() {
        let mut wire = frame(StreamType::Stdin, b"");
        wire.extend(frame(StreamType::Stdout, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0]));
        wire.extend(frame(StreamType::Stderr, b""));

        let mut decoder = FrameDecoder::default();
        let events = push_collect(&mut decoder, &wire);
        assert_eq!(
            events,
            vec![(StreamType::Stdout, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0])]
        );
    }

    #[test]
    fn header_split_across_chunks() {
        let first = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);
        let mut wire = first.clone();
        wire.extend(frame(StreamType::Stderr, &[1, 2, 3, 4, 5]));
        let split = first.len() + 4;

        let mut decoder = FrameDecoder::default();
        let mut events = push_collect(&mut decoder, &wire[..split]);
        events.extend(push_collect(&mut decoder, &wire[split..]));
        assert_eq!(
            events,
            vec![
                (StreamType::Stdin, vec![3, 2, 1, 6, 7]),
                (StreamType::Stderr, vec![1, 2, 3, 4, 5]),
            ]
        );
    }

    #[test]
    fn body_in_separate_chunk_from_header() {
        let wire = frame(StreamType::Stdout, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
        let mut decoder = FrameDecoder::default();

        assert!(push_collect(&mut decoder, &wire[..HEADER_SIZE]).is_empty());
        assert!(decoder.is_mid_frame());
        let events = push_collect(&mut decoder, &wire[HEADER_SIZE..]);
        assert_eq!(
            events,
            vec![(StreamType::Stdout, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0])]
        );
    }

    #[test]
    fn body_split_in_two_chunks() {
        let wire = frame(StreamType::Stdout, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 0]);
        let mut decoder = FrameDecoder::default();

        assert!(push_collect(&mut decoder, &wire[..HEADER_SIZE + 4]).is_empty());
        let events = push_collect(&mut decoder, &wire[HEADER_SIZE + 4..]);
        assert_eq!(
            events,
            vec![(StreamType::Stdout, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 0])]
        );
    }

    #[test]
    fn byte_by_byte_feed() {
        let mut wire = frame(StreamType::Stdout, b"hello");
        wire.extend(frame(StreamType::Stderr, b"world"));

        let mut decoder = FrameDecoder::new(9).unwrap();
        let mut events = Vec::new();
        for byte in &wire {
            events.extend(push_collect(&mut decoder, std::slice::from_ref(byte)));
        }
        assert_eq!(
            events,
            vec![
                (StreamType::Stdout, b"hello".to_vec()),
                (StreamType::Stderr, b"world".to_vec()),
            ]
        );
    }

    #[test]
    fn close_at_start_of_body_returns_empty_partial() {
        let wire = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);
        let mut decoder = FrameDecoder::default();
        push_collect(&mut decoder, &wire[..HEADER_SIZE]);

        assert_eq!(
            decoder.close(),
            End::Partial {
                stream: StreamType::Stdin,
                payload: &[],
            }
        );
    }

    #[test]
    fn close_mid_body_returns_buffered_bytes() {
        let wire = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);
        let mut decoder = FrameDecoder::default();
        let events = push_collect(&mut decoder, &wire[..wire.len() - 2]);
        assert!(events.is_empty());

        assert_eq!(
            decoder.close(),
            End::Partial {
                stream: StreamType::Stdin,
                payload: &[3, 2, 1],
            }
        );
    }

    #[test]
    fn close_mid_body_after_flush_returns_only_unflushed_bytes() {
        let payload: Vec<u8> = (0..20).collect();
        let wire = frame(StreamType::Stdout, &payload);
        let mut decoder = FrameDecoder::new(16).unwrap();

        let events = push_collect(&mut decoder, &wire[..HEADER_SIZE + 18]);
        assert_eq!(events, vec![(StreamType::Stdout, payload[..16].to_vec())]);
        assert_eq!(
            decoder.close(),
            End::Partial {
                stream: StreamType::Stdout,
                payload: &payload[16..18],
            }
        );
    }

    #[test]
    fn close_mid_header_or_idle_is_boundary() {
        let wire = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);

        let mut decoder = FrameDecoder::default();
        assert_eq!(decoder.close(), End::Boundary);

        for cut in 1..HEADER_SIZE {
            push_collect(&mut decoder, &wire[..cut]);
            assert_eq!(decoder.close(), End::Boundary, "cut at {cut}");
        }
    }

    #[test]
    fn close_resets_for_reuse() {
        let wire = frame(StreamType::Stderr, b"fresh");
        let mut decoder = FrameDecoder::default();

        push_collect(&mut decoder, &wire[..HEADER_SIZE + 2]);
        assert!(matches!(decoder.close(), End::Partial { .. }));

        let events = push_collect(&mut decoder, &wire);
        assert_eq!(events, vec![(StreamType::Stderr, b"fresh".to_vec())]);

        push_collect(&mut decoder, &wire[..3]);
        assert_eq!(decoder.close(), End::Boundary);
        let events = push_collect(&mut decoder, &wire);
        assert_eq!(events, vec![(StreamType::Stderr, b"fresh".to_vec())]);
    }

    #[test]
    fn malformed_header_reports_error_without_data() {
        let mut wire = frame(StreamType::Stdin, &[3, 2, 1, 6, 7]);
        wire[0] = 123;

        let mut decoder = FrameDecoder::default();
        let mut events = 0;
        let err = decoder.push(&wire, |_, _| events += 1).unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader { tag: 123 }));
        assert_eq!(events, 0);
    }

    #[test]
    fn malformed_header_keeps_earlier_events_and_poisons() {
        let mut wire = frame(StreamType::Stdout, b"ok");
        let mut bad = frame(StreamType::Stdout, b"nope");
        bad[0] = 9;
        wire.extend(bad);

        let mut decoder = FrameDecoder::default();
        let mut events = Vec::new();
        let err = decoder
            .push(&wire, |stream, payload| events.push((stream, payload.to_vec())))
            .unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader { tag: 9 }));
        assert_eq!(events, vec![(StreamType::Stdout, b"ok".to_vec())]);

        let err = decoder
            .push(&frame(StreamType::Stdout, b"later"), |_, _| {
                panic!("poisoned decoder must not emit")
            })
            .unwrap_err();
        assert!(matches!(err, FrameError::Poisoned));

        decoder.reset();
        let events = push_collect(&mut decoder, &frame(StreamType::Stdout, b"later"));
        assert_eq!(events, vec![(StreamType::Stdout, b"later".to_vec())]);
    }

    #[test]
    fn rejects_capacity_that_cannot_hold_header() {
        assert!(matches!(
            FrameDecoder::new(7),
            Err(FrameError::InvalidConfig(ConfigError::TooSmall { capacity: 7, .. }))
        ));
        assert!(matches!(
            FrameDecoder::new(HEADER_SIZE),
            Err(FrameError::InvalidConfig(ConfigError::TooSmall { .. }))
        ));
        assert!(matches!(
            FrameDecoder::new(0),
            Err(FrameError::InvalidConfig(ConfigError::NotPositive(_)))
        ));
        assert_eq!(FrameDecoder::new(HEADER_SIZE + 1).unwrap().capacity(), 9);
    }

    #[test]
    fn decode_collects_per_stream() {
        let mut wire = Vec::new();
        wire.extend(frame(StreamType::Stdout, b"AB"));
        wire.extend(frame(StreamType::Stderr, b"C"));
        wire.extend(frame(StreamType::Stdout, b"DE"));
        wire.extend(frame(StreamType::Stdin, b""));
        wire.extend(frame(StreamType::Stderr, b"F"));

        let mut decoder = FrameDecoder::new(9).unwrap();
        let out = decoder.decode(&wire).unwrap();
        assert_eq!(out.stdout.as_ref(), b"ABDE");
        assert_eq!(out.stderr.as_ref(), b"CF");
        assert!(out.stdin.is_empty());
        assert_eq!(out.get(StreamType::Stderr).as_ref(), b"CF");
    }

    #[test]
    fn decode_keeps_trailing_partial_frame() {
        let mut wire = frame(StreamType::Stdout, b"done");
        let tail = frame(StreamType::Stderr, b"cut short");
        wire.extend(&tail[..HEADER_SIZE + 3]);

        let mut decoder = FrameDecoder::default();
        let out = decoder.decode(&wire).unwrap();
        assert_eq!(out.stdout.as_ref(), b"done");
        assert_eq!(out.stderr.as_ref(), b"cut");
        assert!(!decoder.is_mid_frame());
    }

    #[test]
    fn decode_fails_whole_call_on_malformed_header() {
        let mut wire = frame(StreamType::Stdout, b"fine");
        wire.extend([5, 0, 0, 0, 0, 0, 0, 1, 0]);

        let mut decoder = FrameDecoder::default();
        let err = decoder.decode(&wire).unwrap_err();
        assert!(matches!(err, FrameError::MalformedHeader { tag: 5 }));

        let out = decoder.decode(&frame(StreamType::Stdin, b"again")).unwrap();
        assert_eq!(out.stdin.as_ref(), b"again");
    }
}
