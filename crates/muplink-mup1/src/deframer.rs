use bytes::{Buf, BytesMut};

use crate::codec::{decode_frame, DecodedFrame, CHECKSUM_LEN, EOF, ESC, MIN_FRAME_LEN, SOF};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Configuration for the stream deframer.
#[derive(Debug, Clone)]
pub struct DeframerConfig {
    /// Scratch-buffer cap. Accumulating this many bytes without
    /// completing a frame resets the buffer. Default: 128 KiB.
    pub max_buffer: usize,
}

impl Default for DeframerConfig {
    fn default() -> Self {
        Self {
            max_buffer: 128 * 1024,
        }
    }
}

/// Reassembles complete MUP1 frames from an arbitrarily chunked byte
/// stream.
///
/// Feed it whatever the serial read returned; it hands back every frame
/// completed so far. Bytes before a start-of-frame marker are discarded,
/// and a frame that fails to decode (or fails its checksum) is surfaced as
/// an `Err` entry while the stream keeps going — feeding a valid frame
/// byte-by-byte yields the same result as feeding it whole.
#[derive(Debug, Default)]
pub struct Deframer {
    buf: BytesMut,
    config: DeframerConfig,
}

impl Deframer {
    /// Create a deframer with default configuration.
    pub fn new() -> Self {
        Self::with_config(DeframerConfig::default())
    }

    /// Create a deframer with explicit configuration.
    pub fn with_config(config: DeframerConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append a chunk and drain every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<DecodedFrame, FrameError>> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        loop {
            // Resynchronize: everything before the first SOF is noise.
            match self.buf.iter().position(|&b| b == SOF) {
                Some(0) => {}
                Some(n) => self.buf.advance(n),
                None => {
                    self.buf.clear();
                    break;
                }
            }
            if self.buf.len() < MIN_FRAME_LEN {
                break;
            }
            let Some(eof_idx) = find_unescaped_eof(&self.buf) else {
                if self.buf.len() > self.config.max_buffer {
                    out.push(Err(FrameError::BufferOverflow {
                        dropped: self.buf.len(),
                    }));
                    self.buf.clear();
                }
                break;
            };
            // The byte after the EOF decides whether padding is present,
            // so it must have arrived before the frame can be sliced.
            if self.buf.len() < eof_idx + 2 {
                break;
            }
            let mut checksum_start = eof_idx + 1;
            if self.buf[checksum_start] == EOF {
                checksum_start += 1;
            }
            let frame_end = checksum_start + CHECKSUM_LEN;
            if self.buf.len() < frame_end {
                break;
            }
            let frame = self.buf.split_to(frame_end);
            match decode_frame(&frame) {
                Ok(decoded) if !decoded.checksum_ok => {
                    out.push(Err(FrameError::ChecksumMismatch));
                }
                other => out.push(other),
            }
        }
        out
    }
}

/// Position of the first EOF at index >= 2 that is not part of an escape
/// sequence. A naive first-`<` search would split frames inside an
/// escaped delimiter.
fn find_unescaped_eof(buf: &[u8]) -> Option<usize> {
    let mut idx = 2;
    while idx < buf.len() {
        match buf[idx] {
            ESC => idx += 2,
            EOF => return Some(idx),
            _ => idx += 1,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, FrameType};

    fn ok_frames(results: Vec<Result<DecodedFrame, FrameError>>) -> Vec<DecodedFrame> {
        results
            .into_iter()
            .map(|r| r.expect("frame should decode"))
            .collect()
    }

    #[test]
    fn whole_frame_in_one_chunk() {
        let encoded = encode_frame(FrameType::Coap, b"payload");
        let mut deframer = Deframer::new();
        let frames = ok_frames(deframer.feed(&encoded));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"payload");
        assert_eq!(deframer.buffered(), 0);
    }

    #[test]
    fn byte_by_byte_equals_whole_frame() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let encoded = encode_frame(FrameType::Coap, &payload);

        let mut whole = Deframer::new();
        let expected = ok_frames(whole.feed(&encoded));

        let mut dribble = Deframer::new();
        let mut got = Vec::new();
        for &byte in encoded.iter() {
            got.extend(ok_frames(dribble.feed(&[byte])));
        }
        assert_eq!(got, expected);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].payload, payload);
    }

    #[test]
    fn uneven_chunk_sizes_yield_one_frame() {
        // A CoAP-bearing frame split as (1, 7, 20, rest).
        let inner: Vec<u8> = (0..52u8).collect();
        let encoded = encode_frame(FrameType::Coap, &inner);
        assert!(encoded.len() >= 28 + 1);

        let mut deframer = Deframer::new();
        let mut frames = Vec::new();
        let splits = [0, 1, 8, 28, encoded.len()];
        for pair in splits.windows(2) {
            frames.extend(ok_frames(deframer.feed(&encoded[pair[0]..pair[1]])));
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, inner);
        assert!(frames[0].checksum_ok);
    }

    #[test]
    fn every_chunk_stride_yields_the_same_frames() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(FrameType::Ping, b""));
        stream.extend_from_slice(&encode_frame(FrameType::Coap, &[0x3C, 0x3E, 0x00]));
        stream.extend_from_slice(&encode_frame(FrameType::Trace, b"boot ok"));

        for stride in 1..stream.len() {
            let mut deframer = Deframer::new();
            let mut frames = Vec::new();
            for chunk in stream.chunks(stride) {
                frames.extend(ok_frames(deframer.feed(chunk)));
            }
            assert_eq!(frames.len(), 3, "stride {stride}");
            assert_eq!(frames[0].frame_type, FrameType::Ping);
            assert_eq!(frames[1].payload, vec![0x3C, 0x3E, 0x00]);
            assert_eq!(frames[2].payload, b"boot ok");
        }
    }

    #[test]
    fn noise_before_sof_is_discarded() {
        let encoded = encode_frame(FrameType::Ping, b"");
        let mut stream = b"\r\nnoise\xFF\x00".to_vec();
        stream.extend_from_slice(&encoded);

        let mut deframer = Deframer::new();
        let frames = ok_frames(deframer.feed(&stream));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Ping);
    }

    #[test]
    fn corrupt_frame_reported_and_stream_continues() {
        let good = encode_frame(FrameType::Ping, b"");
        let mut bad = encode_frame(FrameType::Coap, b"abc").to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0x01; // break the checksum

        let mut stream = Vec::new();
        stream.extend_from_slice(&good);
        stream.extend_from_slice(&bad);
        stream.extend_from_slice(&good);

        let mut deframer = Deframer::new();
        let results = deframer.feed(&stream);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(FrameError::ChecksumMismatch)));
        assert!(results[2].is_ok());
    }

    #[test]
    fn unknown_type_reported_and_stream_continues() {
        let mut bad = encode_frame(FrameType::Ping, b"").to_vec();
        bad[1] = b'Z';
        let good = encode_frame(FrameType::Ping, b"");

        let mut stream = bad;
        stream.extend_from_slice(&good);

        let mut deframer = Deframer::new();
        let results = deframer.feed(&stream);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(FrameError::BadType { byte: b'Z' })));
        assert!(results[1].is_ok());
    }

    #[test]
    fn stalled_frame_resets_at_the_buffer_cap() {
        let mut deframer = Deframer::with_config(DeframerConfig { max_buffer: 64 });
        // A SOF with no EOF ever arriving.
        let mut results = deframer.feed(&[SOF, b'C']);
        assert!(results.is_empty());
        results = deframer.feed(&[b'x'; 128]);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(FrameError::BufferOverflow { .. })));
        assert_eq!(deframer.buffered(), 0);

        // The stream recovers afterwards.
        let frames = ok_frames(deframer.feed(&encode_frame(FrameType::Ping, b"")));
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn escaped_eof_does_not_terminate_the_payload() {
        // Payload of EOF bytes only; every one is escaped on the wire.
        let payload = vec![EOF; 9];
        let encoded = encode_frame(FrameType::Coap, &payload);
        let mut deframer = Deframer::new();
        for stride in [1, 2, 3, 5] {
            let mut frames = Vec::new();
            for chunk in encoded.chunks(stride) {
                frames.extend(ok_frames(deframer.feed(chunk)));
            }
            assert_eq!(frames.len(), 1, "stride {stride}");
            assert_eq!(frames[0].payload, payload);
        }
    }

    #[test]
    fn back_to_back_frames_in_one_chunk() {
        let mut stream = Vec::new();
        for i in 0..5u8 {
            stream.extend_from_slice(&encode_frame(FrameType::Coap, &[i]));
        }
        let mut deframer = Deframer::new();
        let frames = ok_frames(deframer.feed(&stream));
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.payload, vec![i as u8]);
        }
    }
}
