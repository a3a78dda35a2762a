use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Start-of-frame marker `>`.
pub const SOF: u8 = 0x3E;
/// End-of-frame marker `<`.
pub const EOF: u8 = 0x3C;
/// Escape byte `\`.
pub const ESC: u8 = 0x5C;
/// Checksum suffix length: four ASCII hex characters.
pub const CHECKSUM_LEN: usize = 4;
/// Smallest possible frame: SOF + type + EOF (+ padding EOF) + checksum.
pub const MIN_FRAME_LEN: usize = 8;

/// The five MUP1 command bytes.
///
/// Only [`FrameType::Coap`] and [`FrameType::Ping`] are ever emitted by
/// this stack; the rest arrive from the device as side channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// `A` — device announcement (UTF-8 text).
    Announcement,
    /// `C` — a CoAP message.
    Coap,
    /// `P` — ping (outbound) / pong (inbound).
    Ping,
    /// `T` — trace output (UTF-8 text).
    Trace,
    /// `S` — system event.
    System,
}

impl FrameType {
    /// The wire byte for this frame type.
    pub fn as_u8(self) -> u8 {
        match self {
            FrameType::Announcement => b'A',
            FrameType::Coap => b'C',
            FrameType::Ping => b'P',
            FrameType::Trace => b'T',
            FrameType::System => b'S',
        }
    }

    /// Parse a wire type byte.
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            b'A' => Ok(FrameType::Announcement),
            b'C' => Ok(FrameType::Coap),
            b'P' => Ok(FrameType::Ping),
            b'T' => Ok(FrameType::Trace),
            b'S' => Ok(FrameType::System),
            _ => Err(FrameError::BadType { byte }),
        }
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8() as char)
    }
}

/// A decoded MUP1 frame.
///
/// `checksum_ok` is reported rather than enforced: the caller decides
/// whether to tolerate or discard a frame whose trailing hex characters do
/// not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
    pub checksum_ok: bool,
}

/// Payload bytes that must be escaped, and what follows the escape byte.
///
/// The frame delimiters and the escape byte escape to themselves; NUL and
/// 0xFF map to the letters `0` and `F`.
fn escape_for(byte: u8) -> Option<u8> {
    match byte {
        0x00 => Some(b'0'),
        0xFF => Some(b'F'),
        SOF | EOF | ESC => Some(byte),
        _ => None,
    }
}

/// Inverse of [`escape_for`]. Unknown escape sequences pass the raw byte
/// through unchanged.
fn unescape(byte: u8) -> u8 {
    match byte {
        b'0' => 0x00,
        b'F' => 0xFF,
        _ => byte,
    }
}

/// 16-bit one's-complement checksum over `bytes` taken as big-endian
/// 16-bit words. An odd trailing byte is the high byte of a word whose low
/// byte is zero; carries above bit 15 fold back by addition; the stored
/// form is the bitwise NOT.
///
/// This matches the Microchip MUP1 specification. Some boards have been
/// observed to reject frames with this exact encoding; verify against the
/// vendor's `mup1cc` tool before treating a mismatch as a bug here.
pub fn mup1_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = bytes.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xFFFF {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Encode a payload into a complete MUP1 frame.
///
/// Wire format:
/// ```text
/// ┌─────┬──────┬─────────────────┬─────────┬──────────────┐
/// │ '>' │ type │ escaped payload │ '<' [<] │ 4 hex chars  │
/// └─────┴──────┴─────────────────┴─────────┴──────────────┘
/// ```
///
/// A second `<` is written exactly when the frame would otherwise have an
/// odd pre-checksum byte count, so the checksum always covers whole 16-bit
/// words. The checksum input runs from the start byte through the last `<`
/// written, padding included. Never fails.
pub fn encode_frame(frame_type: FrameType, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(payload.len() + payload.len() / 4 + MIN_FRAME_LEN);
    buf.put_u8(SOF);
    buf.put_u8(frame_type.as_u8());
    for &byte in payload {
        if let Some(escaped) = escape_for(byte) {
            buf.put_u8(ESC);
            buf.put_u8(escaped);
        } else {
            buf.put_u8(byte);
        }
    }
    buf.put_u8(EOF);
    if buf.len() % 2 != 0 {
        buf.put_u8(EOF);
    }
    let checksum = mup1_checksum(&buf);
    let mut hex = [0u8; CHECKSUM_LEN];
    for (i, nibble) in [12u32, 8, 4, 0].into_iter().enumerate() {
        hex[i] = HEX_UPPER[((checksum >> nibble) & 0xF) as usize];
    }
    buf.put_slice(&hex);
    buf
}

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Decode a single complete MUP1 frame.
///
/// Walks the payload region from index 2 honoring escapes; the first
/// unescaped `<` terminates the payload. A second `<` immediately after it
/// is alignment padding and belongs to the checksum input. The four hex
/// characters parse case-insensitively; a mismatch (or malformed hex)
/// yields `checksum_ok == false` but still returns the parsed frame.
pub fn decode_frame(bytes: &[u8]) -> Result<DecodedFrame> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameError::FrameTooShort { len: bytes.len() });
    }
    if bytes[0] != SOF {
        return Err(FrameError::BadSof { byte: bytes[0] });
    }
    let frame_type = FrameType::from_u8(bytes[1])?;

    let mut payload = Vec::new();
    let mut idx = 2;
    let mut eof_idx = None;
    while idx < bytes.len() {
        let byte = bytes[idx];
        if byte == ESC && idx + 1 < bytes.len() {
            payload.push(unescape(bytes[idx + 1]));
            idx += 2;
            continue;
        }
        if byte == EOF {
            eof_idx = Some(idx);
            break;
        }
        payload.push(byte);
        idx += 1;
    }
    let eof_idx = eof_idx.ok_or(FrameError::MissingEof)?;

    let mut checksum_start = eof_idx + 1;
    if bytes.get(checksum_start) == Some(&EOF) {
        checksum_start += 1;
    }
    let hex = bytes
        .get(checksum_start..checksum_start + CHECKSUM_LEN)
        .ok_or(FrameError::FrameTooShort { len: bytes.len() })?;
    let expected = parse_hex16(hex);
    let actual = mup1_checksum(&bytes[..checksum_start]);

    Ok(DecodedFrame {
        frame_type,
        payload,
        checksum_ok: expected == Some(actual),
    })
}

fn parse_hex16(hex: &[u8]) -> Option<u16> {
    let mut value: u16 = 0;
    for &c in hex {
        value = (value << 4) | u16::from((c as char).to_digit(16)? as u8);
    }
    Some(value)
}
