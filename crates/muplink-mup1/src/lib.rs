//! MUP1 (Microchip UART Protocol #1) framing.
//!
//! MUP1 is the byte-framed transport spoken by VelocityDRIVE switches over
//! their management UART. Each frame is a start byte `>`, a one-byte type,
//! an escaped payload, one or two end bytes `<`, and a 16-bit
//! one's-complement checksum rendered as four uppercase hex characters.
//!
//! This crate is pure — no I/O. [`codec`] encodes and decodes single
//! frames; [`deframer`] turns an arbitrarily chunked byte stream into a
//! sequence of complete frames.

pub mod codec;
pub mod deframer;
pub mod error;

pub use codec::{decode_frame, encode_frame, mup1_checksum, DecodedFrame, FrameType};
pub use deframer::{Deframer, DeframerConfig};
pub use error::{FrameError, Result};
