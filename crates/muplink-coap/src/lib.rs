//! Minimal CoAP (RFC 7252) for CORECONF over serial.
//!
//! Builds confirmable requests with the option subset this stack needs
//! (Uri-Path, Content-Format, Uri-Query) and parses responses down to the
//! pieces the device layer correlates on: message ID, response code, and a
//! CBOR-decoded payload. Every outbound request carries Content-Format 260
//! (YANG-Data+CBOR, RFC 9254). Pure — no I/O.

pub mod codec;
pub mod error;

pub use codec::{
    build_request, parse_response, Method, Payload, Response, CONTENT_FORMAT_YANG_CBOR,
};
pub use error::{CoapError, Result};
