use ciborium::Value;

use crate::error::{CoapError, Result};

/// CoAP version carried in every message.
const VERSION: u8 = 1;
/// Message type: confirmable. No retransmission timers are run; the UART
/// link plus the request-level timeout provide reliability.
const TYPE_CON: u8 = 0;
/// Payload marker separating options from payload.
const PAYLOAD_MARKER: u8 = 0xFF;

/// Option numbers used by this stack.
const OPTION_URI_PATH: u16 = 11;
const OPTION_CONTENT_FORMAT: u16 = 12;
const OPTION_URI_QUERY: u16 = 15;

/// Content-Format 260: application/yang-data+cbor (RFC 9254). Every
/// outbound request carries it, payload or not.
pub const CONTENT_FORMAT_YANG_CBOR: u16 = 260;

/// CoAP request methods (RFC 7252 + RFC 8132).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Fetch,
    Patch,
    IPatch,
}

impl Method {
    /// The method code carried in the CoAP header.
    pub fn code(self) -> u8 {
        match self {
            Method::Get => 1,
            Method::Post => 2,
            Method::Put => 3,
            Method::Delete => 4,
            Method::Fetch => 5,
            Method::Patch => 6,
            Method::IPatch => 7,
        }
    }

    /// Canonical upper-case name.
    pub fn name(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Fetch => "FETCH",
            Method::Patch => "PATCH",
            Method::IPatch => "IPATCH",
        }
    }
}

impl std::str::FromStr for Method {
    type Err = CoapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "FETCH" => Ok(Method::Fetch),
            "PATCH" => Ok(Method::Patch),
            "IPATCH" => Ok(Method::IPatch),
            other => Err(CoapError::UnknownMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a confirmable request with no token.
///
/// The URI splits into slash-separated path segments (empties discarded)
/// and an optional `?`-introduced query of `&`-separated items (empties
/// discarded). Options are emitted in ascending option-number order:
/// Uri-Path(11) per segment, a single Content-Format(12) = 260, then
/// Uri-Query(15) per item. `payload` bytes must already be CBOR-encoded;
/// when present they follow the 0xFF marker.
pub fn build_request(method: Method, uri: &str, payload: Option<&[u8]>, message_id: u16) -> Vec<u8> {
    let (path, query) = split_uri(uri);

    let mut buf = Vec::with_capacity(16 + uri.len() + payload.map_or(0, <[u8]>::len));
    buf.push((VERSION << 6) | (TYPE_CON << 4)); // TKL = 0
    buf.push(method.code());
    buf.extend_from_slice(&message_id.to_be_bytes());

    let mut last_number = 0u16;
    for segment in path {
        push_option(&mut buf, &mut last_number, OPTION_URI_PATH, segment.as_bytes());
    }
    push_option(
        &mut buf,
        &mut last_number,
        OPTION_CONTENT_FORMAT,
        &CONTENT_FORMAT_YANG_CBOR.to_be_bytes(),
    );
    for item in query {
        push_option(&mut buf, &mut last_number, OPTION_URI_QUERY, item.as_bytes());
    }

    if let Some(payload) = payload {
        buf.push(PAYLOAD_MARKER);
        buf.extend_from_slice(payload);
    }
    buf
}

fn split_uri(uri: &str) -> (Vec<&str>, Vec<&str>) {
    let (path, query) = match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    };
    let segments = path.split('/').filter(|s| !s.is_empty()).collect();
    let items = query
        .map(|q| q.split('&').filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    (segments, items)
}

/// Append one option TLV, delta-encoded against the previous option
/// number, using the 13/14 extended forms where the nibble cannot hold
/// the value.
fn push_option(buf: &mut Vec<u8>, last_number: &mut u16, number: u16, value: &[u8]) {
    debug_assert!(number >= *last_number, "options must be emitted in order");
    let delta = number - *last_number;
    *last_number = number;

    let (delta_nibble, delta_ext) = split_field(delta);
    let (len_nibble, len_ext) = split_field(value.len() as u16);
    buf.push((delta_nibble << 4) | len_nibble);
    push_ext(buf, delta_ext);
    push_ext(buf, len_ext);
    buf.extend_from_slice(value);
}

enum FieldExt {
    None,
    One(u8),
    Two(u16),
}

fn split_field(value: u16) -> (u8, FieldExt) {
    if value < 13 {
        (value as u8, FieldExt::None)
    } else if value < 269 {
        (13, FieldExt::One((value - 13) as u8))
    } else {
        (14, FieldExt::Two(value - 269))
    }
}

fn push_ext(buf: &mut Vec<u8>, ext: FieldExt) {
    match ext {
        FieldExt::None => {}
        FieldExt::One(b) => buf.push(b),
        FieldExt::Two(v) => buf.extend_from_slice(&v.to_be_bytes()),
    }
}

/// A response payload in whichever form it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload marker present.
    None,
    /// The payload decoded as CBOR.
    Value(Value),
    /// The payload was present but did not decode as CBOR.
    Raw(Vec<u8>),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// The decoded CBOR value, if that is what arrived.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// A parsed CoAP response.
///
/// Options are deliberately skipped on this path: the device layer only
/// correlates on the message ID and branches on the code class. Extend
/// the parser if ETag/Location-Path ever become load-bearing.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub version: u8,
    pub msg_type: u8,
    pub code: u8,
    pub message_id: u16,
    pub payload: Payload,
}

impl Response {
    /// High three bits of the code: 2 = success, 4 = client error,
    /// 5 = server error.
    pub fn code_class(&self) -> u8 {
        self.code >> 5
    }

    /// The "C.DD" rendering, e.g. code 69 -> "2.05", code 132 -> "4.04".
    pub fn code_name(&self) -> String {
        format!("{}.{:02}", self.code >> 5, self.code & 0x1F)
    }

    pub fn is_success(&self) -> bool {
        self.code_class() == 2
    }
}

/// Parse a response message.
///
/// The payload is everything after the first 0xFF marker past the token
/// and options, decoded as CBOR; if decoding fails the raw bytes are
/// returned instead. Truncated option headers end the walk with no
/// payload rather than failing the whole message.
pub fn parse_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < 4 {
        return Err(CoapError::MessageTooShort { len: bytes.len() });
    }
    let version = bytes[0] >> 6;
    let msg_type = (bytes[0] >> 4) & 0x03;
    let token_len = (bytes[0] & 0x0F) as usize;
    let code = bytes[1];
    let message_id = u16::from_be_bytes([bytes[2], bytes[3]]);

    let body = bytes.get(4 + token_len..).unwrap_or(&[]);
    let payload = match payload_bytes(body) {
        Some(raw) => match ciborium::from_reader::<Value, _>(raw) {
            Ok(value) => Payload::Value(value),
            Err(_) => Payload::Raw(raw.to_vec()),
        },
        None => Payload::None,
    };

    Ok(Response {
        version,
        msg_type,
        code,
        message_id,
        payload,
    })
}

/// Walk the option TLVs and return the slice after the payload marker,
/// if any.
fn payload_bytes(body: &[u8]) -> Option<&[u8]> {
    let mut idx = 0;
    while idx < body.len() {
        let header = body[idx];
        if header == PAYLOAD_MARKER {
            return Some(&body[idx + 1..]);
        }
        idx += 1;
        // Delta extension bytes come before length extension bytes.
        match header >> 4 {
            13 => idx += 1,
            14 => idx += 2,
            _ => {}
        }
        let mut length = (header & 0x0F) as usize;
        match header & 0x0F {
            13 => {
                length = *body.get(idx)? as usize + 13;
                idx += 1;
            }
            14 => {
                let hi = *body.get(idx)?;
                let lo = *body.get(idx + 1)?;
                length = u16::from_be_bytes([hi, lo]) as usize + 269;
                idx += 2;
            }
            _ => {}
        }
        idx += length;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test-side option walker: reconstruct (number, value) pairs from a
    /// built request so tests can check ordering and delta arithmetic.
    fn walk_options(message: &[u8]) -> (Vec<(u16, Vec<u8>)>, Option<Vec<u8>>) {
        let token_len = (message[0] & 0x0F) as usize;
        let body = &message[4 + token_len..];
        let mut options = Vec::new();
        let mut number = 0u16;
        let mut idx = 0;
        while idx < body.len() {
            let header = body[idx];
            if header == PAYLOAD_MARKER {
                return (options, Some(body[idx + 1..].to_vec()));
            }
            idx += 1;
            let mut delta = (header >> 4) as u16;
            match delta {
                13 => {
                    delta = body[idx] as u16 + 13;
                    idx += 1;
                }
                14 => {
                    delta = u16::from_be_bytes([body[idx], body[idx + 1]]) + 269;
                    idx += 2;
                }
                _ => {}
            }
            let mut length = (header & 0x0F) as usize;
            match length {
                13 => {
                    length = body[idx] as usize + 13;
                    idx += 1;
                }
                14 => {
                    length = u16::from_be_bytes([body[idx], body[idx + 1]]) as usize + 269;
                    idx += 2;
                }
                _ => {}
            }
            number += delta;
            options.push((number, body[idx..idx + length].to_vec()));
            idx += length;
        }
        (options, None)
    }

    #[test]
    fn build_device_state_query() {
        // GET /c?d=a with MID 0x1234, no payload.
        let message = build_request(Method::Get, "/c?d=a", None, 0x1234);
        assert_eq!(
            message,
            vec![
                0x40, 0x01, 0x12, 0x34, // Ver=1 CON TKL=0, GET, MID
                0xB1, 0x63, // Uri-Path delta=11 len=1 "c"
                0x12, 0x01, 0x04, // Content-Format delta=1 len=2 = 260
                0x33, 0x64, 0x3D, 0x61, // Uri-Query delta=3 len=3 "d=a"
            ]
        );
    }

    #[test]
    fn build_with_payload_appends_marker() {
        let message = build_request(Method::Post, "/c", Some(&[0xA0]), 1);
        let (options, payload) = walk_options(&message);
        assert_eq!(
            options,
            vec![
                (OPTION_URI_PATH, b"c".to_vec()),
                (OPTION_CONTENT_FORMAT, vec![0x01, 0x04]),
            ]
        );
        assert_eq!(payload, Some(vec![0xA0]));
    }

    #[test]
    fn option_numbers_are_non_decreasing() {
        let uris = [
            "/c?d=a",
            "/ietf-interfaces/interfaces/interface",
            "/?k=v&x=y",
            "a/b/c/d?q1&q2&q3",
            "//double//slashes//?&&",
        ];
        for uri in uris {
            let message = build_request(Method::Fetch, uri, None, 7);
            let (options, _) = walk_options(&message);
            let numbers: Vec<u16> = options.iter().map(|(n, _)| *n).collect();
            let mut sorted = numbers.clone();
            sorted.sort_unstable();
            assert_eq!(numbers, sorted, "options out of order for {uri}");
            // Exactly one Content-Format, always 260.
            let formats: Vec<_> = options
                .iter()
                .filter(|(n, _)| *n == OPTION_CONTENT_FORMAT)
                .collect();
            assert_eq!(formats.len(), 1);
            assert_eq!(formats[0].1, vec![0x01, 0x04]);
        }
    }

    #[test]
    fn empty_segments_and_items_are_discarded() {
        let message = build_request(Method::Get, "//a///b/?&x&&", None, 2);
        let (options, _) = walk_options(&message);
        let paths: Vec<_> = options
            .iter()
            .filter(|(n, _)| *n == OPTION_URI_PATH)
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(paths, vec![b"a".to_vec(), b"b".to_vec()]);
        let queries: Vec<_> = options
            .iter()
            .filter(|(n, _)| *n == OPTION_URI_QUERY)
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(queries, vec![b"x".to_vec()]);
    }

    #[test]
    fn long_values_use_extended_length_forms() {
        // 13..268 takes the one-byte form, 269+ the two-byte form.
        let medium = "m".repeat(40);
        let long = "l".repeat(300);
        let uri = format!("/{medium}/{long}");
        let message = build_request(Method::Get, &uri, None, 3);
        let (options, _) = walk_options(&message);
        assert_eq!(options[0].1.len(), 40);
        assert_eq!(options[1].1.len(), 300);
        assert_eq!(options[0].0, OPTION_URI_PATH);
        assert_eq!(options[1].0, OPTION_URI_PATH);
    }

    #[test]
    fn parse_content_response() {
        // ACK, 2.05 Content, MID 0x1234, CBOR map payload.
        let tree = Value::Map(vec![(
            Value::Text("ietf-interfaces:interfaces".into()),
            Value::Map(vec![(
                Value::Text("interface".into()),
                Value::Array(vec![Value::Map(vec![(
                    Value::Text("name".into()),
                    Value::Text("eth0".into()),
                )])]),
            )]),
        )]);
        let mut message = vec![0x60, 0x45, 0x12, 0x34, PAYLOAD_MARKER];
        ciborium::into_writer(&tree, &mut message).unwrap();

        let response = parse_response(&message).unwrap();
        assert_eq!(response.version, 1);
        assert_eq!(response.msg_type, 2); // ACK
        assert_eq!(response.code, 0x45);
        assert_eq!(response.message_id, 0x1234);
        assert_eq!(response.code_class(), 2);
        assert_eq!(response.code_name(), "2.05");
        assert!(response.is_success());
        assert_eq!(response.payload, Payload::Value(tree));
    }

    #[test]
    fn parse_skips_token_and_options() {
        // TKL=2 token, one option, then payload.
        let mut message = vec![0x62, 0x45, 0x00, 0x07];
        message.extend_from_slice(&[0xAA, 0xBB]); // token
        message.extend_from_slice(&[0xC1, 0x00]); // some option, len 1
        message.push(PAYLOAD_MARKER);
        ciborium::into_writer(&Value::Integer(42.into()), &mut message).unwrap();

        let response = parse_response(&message).unwrap();
        assert_eq!(response.message_id, 0x0007);
        assert_eq!(response.payload, Payload::Value(Value::Integer(42.into())));
    }

    #[test]
    fn parse_error_response_names_the_code() {
        let response = parse_response(&[0x60, 0x84, 0x00, 0x01]).unwrap();
        assert_eq!(response.code, 132);
        assert_eq!(response.code_class(), 4);
        assert_eq!(response.code_name(), "4.04");
        assert!(!response.is_success());
        assert!(response.payload.is_none());
    }

    #[test]
    fn undecodable_payload_comes_back_raw() {
        // 0xFF alone after the marker is not valid CBOR ("break" outside
        // an indefinite container).
        let message = vec![0x60, 0x45, 0x00, 0x01, PAYLOAD_MARKER, 0xFF];
        let response = parse_response(&message).unwrap();
        assert_eq!(response.payload, Payload::Raw(vec![0xFF]));
    }

    #[test]
    fn message_too_short() {
        assert!(matches!(
            parse_response(&[0x60, 0x45, 0x00]),
            Err(CoapError::MessageTooShort { len: 3 })
        ));
    }

    #[test]
    fn method_names_parse_case_insensitively() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("FETCH".parse::<Method>().unwrap(), Method::Fetch);
        assert_eq!("iPatch".parse::<Method>().unwrap(), Method::IPatch);
        assert!(matches!(
            "OBSERVE".parse::<Method>(),
            Err(CoapError::UnknownMethod(_))
        ));
    }

    #[test]
    fn request_roundtrips_through_parse() {
        // A request parses with our own response parser (same wire
        // grammar), which pins the header layout.
        let mut payload = Vec::new();
        ciborium::into_writer(&Value::Bool(true), &mut payload).unwrap();
        let message = build_request(Method::IPatch, "/c/x?d=a", Some(&payload), 0xBEEF);
        let parsed = parse_response(&message).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.msg_type, TYPE_CON);
        assert_eq!(parsed.code, Method::IPatch.code());
        assert_eq!(parsed.message_id, 0xBEEF);
        assert_eq!(parsed.payload, Payload::Value(Value::Bool(true)));
    }
}
