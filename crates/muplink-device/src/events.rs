use muplink_coap::CoapError;
use muplink_mup1::FrameError;
use tracing::{debug, info, trace, warn};

/// Observable side channels of a device connection.
///
/// The core never prints; everything a connection has to say — dropped
/// frames, device announcements, trace output, response arrivals — goes
/// through this sink. Methods default to no-ops so a sink implements only
/// what it cares about.
pub trait DeviceEvents: Send + Sync {
    /// A frame failed to decode or failed its checksum and was dropped.
    fn frame_dropped(&self, path: &str, error: &FrameError) {
        let _ = (path, error);
    }

    /// A `C` frame arrived but its CoAP envelope did not parse.
    fn coap_malformed(&self, path: &str, error: &CoapError) {
        let _ = (path, error);
    }

    /// An `A` (announcement) frame arrived.
    fn announcement(&self, path: &str, text: &str) {
        let _ = (path, text);
    }

    /// A `T` (trace) frame arrived.
    fn trace(&self, path: &str, text: &str) {
        let _ = (path, text);
    }

    /// A `P` frame arrived — the board answered a ping.
    fn pong(&self, path: &str) {
        let _ = path;
    }

    /// An `S` (system) frame arrived.
    fn system(&self, path: &str, payload: &[u8]) {
        let _ = (path, payload);
    }

    /// A CoAP response arrived (matched or not).
    fn coap_response(&self, path: &str, message_id: u16, code: u8) {
        let _ = (path, message_id, code);
    }

    /// A CoAP response arrived for a message ID with no pending request.
    fn unmatched_response(&self, path: &str, message_id: u16) {
        let _ = (path, message_id);
    }
}

/// Default sink: structured logging via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEvents;

impl DeviceEvents for LogEvents {
    fn frame_dropped(&self, path: &str, error: &FrameError) {
        warn!(path, %error, "dropped frame");
    }

    fn coap_malformed(&self, path: &str, error: &CoapError) {
        warn!(path, %error, "unparseable CoAP frame");
    }

    fn announcement(&self, path: &str, text: &str) {
        info!(path, text, "device announcement");
    }

    fn trace(&self, path: &str, text: &str) {
        debug!(path, text, "device trace");
    }

    fn pong(&self, path: &str) {
        debug!(path, "pong");
    }

    fn system(&self, path: &str, payload: &[u8]) {
        debug!(path, len = payload.len(), "system frame");
    }

    fn coap_response(&self, path: &str, message_id: u16, code: u8) {
        trace!(path, message_id, code, "coap response");
    }

    fn unmatched_response(&self, path: &str, message_id: u16) {
        warn!(path, message_id, "response matches no pending request");
    }
}

/// A sink that discards everything. Useful in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEvents;

impl DeviceEvents for NullEvents {}
