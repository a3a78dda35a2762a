use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::time::Instant;

use ciborium::Value;
use muplink_coap::{Payload, Response};
use rand::Rng;

use crate::error::DeviceError;

/// What a waiter receives: the response payload on code class 2, a typed
/// error otherwise.
pub(crate) type RequestOutcome = std::result::Result<Payload, DeviceError>;

/// One in-flight request.
pub(crate) struct Pending {
    pub method: &'static str,
    pub uri: String,
    pub sent_at: Instant,
    tx: SyncSender<RequestOutcome>,
}

/// Correlates CoAP responses back to their originators by message ID.
///
/// Each registered request gets a single-shot result channel; every
/// channel is consumed exactly once, by a response, a timeout, or a
/// disconnect. Message IDs increment from a random seed, wrap from
/// 0xFFFF back to 1 (0 is never issued), and skip IDs still pending.
pub(crate) struct RequestTracker {
    pending: HashMap<u16, Pending>,
    next_id: u16,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::with_initial_id(rand::thread_rng().gen())
    }

    pub fn with_initial_id(seed: u16) -> Self {
        Self {
            pending: HashMap::new(),
            next_id: if seed == 0 { 1 } else { seed },
        }
    }

    /// Allocate a message ID and record the pending entry.
    pub fn register(&mut self, method: &'static str, uri: &str) -> (u16, Receiver<RequestOutcome>) {
        let message_id = self.allocate_id();
        let (tx, rx) = mpsc::sync_channel(1);
        self.pending.insert(
            message_id,
            Pending {
                method,
                uri: uri.to_string(),
                sent_at: Instant::now(),
                tx,
            },
        );
        (message_id, rx)
    }

    fn allocate_id(&mut self) -> u16 {
        loop {
            let candidate = self.next_id;
            self.next_id = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.pending.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Settle the waiter for a parsed response. Returns false when no
    /// request with that message ID is pending.
    pub fn complete(&mut self, response: Response) -> bool {
        let Some(pending) = self.pending.remove(&response.message_id) else {
            return false;
        };
        let outcome = if response.is_success() {
            Ok(response.payload)
        } else {
            Err(DeviceError::Coap {
                code: response.code,
                code_name: response.code_name(),
                payload: error_payload(response.payload),
            })
        };
        // The waiter may have timed out and gone; that is its loss, not
        // an error here.
        let _ = pending.tx.try_send(outcome);
        true
    }

    /// Withdraw a pending entry (the timeout path). `None` means a
    /// response or disconnect settled it first.
    pub fn abort(&mut self, message_id: u16) -> Option<Pending> {
        self.pending.remove(&message_id)
    }

    /// Reject every pending waiter with `Disconnected` and clear the map.
    /// Returns how many were drained.
    pub fn fail_all(&mut self) -> usize {
        let drained = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.tx.try_send(Err(DeviceError::Disconnected));
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

fn error_payload(payload: Payload) -> Option<Value> {
    match payload {
        Payload::None => None,
        Payload::Value(value) => Some(value),
        Payload::Raw(bytes) => Some(Value::Bytes(bytes)),
    }
}
