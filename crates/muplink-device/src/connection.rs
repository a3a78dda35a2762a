use std::io::{ErrorKind, Read, Write};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use muplink_coap::{build_request, parse_response, Method, Payload};
use muplink_mup1::{encode_frame, DecodedFrame, Deframer, DeframerConfig, FrameType};
use muplink_serial::SerialLink;
use tracing::{debug, error};

use crate::error::{DeviceError, Result};
use crate::events::DeviceEvents;
use crate::info::{apply_state_tree, unix_now, DeviceInfo};
use crate::tracker::RequestTracker;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// Per-connection tuning knobs.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Serial baud rate. Default: 115200.
    pub baud_rate: u32,
    /// How long a request waits for its response. Default: 15 s.
    pub request_timeout: Duration,
    /// Delay before the priming ping once the link opens. Default: 500 ms.
    pub ping_delay: Duration,
    /// Serial read timeout; doubles as the reader poll interval.
    pub read_timeout: Duration,
    /// Reader chunk size.
    pub read_chunk: usize,
    /// Deframer scratch-buffer cap.
    pub deframer: DeframerConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            baud_rate: muplink_serial::DEFAULT_BAUD_RATE,
            request_timeout: Duration::from_millis(15_000),
            ping_delay: Duration::from_millis(500),
            read_timeout: Duration::from_millis(50),
            read_chunk: 256,
            deframer: DeframerConfig::default(),
        }
    }
}

/// One serial endpoint: port handles, deframer, and request tracker.
///
/// A dedicated reader thread feeds inbound bytes through the deframer and
/// dispatches frames by type; CoAP responses settle their waiters through
/// the tracker. The writer half lives behind its own mutex, so outbound
/// frames hit the wire in the order `request` is called. Responses may
/// complete out of request order — correlation is by message ID only.
pub struct DeviceConnection {
    path: String,
    config: ConnectionConfig,
    state: Mutex<LinkState>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    tracker: Mutex<RequestTracker>,
    info: Mutex<DeviceInfo>,
    events: Arc<dyn DeviceEvents>,
    closing: AtomicBool,
}

/// Locks are only ever held for short, non-panicking sections; if one was
/// poisoned anyway, the data is still the best we have.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceConnection {
    /// Open a serial device and bring the connection to `Open`.
    pub fn open_serial(
        path: impl AsRef<Path>,
        config: ConnectionConfig,
        events: Arc<dyn DeviceEvents>,
    ) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let link = SerialLink::open(path, config.baud_rate, config.read_timeout)?;
        let reader = link.try_clone()?;
        Ok(Self::from_parts(
            path.display().to_string(),
            reader,
            link,
            config,
            events,
        ))
    }

    /// Build a connection over any byte stream.
    ///
    /// This is the seam for loopback tests and emulated endpoints: the
    /// reader half feeds the deframer exactly as a serial port would.
    pub fn from_parts(
        path: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: ConnectionConfig,
        events: Arc<dyn DeviceEvents>,
    ) -> Arc<Self> {
        let path = path.into();
        let conn = Arc::new(Self {
            info: Mutex::new(DeviceInfo {
                path: path.clone(),
                baud_rate: config.baud_rate,
                ..DeviceInfo::default()
            }),
            path,
            state: Mutex::new(LinkState::Opening),
            writer: Mutex::new(Some(Box::new(writer))),
            tracker: Mutex::new(RequestTracker::new()),
            events,
            closing: AtomicBool::new(false),
            config,
        });

        let weak = Arc::downgrade(&conn);
        let reader_config = conn.config.clone();
        std::thread::Builder::new()
            .name(format!("muplink-read {}", conn.path))
            .spawn(move || reader_loop(weak, reader, reader_config))
            .expect("spawning reader thread");

        // Prime the link with a ping shortly after opening.
        let weak = Arc::downgrade(&conn);
        let ping_delay = conn.config.ping_delay;
        std::thread::Builder::new()
            .name(format!("muplink-ping {}", conn.path))
            .spawn(move || {
                std::thread::sleep(ping_delay);
                if let Some(conn) = weak.upgrade() {
                    let _ = conn.send_ping();
                }
            })
            .expect("spawning ping thread");

        *lock(&conn.state) = LinkState::Open;
        debug!(path = %conn.path, "connection open");
        conn
    }

    /// The serial path (or loopback label) this connection serves.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> LinkState {
        *lock(&self.state)
    }

    /// Snapshot of the device info record.
    pub fn info(&self) -> DeviceInfo {
        let mut info = lock(&self.info).clone();
        info.connected = self.state() == LinkState::Open;
        info
    }

    /// Number of in-flight requests. Exposed for diagnostics.
    pub fn pending_requests(&self) -> usize {
        lock(&self.tracker).len()
    }

    /// Issue a request with the configured timeout.
    pub fn request(&self, method: Method, uri: &str, payload: Option<&[u8]>) -> Result<Payload> {
        self.request_with_timeout(method, uri, payload, self.config.request_timeout)
    }

    /// Issue a request and wait for the matching response.
    ///
    /// Fails fast with `NotConnected` outside `Open`. The waiter settles
    /// exactly once: with the response payload, with a `Coap` error for a
    /// non-2.xx code, with `RequestTimeout`, or with `Disconnected`.
    pub fn request_with_timeout(
        &self,
        method: Method,
        uri: &str,
        payload: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Payload> {
        if self.state() != LinkState::Open {
            return Err(DeviceError::NotConnected);
        }

        let (message_id, rx) = lock(&self.tracker).register(method.name(), uri);
        let message = build_request(method, uri, payload, message_id);
        let frame = encode_frame(FrameType::Coap, &message);
        if let Err(err) = self.write_bytes(&frame) {
            lock(&self.tracker).abort(message_id);
            return Err(err);
        }

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                // Withdraw our own entry; losing that race means the
                // outcome is already in the channel.
                let withdrawn = lock(&self.tracker).abort(message_id);
                match withdrawn {
                    Some(pending) => Err(DeviceError::RequestTimeout {
                        method: pending.method,
                        uri: pending.uri,
                        elapsed_ms: pending.sent_at.elapsed().as_millis() as u64,
                    }),
                    None => rx
                        .try_recv()
                        .unwrap_or(Err(DeviceError::Disconnected)),
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(DeviceError::Disconnected),
        }
    }

    /// Write an empty ping frame.
    pub fn send_ping(&self) -> Result<()> {
        self.write_bytes(&encode_frame(FrameType::Ping, b""))
    }

    /// `GET /c?d=a` and fold the returned state tree into the info
    /// record. Missing keys leave existing values unchanged.
    pub fn query_device_info(&self) -> Result<DeviceInfo> {
        let payload = self.request(Method::Get, "/c?d=a", None)?;
        let mut info = lock(&self.info);
        info.last_seen = Some(unix_now());
        if let Payload::Value(tree) = &payload {
            apply_state_tree(&mut info, tree);
        }
        let mut snapshot = info.clone();
        snapshot.connected = true;
        Ok(snapshot)
    }

    /// Close the link and reject every in-flight request.
    pub fn disconnect(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, LinkState::Closed | LinkState::Closing) {
                return;
            }
            *state = LinkState::Closing;
        }
        self.closing.store(true, Ordering::SeqCst);
        self.finalize();
        debug!(path = %self.path, "connection closed");
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = lock(&self.writer);
        let Some(writer) = guard.as_mut() else {
            return Err(DeviceError::NotConnected);
        };
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Terminal cleanup; safe to call more than once.
    fn finalize(&self) {
        *lock(&self.state) = LinkState::Closed;
        *lock(&self.writer) = None;
        let drained = lock(&self.tracker).fail_all();
        if drained > 0 {
            debug!(path = %self.path, drained, "rejected in-flight requests");
        }
    }

    fn dispatch(&self, frame: DecodedFrame) {
        match frame.frame_type {
            FrameType::Coap => match parse_response(&frame.payload) {
                Ok(response) => {
                    self.events
                        .coap_response(&self.path, response.message_id, response.code);
                    let message_id = response.message_id;
                    let matched = lock(&self.tracker).complete(response);
                    if !matched {
                        self.events.unmatched_response(&self.path, message_id);
                    }
                }
                Err(err) => self.events.coap_malformed(&self.path, &err),
            },
            FrameType::Announcement => self
                .events
                .announcement(&self.path, &String::from_utf8_lossy(&frame.payload)),
            FrameType::Trace => self
                .events
                .trace(&self.path, &String::from_utf8_lossy(&frame.payload)),
            FrameType::Ping => self.events.pong(&self.path),
            FrameType::System => self.events.system(&self.path, &frame.payload),
        }
    }
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("path", &self.path)
            .field("state", &self.state())
            .finish()
    }
}

/// The reader thread: pull chunks, deframe, dispatch.
///
/// Holds only a weak reference so dropping the last external handle ends
/// the thread at its next poll tick. A read timeout is "no data yet";
/// EOF or a real I/O error closes the connection and drains its waiters.
/// A panic in the dispatch path is confined to the offending frame.
fn reader_loop(conn: Weak<DeviceConnection>, mut reader: impl Read, config: ConnectionConfig) {
    let mut deframer = Deframer::with_config(config.deframer);
    let mut chunk = vec![0u8; config.read_chunk];
    loop {
        let Some(conn) = conn.upgrade() else {
            return;
        };
        if conn.closing.load(Ordering::SeqCst) {
            return;
        }
        match reader.read(&mut chunk) {
            Ok(0) => {
                debug!(path = %conn.path, "serial link closed by peer");
                conn.finalize();
                return;
            }
            Ok(n) => {
                for result in deframer.feed(&chunk[..n]) {
                    match result {
                        Ok(frame) => {
                            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                                conn.dispatch(frame);
                            }));
                            if outcome.is_err() {
                                error!(path = %conn.path, "dispatch panicked; frame discarded");
                            }
                        }
                        Err(err) => conn.events.frame_dropped(&conn.path, &err),
                    }
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                // Poll tick; loop around to re-check the closing flag.
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                debug!(path = %conn.path, %err, "serial read failed");
                conn.finalize();
                return;
            }
        }
    }
}
