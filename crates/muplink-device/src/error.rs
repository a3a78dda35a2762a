use ciborium::Value;

/// Errors surfaced by device connections and the registry.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Serial transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] muplink_serial::TransportError),

    /// MUP1 frame-layer failure.
    #[error("frame error: {0}")]
    Frame(#[from] muplink_mup1::FrameError),

    /// CoAP codec failure (bad method name, short message).
    #[error("coap error: {0}")]
    Codec(#[from] muplink_coap::CoapError),

    /// The device answered with a non-success code class.
    #[error("device responded {code_name} (code {code})")]
    Coap {
        code: u8,
        code_name: String,
        payload: Option<Value>,
    },

    /// No response arrived within the request timeout.
    #[error("{method} {uri} timed out after {elapsed_ms} ms")]
    RequestTimeout {
        method: &'static str,
        uri: String,
        elapsed_ms: u64,
    },

    /// A request was attempted while the connection is not open.
    #[error("connection is not open")]
    NotConnected,

    /// The serial link errored or closed; all in-flight requests fail
    /// with this.
    #[error("device disconnected")]
    Disconnected,

    /// Registry lookup miss at the execute entry point.
    #[error("no connected device at {0}")]
    DeviceNotFound(String),

    /// A connection is already registered for this path.
    #[error("device at {0} is already connected")]
    AlreadyConnected(String),

    /// I/O failure writing to the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;
