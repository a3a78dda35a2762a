/// Errors that can occur building or parsing CoAP messages.
#[derive(Debug, thiserror::Error)]
pub enum CoapError {
    /// Fewer bytes than the fixed 4-byte CoAP header.
    #[error("CoAP message too short ({len} bytes, minimum 4)")]
    MessageTooShort { len: usize },

    /// The request method name is not one this stack supports.
    #[error("unknown CoAP method: {0}")]
    UnknownMethod(String),
}

pub type Result<T> = std::result::Result<T, CoapError>;
