use std::path::PathBuf;

/// Errors that can occur in serial transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    /// Failed to clone the port handle for the reader thread.
    #[error("failed to clone handle for {path}: {source}")]
    Clone {
        path: PathBuf,
        source: serialport::Error,
    },

    /// Failed to list candidate serial endpoints.
    #[error("failed to enumerate {dir}: {source}")]
    Enumerate {
        dir: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on an open link.
    #[error("serial I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
