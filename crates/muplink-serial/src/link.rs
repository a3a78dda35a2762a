use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::{Result, TransportError};

/// The baud rate VelocityDRIVE boards run their management UART at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// An open serial link: 8 data bits, no parity, 1 stop bit, no flow
/// control, binary transparent.
///
/// The read timeout doubles as the reader thread's poll interval — a
/// timed-out read is "no data yet", not an error.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    path: PathBuf,
    baud_rate: u32,
}

impl SerialLink {
    /// Open a serial device.
    pub fn open(path: impl AsRef<Path>, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let port = serialport::new(path.to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;
        debug!(?path, baud_rate, "opened serial link");
        Ok(Self {
            port,
            path,
            baud_rate,
        })
    }

    /// Clone the underlying handle, typically for a dedicated reader
    /// thread while the original stays with the writer.
    pub fn try_clone(&self) -> Result<Self> {
        let port = self
            .port
            .try_clone()
            .map_err(|source| TransportError::Clone {
                path: self.path.clone(),
                source,
            })?;
        Ok(Self {
            port,
            path: self.path.clone(),
            baud_rate: self.baud_rate,
        })
    }

    /// The device path this link was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush()
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}
