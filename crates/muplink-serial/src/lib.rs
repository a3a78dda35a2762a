//! Serial transport for VelocityDRIVE management links.
//!
//! This is the lowest layer of muplink. [`SerialLink`] opens a board's
//! UART at 115200 8N1 with no flow control and hands out a second handle
//! for a dedicated reader thread. [`EndpointEnumerator`] is the pluggable
//! discovery seam the device registry scans through.

pub mod enumerate;
pub mod error;
pub mod link;

pub use enumerate::{DevEnumerator, EndpointEnumerator, StaticEnumerator};
pub use error::{Result, TransportError};
pub use link::{SerialLink, DEFAULT_BAUD_RATE};
