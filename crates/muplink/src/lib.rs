//! Serial CORECONF stack for Microchip VelocityDRIVE switches.
//!
//! muplink layers three protocols over a board's management UART: MUP1
//! framing, CoAP (RFC 7252), and CORECONF/CBOR (RFC 9254) — and manages
//! the lifecycle of many boards at once.
//!
//! # Crate Structure
//!
//! - [`serial`] — Serial transport and endpoint enumeration
//! - [`mup1`] — MUP1 frame codec and stream deframer
//! - [`coap`] — CoAP request builder / response parser
//! - [`device`] — Per-board connections, request tracking, the registry

/// Re-export serial transport types.
pub mod serial {
    pub use muplink_serial::*;
}

/// Re-export MUP1 framing types.
pub mod mup1 {
    pub use muplink_mup1::*;
}

/// Re-export CoAP codec types.
pub mod coap {
    pub use muplink_coap::*;
}

/// Re-export device lifecycle types.
pub mod device {
    pub use muplink_device::*;
}
