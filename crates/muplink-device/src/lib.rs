//! Per-board connection lifecycle and the multi-device registry.
//!
//! A [`DeviceConnection`] owns everything for one serial endpoint: the
//! port handles, a MUP1 deframer fed by a dedicated reader thread, and
//! the request tracker that correlates CoAP responses back to their
//! originators by message ID. The [`DeviceRegistry`] maps serial paths to
//! connections, rescans for boards appearing and vanishing, and exposes
//! the uniform `execute` entry point the HTTP glue calls.

pub mod connection;
pub mod error;
pub mod events;
pub mod info;
pub mod registry;
mod tracker;

pub use connection::{ConnectionConfig, DeviceConnection, LinkState};
pub use error::{DeviceError, Result};
pub use events::{DeviceEvents, LogEvents, NullEvents};
pub use info::{BridgeInfo, DeviceInfo, InterfaceInfo};
pub use registry::{DeviceRegistry, RegistryConfig};
