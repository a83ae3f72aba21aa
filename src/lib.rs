//! BLE central-role client core.
//!
//! Scanning, GATT sessions, notification routing, multi-device
//! orchestration and the small binary formats spoken by common
//! peripherals.  The radio is reached only through
//! [`ble::adapter::Adapter`], so the same core runs on an embassy executor
//! on target or on a host executor (see the `host` feature binary).
//!
//! Usage: `cargo test` for the host-side suite, `cargo run --features host`
//! for the command-line scenarios.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Must come first so the logging macros are visible to every module.
#[macro_use]
mod fmt;

pub mod ble;
pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod profiles;

pub use ble::adapter::{Adapter, Link, LinkEvent, WriteKind};
pub use ble::multi_conn::{Orchestrator, Outcome, Report};
pub use ble::scanner::{filter, ScanSubscription, Scanner};
pub use ble::session::{with_session, Session};
pub use ble::{
    Address, CharProps, CharacteristicDescriptor, CharacteristicId, ConnectionState,
    DeviceDescriptor, ScanEvent, ServiceDescriptor,
};
pub use config::{DisplayGeometry, ScanConfig, SessionConfig};
pub use error::{Error, Result};
