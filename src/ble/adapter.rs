//! Platform adapter interface.
//!
//! The core never touches the radio directly.  A backend (SoftDevice,
//! BlueZ via btleplug, a scripted test double) implements these traits and
//! the rest of the crate is generic over them.
//!
//! All methods take `&self`: a backend synchronizes internally, and the
//! core is free to await [`Link::next_event`] while a read or write is in
//! flight on the same link.
//!
//! Cancellation: any future returned here may be dropped before it
//! completes (connect timeout, orchestrator shutdown).  Backends must
//! release partially acquired resources when that happens, and dropping a
//! [`Link`] must tear the connection down.

#![allow(async_fn_in_trait)]

use alloc::vec::Vec;

use super::{Address, DeviceDescriptor, Handle, ServiceDescriptor};
use crate::error::AdapterError;

/// Write with or without an ATT response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

/// Asynchronous event on an established link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Notification or indication carrying a new characteristic value.
    Value { handle: Handle, value: Vec<u8> },
    /// The link is gone; no further events follow.
    Disconnected,
}

/// Scan and connect primitives of the local radio.
pub trait Adapter {
    type Link: Link;

    async fn start_scan(&self) -> Result<(), AdapterError>;

    async fn stop_scan(&self) -> Result<(), AdapterError>;

    /// Next advertisement of the active scan.  Backends that only see raw
    /// advertising data can build the descriptor with
    /// [`super::adv_parser::parse_advertisement`].
    async fn next_advertisement(&self) -> Result<DeviceDescriptor, AdapterError>;

    async fn connect(&self, address: &Address) -> Result<Self::Link, AdapterError>;
}

/// GATT primitives of one established connection.
pub trait Link {
    /// Full primary service / characteristic / descriptor discovery.
    async fn discover(&self) -> Result<Vec<ServiceDescriptor>, AdapterError>;

    async fn read(&self, handle: Handle) -> Result<Vec<u8>, AdapterError>;

    async fn read_descriptor(&self, handle: Handle) -> Result<Vec<u8>, AdapterError>;

    async fn write(&self, handle: Handle, value: &[u8], kind: WriteKind)
        -> Result<(), AdapterError>;

    /// Enable or disable notifications/indications (CCCD write).
    async fn set_notify(&self, handle: Handle, enable: bool) -> Result<(), AdapterError>;

    /// Largest value accepted by a single write (ATT MTU - 3).
    fn max_write_len(&self) -> usize;

    async fn next_event(&self) -> LinkEvent;

    async fn disconnect(&self) -> Result<(), AdapterError>;
}
