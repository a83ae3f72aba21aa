//! Bluetooth Low Energy central-role core.
//!
//! 1. **Scanner** - drives the adapter's scan primitive and fans
//!    advertisements out to filtered subscribers.
//! 2. **Session** - one GATT connection: connect with timeout, discovery,
//!    read/write, notification subscription.
//! 3. **Dispatcher** - routes value-change events to per-characteristic
//!    subscriptions.
//! 4. **Multi-connection orchestrator** - runs many session lifecycles
//!    concurrently with per-device failure isolation.
//!
//! The platform radio is reached only through the [`adapter::Adapter`] and
//! [`adapter::Link`] traits.

pub mod adapter;
pub mod adv_parser;
pub mod dispatcher;
pub mod multi_conn;
pub mod queue;
pub mod scanner;
pub mod session;
pub mod uuids;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::fmt;
use core::str::FromStr;

use heapless::String;
use uuid::Uuid;

use crate::config::MAX_NAME_LEN;

/// Stable peer identifier: a 6-byte MAC or a platform-assigned UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Address {
    /// Most significant byte first, as printed.
    Mac([u8; 6]),
    Uuid(Uuid),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Mac(b) => write!(
                f,
                "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
                b[0], b[1], b[2], b[3], b[4], b[5]
            ),
            Address::Uuid(u) => write!(f, "{}", u.hyphenated()),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Address {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Address::Mac(b) => defmt::write!(f, "{=[u8]:X}", &b[..]),
            Address::Uuid(u) => defmt::write!(f, "{=[u8]:x}", &u.as_bytes()[..]),
        }
    }
}

/// Returned when a string is neither `AA:BB:CC:DD:EE:FF` nor a UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidAddress;

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected AA:BB:CC:DD:EE:FF or a UUID")
    }
}

impl core::error::Error for InvalidAddress {}

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(uuid) = Uuid::try_parse(s) {
            return Ok(Address::Uuid(uuid));
        }
        let mut mac = [0u8; 6];
        let mut parts = s.split(|c: char| c == ':' || c == '-');
        for byte in mac.iter_mut() {
            let part = parts.next().ok_or(InvalidAddress)?;
            if part.len() != 2 {
                return Err(InvalidAddress);
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| InvalidAddress)?;
        }
        if parts.next().is_some() {
            return Err(InvalidAddress);
        }
        Ok(Address::Mac(mac))
    }
}

/// Immutable snapshot of one advertisement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub address: Address,
    /// Advertised local name (truncated to `MAX_NAME_LEN` bytes).
    pub name: Option<String<MAX_NAME_LEN>>,
    /// Received Signal Strength Indicator (dBm).
    pub rssi: i16,
    /// Company identifier -> payload.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Service UUID -> payload.
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
}

impl DeviceDescriptor {
    pub fn new(address: Address, rssi: i16) -> Self {
        Self {
            address,
            name: None,
            rssi,
            manufacturer_data: BTreeMap::new(),
            service_data: BTreeMap::new(),
        }
    }

    /// Builder-style name setter; truncates at a character boundary.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(truncated_name(name));
        self
    }

    pub fn with_manufacturer_data(mut self, company: u16, data: &[u8]) -> Self {
        self.manufacturer_data.insert(company, data.to_vec());
        self
    }

    pub fn with_service_data(mut self, service: Uuid, data: &[u8]) -> Self {
        self.service_data.insert(service, data.to_vec());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|n| n.as_str())
    }

    pub fn manufacturer(&self, company: u16) -> Option<&[u8]> {
        self.manufacturer_data.get(&company).map(Vec::as_slice)
    }

    pub fn service(&self, service: &Uuid) -> Option<&[u8]> {
        self.service_data.get(service).map(Vec::as_slice)
    }

    /// True when everything but the signal strength matches.
    pub fn same_content(&self, other: &DeviceDescriptor) -> bool {
        self.address == other.address
            && self.name == other.name
            && self.manufacturer_data == other.manufacturer_data
            && self.service_data == other.service_data
    }
}

/// One line: address, name, RSSI, then any manufacturer and service data
/// in hex.
impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} dBm", self.address, self.name().unwrap_or("(unnamed)"), self.rssi)?;
        for (company, data) in &self.manufacturer_data {
            write!(f, " mfr[{company:04X}]=0x{}", hex::encode(data))?;
        }
        for (service, data) in &self.service_data {
            write!(f, " svc[{service}]=0x{}", hex::encode(data))?;
        }
        Ok(())
    }
}

pub(crate) fn truncated_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// One advertisement as delivered to scan subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanEvent {
    pub device: DeviceDescriptor,
    pub observed_at: embassy_time::Instant,
}

/// Connection-scoped attribute handle.
pub type Handle = u16;

/// Characteristic capability flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharProps(u8);

impl CharProps {
    pub const READ: CharProps = CharProps(0x02);
    pub const WRITE_WITHOUT_RESPONSE: CharProps = CharProps(0x04);
    pub const WRITE: CharProps = CharProps(0x08);
    pub const NOTIFY: CharProps = CharProps(0x10);
    pub const INDICATE: CharProps = CharProps(0x20);

    pub const fn empty() -> Self {
        CharProps(0)
    }

    /// From the GATT characteristic-declaration properties byte.
    pub const fn from_bits(bits: u8) -> Self {
        CharProps(bits & 0x3E)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: CharProps) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: CharProps) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: CharProps) -> Self {
        CharProps(self.0 | other.0)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        [
            (CharProps::READ, "read"),
            (CharProps::WRITE_WITHOUT_RESPONSE, "write-without-response"),
            (CharProps::WRITE, "write"),
            (CharProps::NOTIFY, "notify"),
            (CharProps::INDICATE, "indicate"),
        ]
        .into_iter()
        .filter(move |(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
    }
}

impl core::ops::BitOr for CharProps {
    type Output = CharProps;

    fn bitor(self, rhs: CharProps) -> CharProps {
        self.union(rhs)
    }
}

/// A characteristic descriptor (e.g. CCCD, user description).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub uuid: Uuid,
    pub handle: Handle,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub handle: Handle,
    pub props: CharProps,
    pub descriptors: Vec<DescriptorInfo>,
}

impl CharacteristicDescriptor {
    pub fn new(uuid: Uuid, handle: Handle, props: CharProps) -> Self {
        Self {
            uuid,
            handle,
            props,
            descriptors: Vec::new(),
        }
    }

    pub fn with_descriptor(mut self, uuid: Uuid, handle: Handle) -> Self {
        self.descriptors.push(DescriptorInfo { uuid, handle });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub handle: Handle,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    pub fn new(uuid: Uuid, handle: Handle) -> Self {
        Self {
            uuid,
            handle,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: CharacteristicDescriptor) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn characteristic(&self, uuid: &Uuid) -> Option<&CharacteristicDescriptor> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

/// How a characteristic is addressed by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharacteristicId {
    /// First characteristic with this UUID, in discovery order.
    Uuid(Uuid),
    Handle(Handle),
}

impl From<Uuid> for CharacteristicId {
    fn from(uuid: Uuid) -> Self {
        CharacteristicId::Uuid(uuid)
    }
}

impl From<Handle> for CharacteristicId {
    fn from(handle: Handle) -> Self {
        CharacteristicId::Handle(handle)
    }
}

/// Lifecycle of a [`session::Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Discovering,
    Ready,
    Disconnecting,
}
