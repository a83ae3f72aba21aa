//! Scripted adapter for integration tests.
//!
//! Advertisements and link events are queued by the test and pulled by
//! the core; every primitive the core issues is recorded so tests can
//! assert on the full call history without a radio.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use blecentral::ble::adapter::{Adapter, Link, LinkEvent, WriteKind};
use blecentral::ble::{uuids, Handle};
use blecentral::error::AdapterError;
use blecentral::{Address, CharProps, CharacteristicDescriptor, DeviceDescriptor, ServiceDescriptor};
use embassy_time::{Duration, Timer};

/// Idle poll interval for scripted queues.
const POLL: Duration = Duration::from_millis(2);

// ── Call record ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    StartScan,
    StopScan,
    Connect(Address),
    Discover(Address),
    Read(Address, Handle),
    ReadDescriptor(Address, Handle),
    Write {
        address: Address,
        handle: Handle,
        value: Vec<u8>,
        kind: WriteKind,
    },
    SetNotify {
        address: Address,
        handle: Handle,
        enable: bool,
    },
    Disconnect(Address),
}

// ── Peer scripts ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ConnectBehaviour {
    Accept,
    /// Never answers the connect primitive.
    Hang,
    Reject(AdapterError),
    /// Connects, then never finishes discovery.
    HangDiscovery,
}

#[derive(Debug, Clone)]
pub struct Peer {
    pub connect: ConnectBehaviour,
    pub services: Vec<ServiceDescriptor>,
    pub values: BTreeMap<Handle, Vec<u8>>,
    /// Writes after this many successful ones fail.
    pub write_budget: Option<usize>,
    /// This many disconnect requests never complete.
    pub disconnect_stalls: usize,
}

impl Peer {
    pub fn new(services: Vec<ServiceDescriptor>) -> Self {
        Self {
            connect: ConnectBehaviour::Accept,
            services,
            values: BTreeMap::new(),
            write_budget: None,
            disconnect_stalls: 0,
        }
    }

    pub fn behaving(mut self, connect: ConnectBehaviour) -> Self {
        self.connect = connect;
        self
    }

    pub fn with_value(mut self, handle: Handle, value: &[u8]) -> Self {
        self.values.insert(handle, value.to_vec());
        self
    }

    pub fn failing_after(mut self, writes: usize) -> Self {
        self.write_budget = Some(writes);
        self
    }

    pub fn stalling_disconnects(mut self, count: usize) -> Self {
        self.disconnect_stalls = count;
        self
    }
}

// Handles of the sensor profile below.
pub const TELEMETRY_HANDLE: Handle = 3;
pub const TELEMETRY_CCCD: Handle = 4;
pub const HEART_RATE_HANDLE: Handle = 5;
pub const DEVICE_NAME_HANDLE: Handle = 7;
pub const BADGE_HANDLE: Handle = 9;
pub const BLINK_HANDLE: Handle = 10;
pub const IMMEDIATE_ALERT_HANDLE: Handle = 12;
pub const LINK_LOSS_ALERT_HANDLE: Handle = 14;

/// A peripheral exposing every characteristic the profiles use.
pub fn sensor_profile() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::new(uuids::from_u16(0x181A), 1)
            .with_characteristic(
                CharacteristicDescriptor::new(
                    uuids::BME280_SENSOR,
                    TELEMETRY_HANDLE,
                    CharProps::READ | CharProps::INDICATE,
                )
                .with_descriptor(uuids::CLIENT_CHARACTERISTIC_CONFIGURATION, TELEMETRY_CCCD),
            )
            .with_characteristic(CharacteristicDescriptor::new(
                uuids::HEART_RATE_MEASUREMENT,
                HEART_RATE_HANDLE,
                CharProps::NOTIFY,
            )),
        ServiceDescriptor::new(uuids::GENERIC_ACCESS, 6)
            .with_characteristic(CharacteristicDescriptor::new(
                uuids::DEVICE_NAME,
                DEVICE_NAME_HANDLE,
                CharProps::READ,
            )),
        ServiceDescriptor::new(uuids::from_u16(0xFEE0), 8)
            .with_characteristic(CharacteristicDescriptor::new(
                uuids::LED_BADGE_WRITE,
                BADGE_HANDLE,
                CharProps::WRITE,
            ))
            .with_characteristic(CharacteristicDescriptor::new(
                uuids::DEVICE_MODE_CHANGE,
                BLINK_HANDLE,
                CharProps::WRITE_WITHOUT_RESPONSE,
            )),
        ServiceDescriptor::new(uuids::ALERT_LEVEL_SERVICE, 11).with_characteristic(
            CharacteristicDescriptor::new(
                uuids::ALERT_LEVEL,
                IMMEDIATE_ALERT_HANDLE,
                CharProps::READ | CharProps::WRITE_WITHOUT_RESPONSE,
            ),
        ),
        ServiceDescriptor::new(uuids::LINK_LOSS, 13).with_characteristic(
            CharacteristicDescriptor::new(
                uuids::ALERT_LEVEL,
                LINK_LOSS_ALERT_HANDLE,
                CharProps::READ | CharProps::WRITE,
            ),
        ),
    ]
}

// ── MockAdapter ──────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    calls: Vec<Call>,
    adverts: VecDeque<Result<DeviceDescriptor, AdapterError>>,
    peers: BTreeMap<Address, Peer>,
    events: BTreeMap<Address, VecDeque<LinkEvent>>,
    max_write_len: usize,
}

pub struct MockAdapter {
    shared: Rc<RefCell<Shared>>,
}

#[allow(dead_code)]
impl MockAdapter {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(RefCell::new(Shared {
                max_write_len: 20,
                ..Shared::default()
            })),
        }
    }

    pub fn with_peer(self, address: Address, peer: Peer) -> Self {
        self.shared.borrow_mut().peers.insert(address, peer);
        self
    }

    pub fn with_max_write_len(self, len: usize) -> Self {
        self.shared.borrow_mut().max_write_len = len;
        self
    }

    pub fn advertise(&self, device: DeviceDescriptor) {
        self.shared.borrow_mut().adverts.push_back(Ok(device));
    }

    pub fn fail_scan(&self, error: AdapterError) {
        self.shared.borrow_mut().adverts.push_back(Err(error));
    }

    pub fn notify(&self, address: Address, handle: Handle, value: &[u8]) {
        self.shared
            .borrow_mut()
            .events
            .entry(address)
            .or_default()
            .push_back(LinkEvent::Value {
                handle,
                value: value.to_vec(),
            });
    }

    pub fn drop_link(&self, address: Address) {
        self.shared
            .borrow_mut()
            .events
            .entry(address)
            .or_default()
            .push_back(LinkEvent::Disconnected);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.borrow().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.shared.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn writes(&self, address: Address) -> Vec<Vec<u8>> {
        self.shared
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Write { address: a, value, .. } if *a == address => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.shared.borrow_mut().calls.push(call);
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for MockAdapter {
    type Link = MockLink;

    async fn start_scan(&self) -> Result<(), AdapterError> {
        self.record(Call::StartScan);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.record(Call::StopScan);
        Ok(())
    }

    async fn next_advertisement(&self) -> Result<DeviceDescriptor, AdapterError> {
        loop {
            if let Some(next) = self.shared.borrow_mut().adverts.pop_front() {
                return next;
            }
            Timer::after(POLL).await;
        }
    }

    async fn connect(&self, address: &Address) -> Result<MockLink, AdapterError> {
        self.record(Call::Connect(*address));
        let peer = self.shared.borrow().peers.get(address).cloned();
        let Some(peer) = peer else {
            return Err(AdapterError::Backend("unknown peer".into()));
        };
        match peer.connect {
            ConnectBehaviour::Hang => core::future::pending().await,
            ConnectBehaviour::Reject(e) => Err(e),
            ConnectBehaviour::Accept | ConnectBehaviour::HangDiscovery => Ok(MockLink {
                address: *address,
                peer: RefCell::new(peer),
                shared: self.shared.clone(),
            }),
        }
    }
}

// ── MockLink ─────────────────────────────────────────────────

pub struct MockLink {
    address: Address,
    peer: RefCell<Peer>,
    shared: Rc<RefCell<Shared>>,
}

impl MockLink {
    fn record(&self, call: Call) {
        self.shared.borrow_mut().calls.push(call);
    }
}

impl Link for MockLink {
    async fn discover(&self) -> Result<Vec<ServiceDescriptor>, AdapterError> {
        self.record(Call::Discover(self.address));
        if let ConnectBehaviour::HangDiscovery = self.peer.borrow().connect {
            return core::future::pending().await;
        }
        Ok(self.peer.borrow().services.clone())
    }

    async fn read(&self, handle: Handle) -> Result<Vec<u8>, AdapterError> {
        self.record(Call::Read(self.address, handle));
        self.peer
            .borrow()
            .values
            .get(&handle)
            .cloned()
            .ok_or(AdapterError::Att(0x0A))
    }

    async fn read_descriptor(&self, handle: Handle) -> Result<Vec<u8>, AdapterError> {
        self.record(Call::ReadDescriptor(self.address, handle));
        Ok(self.peer.borrow().values.get(&handle).cloned().unwrap_or_default())
    }

    async fn write(&self, handle: Handle, value: &[u8], kind: WriteKind) -> Result<(), AdapterError> {
        let mut peer = self.peer.borrow_mut();
        if let Some(budget) = peer.write_budget.as_mut() {
            if *budget == 0 {
                return Err(AdapterError::Att(0x13));
            }
            *budget -= 1;
        }
        peer.values.insert(handle, value.to_vec());
        drop(peer);
        self.record(Call::Write {
            address: self.address,
            handle,
            value: value.to_vec(),
            kind,
        });
        Ok(())
    }

    async fn set_notify(&self, handle: Handle, enable: bool) -> Result<(), AdapterError> {
        self.record(Call::SetNotify {
            address: self.address,
            handle,
            enable,
        });
        Ok(())
    }

    fn max_write_len(&self) -> usize {
        self.shared.borrow().max_write_len
    }

    async fn next_event(&self) -> LinkEvent {
        loop {
            let next = self
                .shared
                .borrow_mut()
                .events
                .get_mut(&self.address)
                .and_then(VecDeque::pop_front);
            if let Some(event) = next {
                return event;
            }
            Timer::after(POLL).await;
        }
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.record(Call::Disconnect(self.address));
        // Counted on the scripted peer, across links.
        let stall = match self.shared.borrow_mut().peers.get_mut(&self.address) {
            Some(peer) if peer.disconnect_stalls > 0 => {
                peer.disconnect_stalls -= 1;
                true
            }
            _ => false,
        };
        if stall {
            core::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Address `n` as `00:00:00:00:00:nn`.
pub fn addr(n: u8) -> Address {
    Address::Mac([0, 0, 0, 0, 0, n])
}
