//! btleplug backend for the host binary (BlueZ, CoreBluetooth, WinRT).
//!
//! btleplug has no notion of attribute handles, so handles are assigned
//! in discovery order: service, its characteristics, each followed by its
//! descriptors.  They are stable for the life of one link only.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Descriptor, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter as PlatformAdapter, Manager, Peripheral};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{Stream, StreamExt};
use tokio::sync::Mutex;

use blecentral::ble::adapter::{Adapter, Link, LinkEvent, WriteKind};
use blecentral::ble::{
    Address, CharProps, CharacteristicDescriptor, DeviceDescriptor, Handle, ServiceDescriptor,
};
use blecentral::error::AdapterError;

type EventStream = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;
type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// ATT maximum attribute value length; btleplug does not expose the MTU.
const MAX_WRITE_LEN: usize = 512;

/// Poll interval while waiting for a not yet seen peripheral.
const LOOKUP_INTERVAL: Duration = Duration::from_millis(250);

fn backend(e: btleplug::Error) -> AdapterError {
    match e {
        btleplug::Error::NotConnected => AdapterError::Disconnected,
        btleplug::Error::PermissionDenied => AdapterError::Unavailable,
        btleplug::Error::TimedOut(_) => AdapterError::Timeout,
        other => AdapterError::Backend(other.to_string()),
    }
}

fn address_of(peripheral: &Peripheral) -> Address {
    let mac = peripheral.address().into_inner();
    if mac != [0; 6] {
        return Address::Mac(mac);
    }
    // CoreBluetooth hides the MAC and identifies peers by UUID.
    peripheral
        .id()
        .to_string()
        .parse()
        .unwrap_or(Address::Mac(mac))
}

/// Spawns its release future on the runtime when dropped armed.  Covers
/// connects dropped half-way (timeout, shutdown) and links dropped without
/// `disconnect`.
struct ReleaseOnDrop(Option<BoxFuture<'static, ()>>);

impl ReleaseOnDrop {
    fn disconnect(peripheral: Peripheral) -> Self {
        Self(Some(
            async move {
                let _ = peripheral.disconnect().await;
            }
            .boxed(),
        ))
    }

    fn stop_scan(central: PlatformAdapter) -> Self {
        Self(Some(
            async move {
                let _ = central.stop_scan().await;
            }
            .boxed(),
        ))
    }

    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Some(release) = self.0.take() else {
            return;
        };
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            rt.spawn(release);
        }
    }
}

pub struct BtleplugAdapter {
    central: PlatformAdapter,
    scanning: Cell<bool>,
    events: Mutex<Option<EventStream>>,
}

impl BtleplugAdapter {
    /// The first adapter reported by the platform.
    pub async fn first() -> Result<Self, AdapterError> {
        let manager = Manager::new().await.map_err(backend)?;
        let central = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(AdapterError::Unavailable)?;
        Ok(Self {
            central,
            scanning: Cell::new(false),
            events: Mutex::new(None),
        })
    }

    async fn describe(&self, peripheral: &Peripheral) -> Option<DeviceDescriptor> {
        let props = peripheral.properties().await.ok()??;
        let mut device = DeviceDescriptor::new(address_of(peripheral), props.rssi.unwrap_or_default());
        if let Some(name) = props.local_name.as_deref() {
            device = device.with_name(name);
        }
        device.manufacturer_data = props.manufacturer_data.into_iter().collect();
        device.service_data = props.service_data.into_iter().collect();
        Some(device)
    }

    /// Peripheral known to the platform under `address`, scanning for it
    /// if needed.  Bounded by the caller's connect timeout; a scan started
    /// here is stopped however the lookup ends.
    async fn lookup(&self, address: &Address) -> Result<Peripheral, AdapterError> {
        let mut scan: Option<ReleaseOnDrop> = None;
        loop {
            let peripherals = self.central.peripherals().await.map_err(backend)?;
            if let Some(p) = peripherals.into_iter().find(|p| address_of(p) == *address) {
                if let Some(mut scan) = scan.take() {
                    scan.disarm();
                    let _ = self.central.stop_scan().await;
                }
                return Ok(p);
            }
            if scan.is_none() && !self.scanning.get() {
                log::debug!("{address}: not seen yet, scanning");
                self.central
                    .start_scan(ScanFilter::default())
                    .await
                    .map_err(backend)?;
                scan = Some(ReleaseOnDrop::stop_scan(self.central.clone()));
            }
            tokio::time::sleep(LOOKUP_INTERVAL).await;
        }
    }
}

impl Adapter for BtleplugAdapter {
    type Link = BtleplugLink;

    async fn start_scan(&self) -> Result<(), AdapterError> {
        // A locked stream already exists; it outlives scan sessions.
        if let Ok(mut events) = self.events.try_lock() {
            if events.is_none() {
                *events = Some(self.central.events().await.map_err(backend)?);
            }
        }
        self.central
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)?;
        self.scanning.set(true);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.scanning.set(false);
        self.central.stop_scan().await.map_err(backend)
    }

    async fn next_advertisement(&self) -> Result<DeviceDescriptor, AdapterError> {
        let mut events = self.events.lock().await;
        let events = events.as_mut().ok_or(AdapterError::ScanFailed)?;
        loop {
            let id = match events.next().await.ok_or(AdapterError::ScanFailed)? {
                CentralEvent::DeviceDiscovered(id)
                | CentralEvent::DeviceUpdated(id)
                | CentralEvent::ManufacturerDataAdvertisement { id, .. }
                | CentralEvent::ServiceDataAdvertisement { id, .. } => id,
                _ => continue,
            };
            let Ok(peripheral) = self.central.peripheral(&id).await else {
                continue;
            };
            if let Some(device) = self.describe(&peripheral).await {
                return Ok(device);
            }
        }
    }

    async fn connect(&self, address: &Address) -> Result<BtleplugLink, AdapterError> {
        let peripheral = self.lookup(address).await?;
        let mut guard = ReleaseOnDrop::disconnect(peripheral.clone());
        let events = self.central.events().await.map_err(backend)?;
        peripheral.connect().await.map_err(backend)?;
        let notifications = peripheral.notifications().await.map_err(backend)?;
        guard.disarm();
        Ok(BtleplugLink {
            peripheral: peripheral.clone(),
            attributes: RefCell::new(BTreeMap::new()),
            notifications: Mutex::new(notifications),
            events: Mutex::new(events),
            release: RefCell::new(ReleaseOnDrop::disconnect(peripheral)),
        })
    }
}

enum Attribute {
    Characteristic(Characteristic),
    Descriptor(Descriptor),
}

pub struct BtleplugLink {
    peripheral: Peripheral,
    attributes: RefCell<BTreeMap<Handle, Attribute>>,
    notifications: Mutex<NotificationStream>,
    events: Mutex<EventStream>,
    release: RefCell<ReleaseOnDrop>,
}

impl BtleplugLink {
    fn characteristic(&self, handle: Handle) -> Result<Characteristic, AdapterError> {
        match self.attributes.borrow().get(&handle) {
            Some(Attribute::Characteristic(c)) => Ok(c.clone()),
            // ATT "invalid handle".
            _ => Err(AdapterError::Att(0x01)),
        }
    }

    fn descriptor(&self, handle: Handle) -> Result<Descriptor, AdapterError> {
        match self.attributes.borrow().get(&handle) {
            Some(Attribute::Descriptor(d)) => Ok(d.clone()),
            _ => Err(AdapterError::Att(0x01)),
        }
    }

    fn handle_of(&self, notification: &ValueNotification) -> Option<Handle> {
        self.attributes
            .borrow()
            .iter()
            .find_map(|(handle, attr)| match attr {
                Attribute::Characteristic(c) if c.uuid == notification.uuid => Some(*handle),
                _ => None,
            })
    }
}

impl Link for BtleplugLink {
    async fn discover(&self) -> Result<Vec<ServiceDescriptor>, AdapterError> {
        self.peripheral.discover_services().await.map_err(backend)?;

        let mut attributes = BTreeMap::new();
        let mut services = Vec::new();
        let mut next: Handle = 1;
        let mut take = || {
            let handle = next;
            next = next.saturating_add(1);
            handle
        };
        for service in self.peripheral.services() {
            let mut sd = ServiceDescriptor::new(service.uuid, take());
            for ch in &service.characteristics {
                let handle = take();
                let mut cd = CharacteristicDescriptor::new(
                    ch.uuid,
                    handle,
                    CharProps::from_bits(ch.properties.bits()),
                );
                attributes.insert(handle, Attribute::Characteristic(ch.clone()));
                for d in &ch.descriptors {
                    let handle = take();
                    cd = cd.with_descriptor(d.uuid, handle);
                    attributes.insert(handle, Attribute::Descriptor(d.clone()));
                }
                sd = sd.with_characteristic(cd);
            }
            services.push(sd);
        }
        self.attributes.replace(attributes);
        Ok(services)
    }

    async fn read(&self, handle: Handle) -> Result<Vec<u8>, AdapterError> {
        let ch = self.characteristic(handle)?;
        self.peripheral.read(&ch).await.map_err(backend)
    }

    async fn read_descriptor(&self, handle: Handle) -> Result<Vec<u8>, AdapterError> {
        let d = self.descriptor(handle)?;
        self.peripheral.read_descriptor(&d).await.map_err(backend)
    }

    async fn write(&self, handle: Handle, value: &[u8], kind: WriteKind) -> Result<(), AdapterError> {
        let ch = self.characteristic(handle)?;
        let kind = match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral.write(&ch, value, kind).await.map_err(backend)
    }

    async fn set_notify(&self, handle: Handle, enable: bool) -> Result<(), AdapterError> {
        let ch = self.characteristic(handle)?;
        if enable {
            self.peripheral.subscribe(&ch).await.map_err(backend)
        } else {
            self.peripheral.unsubscribe(&ch).await.map_err(backend)
        }
    }

    fn max_write_len(&self) -> usize {
        MAX_WRITE_LEN
    }

    async fn next_event(&self) -> LinkEvent {
        let mut notifications = self.notifications.lock().await;
        let mut events = self.events.lock().await;
        let id = self.peripheral.id();
        loop {
            tokio::select! {
                n = notifications.next() => match n {
                    Some(n) => {
                        if let Some(handle) = self.handle_of(&n) {
                            return LinkEvent::Value { handle, value: n.value };
                        }
                    }
                    None => return LinkEvent::Disconnected,
                },
                e = events.next() => match e {
                    Some(CentralEvent::DeviceDisconnected(peer)) if peer == id => {
                        return LinkEvent::Disconnected;
                    }
                    Some(_) => {}
                    None => return LinkEvent::Disconnected,
                },
            }
        }
    }

    async fn disconnect(&self) -> Result<(), AdapterError> {
        self.release.borrow_mut().disarm();
        self.peripheral.disconnect().await.map_err(backend)
    }
}
