//! BLE GAP scanner - discovers nearby peripherals.
//!
//! The scanner owns the adapter's single scan session.  Any number of
//! subscribers, each with its own filter, observe that one session.
//! Advertisements are pulled from the adapter lazily: one waiting
//! subscriber at a time holds the pull turn, awaits the next advertisement
//! and fans it out to the queues of every subscriber whose filter matches.
//! The others sleep on their own queue and are woken when an event
//! arrives for them or the turn is handed back.
//!
//! De-duplication state belongs to one scan session and is cleared on
//! every start or restart, so a known device shows up again after a
//! restart.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::ops::ControlFlow;
use core::task::Poll;

use embassy_futures::select::{select, Either};
use embassy_time::{with_timeout, Duration, Instant};

use super::adapter::Adapter;
use super::queue::EventQueue;
use super::{Address, DeviceDescriptor, ScanEvent};
use crate::config::{Dedup, ScanConfig, SCAN_QUEUE_DEPTH};
use crate::error::AdapterError;

type ScanQueue = EventQueue<ScanEvent>;

/// Predicate deciding whether a subscriber sees an advertisement.
pub type Filter = Box<dyn Fn(&DeviceDescriptor) -> bool>;

struct Subscriber {
    id: u32,
    filter: Filter,
    queue: Rc<ScanQueue>,
}

pub struct Scanner<'a, A: Adapter> {
    adapter: &'a A,
    config: ScanConfig,
    active: Cell<bool>,
    subscribers: RefCell<Vec<Subscriber>>,
    seen: RefCell<BTreeMap<Address, DeviceDescriptor>>,
    /// Set while a subscriber is awaiting the adapter.
    pulling: Cell<bool>,
    next_id: Cell<u32>,
}

impl<'a, A: Adapter> Scanner<'a, A> {
    pub fn new(adapter: &'a A, config: ScanConfig) -> Self {
        Self {
            adapter,
            config,
            active: Cell::new(false),
            subscribers: RefCell::new(Vec::new()),
            seen: RefCell::new(BTreeMap::new()),
            pulling: Cell::new(false),
            next_id: Cell::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Subscribe with `filter`, starting the adapter scan if none is
    /// running.  A scan already in progress is joined as is.
    pub async fn start<F>(&self, filter: F) -> Result<ScanSubscription<'_, 'a, A>, AdapterError>
    where
        F: Fn(&DeviceDescriptor) -> bool + 'static,
    {
        if self.active.get() {
            debug!("scan already active, attaching subscriber");
        } else {
            self.adapter.start_scan().await?;
            self.seen.borrow_mut().clear();
            self.active.set(true);
            info!("BLE scan started");
        }

        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let queue = Rc::new(ScanQueue::bounded(SCAN_QUEUE_DEPTH));
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            filter: Box::new(filter),
            queue: queue.clone(),
        });
        Ok(ScanSubscription {
            scanner: self,
            id,
            queue,
        })
    }

    /// Stop the adapter scan and end every subscription.
    pub async fn stop(&self) -> Result<(), AdapterError> {
        for sub in self.subscribers.borrow_mut().drain(..) {
            sub.queue.close();
        }
        if !self.active.replace(false) {
            return Ok(());
        }
        info!("BLE scan stopped");
        self.adapter.stop_scan().await
    }

    /// Begin a fresh scan session, keeping the current subscribers.
    ///
    /// Platforms report a device once per scan session; restarting is how
    /// repeated advertisements (e.g. changing sensor readings) are seen.
    pub async fn restart(&self) -> Result<(), AdapterError> {
        if self.active.get() {
            self.adapter.stop_scan().await?;
        }
        self.seen.borrow_mut().clear();
        self.adapter.start_scan().await?;
        self.active.set(true);
        trace!("BLE scan restarted");
        Ok(())
    }

    /// Collect matching devices for `window`, unique by address (latest
    /// advertisement wins).
    pub async fn discover<F>(
        &self,
        filter: F,
        window: Duration,
    ) -> Result<Vec<DeviceDescriptor>, AdapterError>
    where
        F: Fn(&DeviceDescriptor) -> bool + 'static,
    {
        let mut sub = self.start(filter).await?;
        let mut found: BTreeMap<Address, DeviceDescriptor> = BTreeMap::new();
        let collect = async {
            while let Some(event) = sub.next().await {
                found.insert(event.device.address, event.device);
            }
        };
        let _ = with_timeout(window, collect).await;
        sub.stop().await?;
        info!("discovery window closed, {} devices", found.len());
        Ok(found.into_values().collect())
    }

    fn is_new(&self, device: &DeviceDescriptor) -> bool {
        let mut seen = self.seen.borrow_mut();
        let fresh = match self.config.dedup {
            Dedup::Off => return true,
            Dedup::Address => !seen.contains_key(&device.address),
            Dedup::Content => !seen
                .get(&device.address)
                .is_some_and(|prev| prev.same_content(device)),
        };
        if fresh {
            seen.insert(device.address, device.clone());
        }
        fresh
    }

    fn deliver(&self, device: DeviceDescriptor) {
        if !self.is_new(&device) {
            return;
        }
        let event = ScanEvent {
            device,
            observed_at: Instant::now(),
        };
        for sub in self.subscribers.borrow().iter() {
            if (sub.filter)(&event.device) {
                sub.queue.push(event.clone());
            }
        }
    }

    async fn fail(&self, error: AdapterError) {
        warn!("BLE scan ended with error: {}", error);
        let _ = self.stop().await;
    }

    /// Give up the pull turn and let every waiting subscriber compete for it.
    fn release_turn(&self) {
        self.pulling.set(false);
        for sub in self.subscribers.borrow().iter() {
            sub.queue.wake();
        }
    }

    /// Returns `true` when no subscriber remains.
    fn remove(&self, id: u32) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            subscribers.remove(pos).queue.close();
        }
        subscribers.is_empty()
    }
}

/// One subscriber's view of the scan.
///
/// Dropping a subscription unsubscribes it but leaves the adapter scan
/// running; [`stop`](Self::stop) also stops the scan when it was the last
/// subscriber.
pub struct ScanSubscription<'s, 'a, A: Adapter> {
    scanner: &'s Scanner<'a, A>,
    id: u32,
    queue: Rc<ScanQueue>,
}

impl<A: Adapter> ScanSubscription<'_, '_, A> {
    /// False once the scanner stopped, explicitly or after an adapter error.
    pub fn is_active(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Next matching advertisement, or `None` once the scan is stopped.
    pub async fn next(&mut self) -> Option<ScanEvent> {
        let scanner = self.scanner;
        loop {
            let waited = poll_fn(|cx| {
                if let Some(event) = self.queue.try_pop() {
                    return Poll::Ready(Some(Some(event)));
                }
                if self.queue.is_closed() {
                    return Poll::Ready(Some(None));
                }
                if !scanner.pulling.get() {
                    return Poll::Ready(None);
                }
                self.queue.register(cx);
                Poll::Pending
            })
            .await;
            if let Some(event) = waited {
                return event;
            }

            let _turn = PullTurn::take(scanner);
            match select(self.queue.recv(), scanner.adapter.next_advertisement()).await {
                Either::First(event) => return event,
                Either::Second(Ok(device)) => scanner.deliver(device),
                Either::Second(Err(e)) => scanner.fail(e).await,
            }
        }
    }

    /// Next advertisement for which `extract` yields a value.
    ///
    /// Advertisements that match the filter but not the expected layout
    /// (missing key, short payload) are skipped without a diagnostic.
    pub async fn next_with<T, F>(&mut self, mut extract: F) -> Option<(ScanEvent, T)>
    where
        F: FnMut(&DeviceDescriptor) -> Option<T>,
    {
        while let Some(event) = self.next().await {
            match extract(&event.device) {
                Some(value) => return Some((event, value)),
                None => trace!("{}: advertisement skipped", event.device.address),
            }
        }
        None
    }

    /// Feed events to `handler` until it breaks or the scan stops.
    pub async fn for_each<F>(&mut self, mut handler: F)
    where
        F: FnMut(ScanEvent) -> ControlFlow<()>,
    {
        while let Some(event) = self.next().await {
            if handler(event).is_break() {
                return;
            }
        }
    }

    /// Unsubscribe; the adapter scan stops with the last subscriber.
    pub async fn stop(self) -> Result<(), AdapterError> {
        let scanner = self.scanner;
        let last = scanner.remove(self.id);
        drop(self);
        if last && scanner.active.replace(false) {
            info!("BLE scan stopped");
            scanner.adapter.stop_scan().await?;
        }
        Ok(())
    }
}

/// The right to await the adapter; handed back on drop, including when
/// the pulling `next()` is cancelled.
struct PullTurn<'s, 'a, A: Adapter> {
    scanner: &'s Scanner<'a, A>,
}

impl<'s, 'a, A: Adapter> PullTurn<'s, 'a, A> {
    fn take(scanner: &'s Scanner<'a, A>) -> Self {
        scanner.pulling.set(true);
        Self { scanner }
    }
}

impl<A: Adapter> Drop for PullTurn<'_, '_, A> {
    fn drop(&mut self) {
        self.scanner.release_turn();
    }
}

impl<A: Adapter> Drop for ScanSubscription<'_, '_, A> {
    fn drop(&mut self) {
        self.scanner.remove(self.id);
    }
}

/// Common advertisement predicates.
pub mod filter {
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;

    use uuid::Uuid;

    use crate::ble::{Address, DeviceDescriptor};

    pub fn any() -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        |_: &DeviceDescriptor| true
    }

    /// Manufacturer data present for `company`.
    pub fn manufacturer(company: u16) -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        move |d: &DeviceDescriptor| d.manufacturer_data.contains_key(&company)
    }

    /// Service data present for `service`.
    pub fn service_data(service: Uuid) -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        move |d: &DeviceDescriptor| d.service_data.contains_key(&service)
    }

    /// Any service data at all.
    pub fn has_service_data() -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        |d: &DeviceDescriptor| !d.service_data.is_empty()
    }

    pub fn name_prefix(prefix: &str) -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        let prefix: String = prefix.to_string();
        move |d: &DeviceDescriptor| d.name().is_some_and(|n| n.starts_with(prefix.as_str()))
    }

    pub fn addresses(list: &[Address]) -> impl Fn(&DeviceDescriptor) -> bool + 'static {
        let list: Vec<Address> = list.to_vec();
        move |d: &DeviceDescriptor| list.contains(&d.address)
    }
}
