//! Connection session - one GATT link to one peripheral.
//!
//! Lifecycle:
//! 1. `Disconnected` -> `Connecting`: adapter connect, bounded by
//!    `SessionConfig::connect_timeout`.
//! 2. `Connecting` -> `Discovering`: full service/characteristic discovery,
//!    cached for the life of the link.
//! 3. `Discovering` -> `Ready`: reads, writes and subscriptions allowed.
//! 4. `close()` -> `Disconnecting` -> `Disconnected`; link loss jumps
//!    straight to `Disconnected` from any connected state.
//!
//! A failed or cancelled connect always leaves the session `Disconnected`
//! with the partially acquired link released.
//!
//! Value-change events only flow while [`Session::pump`] is being polled.

use alloc::rc::Rc;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::with_timeout;
use uuid::Uuid;

use super::adapter::{Adapter, Link, LinkEvent, WriteKind};
use super::dispatcher::{Dispatcher, Subscription};
use super::{
    Address, CharProps, CharacteristicDescriptor, CharacteristicId, ConnectionState, Handle,
    ServiceDescriptor,
};
use crate::config::SessionConfig;
use crate::error::{AdapterError, ConnectError, GattError};

pub struct Session<'a, A: Adapter> {
    adapter: &'a A,
    address: Address,
    config: SessionConfig,
    state: Cell<ConnectionState>,
    link: RefCell<Option<Rc<A::Link>>>,
    services: RefCell<Vec<ServiceDescriptor>>,
    dispatcher: Dispatcher,
    /// Serializes transport operations issued through this session.
    op_lock: Mutex<NoopRawMutex, ()>,
    closed: Signal<NoopRawMutex, ()>,
    /// A `close()` is awaiting the adapter.
    closing: Cell<bool>,
}

/// Reverts a connect attempt that did not reach `Ready` (error or drop).
struct ConnectGuard<'s, 'a, A: Adapter> {
    session: &'s Session<'a, A>,
    armed: bool,
}

impl<A: Adapter> Drop for ConnectGuard<'_, '_, A> {
    fn drop(&mut self) {
        if self.armed {
            self.session.invalidate();
        }
    }
}

/// Clears `closing` when a close ends, completed or cancelled.  A
/// cancelled close leaves the session `Disconnecting` with its link still
/// attached, so the next `close()` retries the disconnect.
struct CloseGuard<'s, 'a, A: Adapter> {
    session: &'s Session<'a, A>,
}

impl<A: Adapter> Drop for CloseGuard<'_, '_, A> {
    fn drop(&mut self) {
        self.session.closing.set(false);
    }
}

impl<'a, A: Adapter> Session<'a, A> {
    /// A session in the `Disconnected` state.  Nothing touches the adapter
    /// until [`connect`](Self::connect).
    pub fn new(adapter: &'a A, address: Address, config: SessionConfig) -> Self {
        Self {
            adapter,
            address,
            config,
            state: Cell::new(ConnectionState::Disconnected),
            link: RefCell::new(None),
            services: RefCell::new(Vec::new()),
            dispatcher: Dispatcher::new(),
            op_lock: Mutex::new(()),
            closed: Signal::new(),
            closing: Cell::new(false),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_ready(&self) -> bool {
        self.state.get() == ConnectionState::Ready
    }

    /// Connect and discover.  Returns immediately if already `Ready`;
    /// finishes an interrupted close first.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        match self.state.get() {
            ConnectionState::Ready => return Ok(()),
            ConnectionState::Disconnected => {}
            ConnectionState::Disconnecting if !self.closing.get() => {
                self.close().await;
                if self.state.get() != ConnectionState::Disconnected {
                    return Err(ConnectError::Refused(AdapterError::Disconnected));
                }
            }
            _ => {
                return Err(ConnectError::Refused(AdapterError::Backend(
                    "connect already in progress".to_string(),
                )))
            }
        }

        self.closed.reset();
        self.state.set(ConnectionState::Connecting);
        let mut guard = ConnectGuard {
            session: self,
            armed: true,
        };

        debug!("{}: connecting", self.address);
        let link = match with_timeout(
            self.config.connect_timeout,
            self.adapter.connect(&self.address),
        )
        .await
        {
            Ok(Ok(link)) => Rc::new(link),
            Ok(Err(e)) => {
                warn!("{}: connect failed: {}", self.address, e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("{}: connect timed out", self.address);
                return Err(ConnectError::Timeout);
            }
        };

        // close() raced the connect.
        if self.state.get() != ConnectionState::Connecting {
            let _ = link.disconnect().await;
            return Err(ConnectError::Refused(AdapterError::Disconnected));
        }

        self.link.replace(Some(link.clone()));
        self.state.set(ConnectionState::Discovering);

        let discovered =
            match with_timeout(self.config.discovery_timeout, link.discover()).await {
                Ok(result) => result,
                Err(_) => Err(AdapterError::Timeout),
            };
        let services = match discovered {
            Ok(services) => services,
            Err(e) => {
                warn!("{}: service discovery failed: {}", self.address, e);
                let _ = link.disconnect().await;
                return Err(ConnectError::DiscoveryFailed(e));
            }
        };

        if self.state.get() != ConnectionState::Discovering {
            let _ = link.disconnect().await;
            return Err(ConnectError::Refused(AdapterError::Disconnected));
        }

        info!(
            "{}: ready, {} services discovered",
            self.address,
            services.len()
        );
        self.services.replace(services);
        self.state.set(ConnectionState::Ready);
        guard.armed = false;
        Ok(())
    }

    /// Snapshot of the discovered services; empty unless `Ready`.
    pub fn services(&self) -> Vec<ServiceDescriptor> {
        self.services.borrow().clone()
    }

    pub fn service(&self, uuid: &Uuid) -> Option<ServiceDescriptor> {
        self.services.borrow().iter().find(|s| s.uuid == *uuid).cloned()
    }

    /// Characteristic `characteristic` inside service `service`.
    pub fn find(&self, service: &Uuid, characteristic: &Uuid) -> Option<CharacteristicDescriptor> {
        self.services
            .borrow()
            .iter()
            .filter(|s| s.uuid == *service)
            .find_map(|s| s.characteristic(characteristic).cloned())
    }

    /// Resolve an identifier against the discovered services.
    pub fn characteristic(
        &self,
        id: impl Into<CharacteristicId>,
    ) -> Result<CharacteristicDescriptor, GattError> {
        let id = id.into();
        self.services
            .borrow()
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| match id {
                CharacteristicId::Uuid(uuid) => c.uuid == uuid,
                CharacteristicId::Handle(handle) => c.handle == handle,
            })
            .cloned()
            .ok_or(GattError::NotFound)
    }

    fn link(&self) -> Result<Rc<A::Link>, GattError> {
        if self.state.get() != ConnectionState::Ready {
            return Err(GattError::Disconnected);
        }
        self.link.borrow().clone().ok_or(GattError::Disconnected)
    }

    pub async fn read(&self, id: impl Into<CharacteristicId>) -> Result<Vec<u8>, GattError> {
        let link = self.link()?;
        let ch = self.characteristic(id)?;
        if !ch.props.contains(CharProps::READ) {
            return Err(GattError::Unsupported);
        }
        let _op = self.op_lock.lock().await;
        Ok(link.read(ch.handle).await?)
    }

    /// Read a descriptor by handle.  The handle must belong to a
    /// descriptor found during discovery.
    pub async fn read_descriptor(&self, handle: Handle) -> Result<Vec<u8>, GattError> {
        let link = self.link()?;
        let known = self
            .services
            .borrow()
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .flat_map(|c| c.descriptors.iter())
            .any(|d| d.handle == handle);
        if !known {
            return Err(GattError::NotFound);
        }
        let _op = self.op_lock.lock().await;
        Ok(link.read_descriptor(handle).await?)
    }

    /// Write with response when the characteristic supports it, otherwise
    /// without.
    pub async fn write(
        &self,
        id: impl Into<CharacteristicId>,
        value: &[u8],
    ) -> Result<(), GattError> {
        let ch = self.characteristic(id)?;
        let kind = if ch.props.contains(CharProps::WRITE) {
            WriteKind::WithResponse
        } else if ch.props.contains(CharProps::WRITE_WITHOUT_RESPONSE) {
            WriteKind::WithoutResponse
        } else {
            return Err(GattError::Unsupported);
        };
        self.write_kind(&ch, value, kind).await
    }

    pub async fn write_without_response(
        &self,
        id: impl Into<CharacteristicId>,
        value: &[u8],
    ) -> Result<(), GattError> {
        let ch = self.characteristic(id)?;
        if !ch.props.contains(CharProps::WRITE_WITHOUT_RESPONSE) {
            return Err(GattError::Unsupported);
        }
        self.write_kind(&ch, value, WriteKind::WithoutResponse).await
    }

    async fn write_kind(
        &self,
        ch: &CharacteristicDescriptor,
        value: &[u8],
        kind: WriteKind,
    ) -> Result<(), GattError> {
        let link = self.link()?;
        let max = link.max_write_len();
        if value.len() > max {
            return Err(GattError::PayloadTooLarge {
                len: value.len(),
                max,
            });
        }
        let _op = self.op_lock.lock().await;
        link.write(ch.handle, value, kind)
            .await
            .map_err(|e| match e {
                AdapterError::PayloadTooLarge { max } => GattError::PayloadTooLarge {
                    len: value.len(),
                    max,
                },
                other => other.into(),
            })
    }

    /// Register for value changes and enable them at the peer.
    ///
    /// The first subscription to a handle writes the CCCD; further ones
    /// share it.
    pub async fn subscribe(
        &self,
        id: impl Into<CharacteristicId>,
    ) -> Result<Subscription<'_>, GattError> {
        let link = self.link()?;
        let ch = self.characteristic(id)?;
        if !ch.props.intersects(CharProps::NOTIFY | CharProps::INDICATE) {
            return Err(GattError::Unsupported);
        }
        let first = !self.dispatcher.has_route(ch.handle);
        let sub = self.dispatcher.register(ch.handle);
        if first {
            let _op = self.op_lock.lock().await;
            // On error the route is removed when `sub` drops.
            link.set_notify(ch.handle, true).await?;
        }
        debug!("{}: subscribed to handle {}", self.address, ch.handle);
        Ok(sub)
    }

    /// Drop a subscription; notifications are disabled at the peer once
    /// no subscription for that handle remains.
    pub async fn unsubscribe(&self, sub: Subscription<'_>) -> Result<(), GattError> {
        let handle = sub.handle();
        sub.cancel();
        drop(sub);
        if self.dispatcher.has_route(handle) {
            return Ok(());
        }
        let Ok(link) = self.link() else {
            return Ok(());
        };
        let _op = self.op_lock.lock().await;
        link.set_notify(handle, false).await?;
        Ok(())
    }

    /// Drive value-change events into subscriptions.
    ///
    /// Returns `Ok(())` when the session is closed locally and
    /// `Err(GattError::Disconnected)` when the link is lost.  Run at most
    /// one pump per session.
    pub async fn pump(&self) -> Result<(), GattError> {
        let link = self.link()?;
        loop {
            match select(link.next_event(), self.closed.wait()).await {
                Either::First(LinkEvent::Value { handle, value }) => {
                    self.dispatcher.dispatch(handle, &value);
                }
                Either::First(LinkEvent::Disconnected) => {
                    warn!("{}: link lost", self.address);
                    self.invalidate();
                    return Err(GattError::Disconnected);
                }
                Either::Second(()) => return Ok(()),
            }
        }
    }

    /// Disconnect.  Idempotent; cached services and all subscription
    /// streams end here.
    ///
    /// If the returned future is dropped before the adapter confirms, the
    /// session stays `Disconnecting` and a later `close()` (or `connect()`)
    /// issues the disconnect again.
    pub async fn close(&self) {
        if self.state.get() == ConnectionState::Disconnected || self.closing.get() {
            return;
        }
        self.closing.set(true);
        let _closing = CloseGuard { session: self };
        self.state.set(ConnectionState::Disconnecting);
        self.closed.signal(());
        self.services.borrow_mut().clear();
        self.dispatcher.close();
        let link = self.link.borrow().clone();
        if let Some(link) = link {
            if let Err(e) = link.disconnect().await {
                debug!("{}: disconnect: {}", self.address, e);
            }
        }
        self.link.borrow_mut().take();
        self.state.set(ConnectionState::Disconnected);
        info!("{}: closed", self.address);
    }

    fn invalidate(&self) {
        self.state.set(ConnectionState::Disconnected);
        self.link.borrow_mut().take();
        self.services.borrow_mut().clear();
        self.dispatcher.close();
    }
}

impl<A: Adapter> Drop for Session<'_, A> {
    fn drop(&mut self) {
        if self.state.get() != ConnectionState::Disconnected {
            debug!("{}: dropped while connected, releasing link", self.address);
        }
    }
}

/// Create a session and bring it to `Ready`.
pub async fn connect<A: Adapter>(
    adapter: &A,
    address: Address,
    config: SessionConfig,
) -> Result<Session<'_, A>, ConnectError> {
    let session = Session::new(adapter, address, config);
    session.connect().await?;
    Ok(session)
}

/// Run `f` against a ready session and close it afterwards.
///
/// If the returned future is dropped mid-way, the session is dropped with
/// it and its link released by the adapter.
pub async fn with_session<'a, A, F, R>(
    adapter: &'a A,
    address: Address,
    config: SessionConfig,
    f: F,
) -> Result<R, ConnectError>
where
    A: Adapter,
    F: AsyncFnOnce(&Session<'a, A>) -> R,
{
    let session = connect(adapter, address, config).await?;
    let out = f(&session).await;
    session.close().await;
    Ok(out)
}
