//! Notification dispatcher.
//!
//! Routes value-change events from one link to per-characteristic
//! subscriptions.  Every subscription owns an unbounded queue, so delivery
//! never waits on a consumer and never loses a value: a slow handler only
//! delays its own values.  Order within one queue is the order the adapter
//! reported.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::ops::ControlFlow;

use super::queue::EventQueue;
use super::Handle;

type ValueQueue = EventQueue<Vec<u8>>;

struct Route {
    id: u32,
    handle: Handle,
    queue: Rc<ValueQueue>,
}

#[derive(Default)]
pub struct Dispatcher {
    routes: RefCell<Vec<Route>>,
    next_id: Cell<u32>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route for `handle`.
    pub fn register(&self, handle: Handle) -> Subscription<'_> {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let queue = Rc::new(ValueQueue::unbounded());
        self.routes.borrow_mut().push(Route {
            id,
            handle,
            queue: queue.clone(),
        });
        Subscription {
            dispatcher: self,
            id,
            handle,
            queue,
        }
    }

    /// Remove a route.  Returns `true` when it was the last one for its handle.
    pub(crate) fn remove(&self, id: u32) -> bool {
        let mut routes = self.routes.borrow_mut();
        let Some(pos) = routes.iter().position(|r| r.id == id) else {
            return false;
        };
        let route = routes.remove(pos);
        route.queue.close();
        !routes.iter().any(|r| r.handle == route.handle)
    }

    /// Deliver a value to every route of `handle`.  Returns the number of
    /// routes it reached.
    pub fn dispatch(&self, handle: Handle, value: &[u8]) -> usize {
        let routes = self.routes.borrow();
        let mut delivered = 0;
        for route in routes.iter().filter(|r| r.handle == handle) {
            route.queue.push(value.to_vec());
            delivered += 1;
        }
        if delivered == 0 {
            trace!("handle {}: value without subscriber", handle);
        }
        delivered
    }

    pub fn has_route(&self, handle: Handle) -> bool {
        self.routes.borrow().iter().any(|r| r.handle == handle)
    }

    /// Handles with at least one route, deduplicated.
    pub fn routed_handles(&self) -> Vec<Handle> {
        let mut handles: Vec<Handle> = self.routes.borrow().iter().map(|r| r.handle).collect();
        handles.sort_unstable();
        handles.dedup();
        handles
    }

    pub fn len(&self) -> usize {
        self.routes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.borrow().is_empty()
    }

    /// End every subscription stream (link lost or session closed).
    pub fn close(&self) {
        for route in self.routes.borrow_mut().drain(..) {
            route.queue.close();
        }
    }
}

/// A registered handler slot for one characteristic.
///
/// Values are pulled with [`next`](Self::next) or pushed into a closure
/// with [`for_each`](Self::for_each).  Dropping the subscription removes
/// its route; disabling the notification at the peer is done by
/// [`Session::unsubscribe`](super::session::Session::unsubscribe).
pub struct Subscription<'a> {
    dispatcher: &'a Dispatcher,
    id: u32,
    handle: Handle,
    queue: Rc<ValueQueue>,
}

impl Subscription<'_> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Next value, or `None` once unregistered or the link is gone.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.queue.recv().await
    }

    /// Feed values to `handler` until it breaks or the stream ends.
    ///
    /// Breaking unregisters the route; values already queued behind the
    /// one that triggered the break are discarded.
    pub async fn for_each<F>(&mut self, mut handler: F)
    where
        F: FnMut(&[u8]) -> ControlFlow<()>,
    {
        while let Some(value) = self.queue.recv().await {
            if handler(&value).is_break() {
                self.cancel();
                while self.queue.try_pop().is_some() {}
                return;
            }
        }
    }

    /// Values received but not yet consumed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_active(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Remove the route.  Returns `true` when no other route for the same
    /// handle remains.
    pub(crate) fn cancel(&self) -> bool {
        self.dispatcher.remove(self.id)
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        self.dispatcher.remove(self.id);
    }
}
