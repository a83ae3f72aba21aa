//! Single-consumer event queue.
//!
//! Producers never wait.  A queue is either unbounded (every item is
//! kept until received) or bounded, in which case a push onto a full queue
//! drops the oldest entry and counts it.

use alloc::collections::VecDeque;
use core::cell::{Cell, RefCell};
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::waitqueue::WakerRegistration;

pub struct EventQueue<T> {
    items: RefCell<VecDeque<T>>,
    limit: Option<usize>,
    waker: RefCell<WakerRegistration>,
    closed: Cell<bool>,
    dropped: Cell<u32>,
}

impl<T> EventQueue<T> {
    /// Keeps every item.
    pub const fn unbounded() -> Self {
        Self::with_limit(None)
    }

    /// Keeps at most `depth` items, dropping the oldest on overflow.
    pub const fn bounded(depth: usize) -> Self {
        Self::with_limit(Some(depth))
    }

    const fn with_limit(limit: Option<usize>) -> Self {
        Self {
            items: RefCell::new(VecDeque::new()),
            limit,
            waker: RefCell::new(WakerRegistration::new()),
            closed: Cell::new(false),
            dropped: Cell::new(0),
        }
    }

    /// Enqueue without blocking.  Returns `false` if an older entry had to
    /// be discarded to make room.  Items pushed after [`close`](Self::close)
    /// are ignored.
    pub fn push(&self, item: T) -> bool {
        if self.closed.get() {
            return true;
        }
        let mut items = self.items.borrow_mut();
        let mut kept_all = true;
        if self.limit.is_some_and(|limit| items.len() >= limit) {
            items.pop_front();
            self.dropped.set(self.dropped.get().saturating_add(1));
            kept_all = false;
        }
        items.push_back(item);
        drop(items);
        self.waker.borrow_mut().wake();
        kept_all
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.borrow_mut().pop_front()
    }

    /// Poll for the next item, registering `cx` for a wake-up otherwise.
    pub fn poll_recv(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if let Some(item) = self.try_pop() {
            return Poll::Ready(Some(item));
        }
        if self.closed.get() {
            return Poll::Ready(None);
        }
        self.waker.borrow_mut().register(cx.waker());
        Poll::Pending
    }

    /// Next item; `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }

    /// Register the consumer's waker without taking an item.
    pub fn register(&self, cx: &mut Context<'_>) {
        self.waker.borrow_mut().register(cx.waker());
    }

    /// Wake the consumer without pushing anything.
    pub fn wake(&self) {
        self.waker.borrow_mut().wake();
    }

    /// Stop accepting items and wake the consumer.  Already queued items
    /// can still be received.
    pub fn close(&self) {
        self.closed.set(true);
        self.waker.borrow_mut().wake();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Number of items discarded because the consumer fell behind.
    pub fn dropped(&self) -> u32 {
        self.dropped.get()
    }
}
