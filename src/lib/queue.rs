//! Inter-stage buffers.
//!
//! Two buffer kinds are provided, and they are never interchanged:
//!
//! - [`OrderedChannel`]: FIFO, backed by an unbounded `crossbeam_channel`. Used wherever a
//!   single producer feeds a single consumer and order carries meaning (geometry records and
//!   attribute rows feeding the correlator, correlated records).
//! - [`UnorderedBag`]: backed by a lock-free `crossbeam_queue::SegQueue` plus a wakeup
//!   condition variable. Makes no ordering promise; used where many workers push or pop and
//!   only the set of items matters (serialized lines, reloaded records).
//!
//! All waiting is a blocking receive bounded by a timeout; no buffer is ever busy-polled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

/// A concurrent buffer connecting two pipeline stages.
pub trait StageBuffer<T>: Send + Sync {
    /// Insert an item.
    fn push(&self, item: T);

    /// Remove an item if one is immediately available.
    fn try_pop(&self) -> Option<T>;

    /// Remove an item, waiting up to `timeout` for one to arrive.
    fn pop_timeout(&self, timeout: Duration) -> Option<T>;

    /// Number of items currently buffered.
    fn len(&self) -> usize;

    /// Returns true if nothing is currently buffered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A buffer shared between stages.
pub type SharedBuffer<T> = Arc<dyn StageBuffer<T>>;

/// Remove everything currently in `buffer`.
pub fn drain<T>(buffer: &dyn StageBuffer<T>) -> Vec<T> {
    let mut items = Vec::with_capacity(buffer.len());
    while let Some(item) = buffer.try_pop() {
        items.push(item);
    }
    items
}

/// FIFO buffer for single-producer, single-consumer paths.
pub struct OrderedChannel<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> OrderedChannel<T> {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    /// Create a channel and wrap it for sharing between stages.
    #[must_use]
    pub fn shared() -> SharedBuffer<T>
    where
        T: Send + 'static,
    {
        Arc::new(Self::new())
    }
}

impl<T> Default for OrderedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> StageBuffer<T> for OrderedChannel<T> {
    fn push(&self, item: T) {
        // Cannot disconnect: this channel owns its receiver.
        let _ = self.sender.send(item);
    }

    fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }
}

/// Multi-producer, multi-consumer buffer with no ordering guarantee.
pub struct UnorderedBag<T> {
    items: SegQueue<T>,
    lock: Mutex<()>,
    available: Condvar,
}

impl<T> UnorderedBag<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { items: SegQueue::new(), lock: Mutex::new(()), available: Condvar::new() }
    }

    /// Create a bag and wrap it for sharing between stages.
    #[must_use]
    pub fn shared() -> SharedBuffer<T>
    where
        T: Send + 'static,
    {
        Arc::new(Self::new())
    }
}

impl<T> Default for UnorderedBag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> StageBuffer<T> for UnorderedBag<T> {
    fn push(&self, item: T) {
        self.items.push(item);
        // Taking the lock orders this notify after any waiter's emptiness check.
        let _guard = self.lock.lock();
        self.available.notify_one();
    }

    fn try_pop(&self) -> Option<T> {
        self.items.pop()
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(item) = self.items.pop() {
            return Some(item);
        }
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock();
        loop {
            if let Some(item) = self.items.pop() {
                return Some(item);
            }
            if self.available.wait_until(&mut guard, deadline).timed_out() {
                return self.items.pop();
            }
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
