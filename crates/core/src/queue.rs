//! Thread-safe containers backing the tier inboxes and spill lists.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// An unbounded multi-producer FIFO with a single bulk drainer.
///
/// Producers enqueue from any thread. The owning loop takes everything in one
/// atomic step with [`drain_all`](Self::drain_all), which also resets the
/// observable count; appends that complete before a drain begins are part of
/// that drain. Order is preserved per producer, with no ordering guarantee
/// across producers.
pub struct ConcurrentQueue<T> {
    items: Mutex<VecDeque<T>>,
    len: AtomicUsize,
}

impl<T> ConcurrentQueue<T> {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Append one item.
    pub fn push(&self, item: T) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.push_back(item);
        self.len.store(items.len(), Ordering::Release);
    }

    /// Append a batch, preserving its order.
    pub fn extend(&self, batch: impl IntoIterator<Item = T>) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.extend(batch);
        self.len.store(items.len(), Ordering::Release);
    }

    /// Atomically take every queued item and reset the count to zero.
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        self.len.store(0, Ordering::Release);
        Vec::from(std::mem::take(&mut *items))
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the queue currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A thread-safe append list, taken in bulk.
///
/// A tier allocates one per spill destination for the duration of a batch;
/// dispatch workers append concurrently and the tier moves the contents to
/// the destination inbox in a single [`take`](Self::take).
pub struct ConcurrentList<T> {
    items: Mutex<Vec<T>>,
}

impl<T> ConcurrentList<T> {
    /// An empty list.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    /// Append one item.
    pub fn push(&self, item: T) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(item);
    }

    /// Append a batch, preserving its order.
    pub fn extend(&self, batch: impl IntoIterator<Item = T>) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
    }

    /// Take the current contents, leaving the list empty.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the list currently holds no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ConcurrentList<T> {
    fn default() -> Self {
        Self::new()
    }
}
