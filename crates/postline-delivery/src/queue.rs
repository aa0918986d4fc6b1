//! Bounded FIFO of retries awaiting a worker.

use crossbeam_queue::ArrayQueue;

/// Lock-free bounded queue with non-blocking `offer` and `poll`.
///
/// Shared between response handling and every retry worker. Overflow is
/// reported back to the caller instead of blocking.
#[derive(Debug)]
pub struct RetryQueue<T> {
    inner: ArrayQueue<T>,
}

impl<T> RetryQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. `DeliveryConfig::validate` rejects that
    /// value before a coordinator builds its queue.
    pub fn new(capacity: usize) -> Self {
        Self { inner: ArrayQueue::new(capacity) }
    }

    /// Appends `item`, handing it back if the queue is full.
    pub fn offer(&self, item: T) -> Result<(), T> {
        self.inner.push(item)
    }

    /// Removes the oldest item, if any.
    pub fn poll(&self) -> Option<T> {
        self.inner.pop()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}
