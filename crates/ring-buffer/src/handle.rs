//! Producer and consumer handles for a split queue

use crate::buffer::BoundedQueue;
use crate::OverflowPolicy;

/// The write side of a split [`BoundedQueue`]
///
/// There is exactly one producer per split and it cannot be cloned, which is
/// what makes the lock-free push sound.
#[derive(Debug)]
pub struct Producer<'a, T: Copy, const N: usize> {
    queue: &'a BoundedQueue<T, N>,
}

impl<'a, T: Copy, const N: usize> Producer<'a, T, N> {
    pub(crate) fn new(queue: &'a BoundedQueue<T, N>) -> Self {
        Self { queue }
    }

    /// Push an element without blocking
    ///
    /// On a full queue the result depends on the queue's policy: `Reject`
    /// returns the element unchanged as `Err`, `OverwriteOldest` evicts the
    /// oldest unread element and returns `Ok`.
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        // SAFETY: this handle is the only producer and `&mut self` keeps the
        // call from overlapping with another push on the same handle.
        unsafe { self.queue.push_as_producer(value) }
    }

    /// Get a snapshot of the number of unread elements
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Get the queue capacity
    pub fn capacity(&self) -> usize {
        N
    }

    /// Get the full-queue policy
    pub fn policy(&self) -> OverflowPolicy {
        self.queue.policy()
    }
}

/// The read side of a split [`BoundedQueue`]
#[derive(Debug)]
pub struct Consumer<'a, T: Copy, const N: usize> {
    queue: &'a BoundedQueue<T, N>,
}

impl<'a, T: Copy, const N: usize> Consumer<'a, T, N> {
    pub(crate) fn new(queue: &'a BoundedQueue<T, N>) -> Self {
        Self { queue }
    }

    /// Pop the oldest unread element without blocking
    ///
    /// Returns `None` when the queue is observed empty.
    ///
    /// Under `OverwriteOldest` the call is lock-free but not wait-free: a
    /// copy that loses the race with an eviction is discarded and the pop
    /// retries, so a producer that keeps evicting can make it spin.
    pub fn try_pop(&mut self) -> Option<T> {
        // SAFETY: this handle is the only consumer.
        unsafe { self.queue.pop_as_consumer() }
    }

    /// Discard every element pushed so far
    ///
    /// A push that lands concurrently may or may not survive.
    pub fn clear(&mut self) {
        // SAFETY: this handle is the only consumer.
        unsafe { self.queue.clear_as_consumer() }
    }

    /// Get a snapshot of the number of unread elements
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    /// Get the queue capacity
    pub fn capacity(&self) -> usize {
        N
    }
}
