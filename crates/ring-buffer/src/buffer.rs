//! Lock-Free Bounded Queue Implementation

use crate::handle::{Consumer, Producer};
use crate::OverflowPolicy;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity SPSC queue with inline storage
///
/// `N` must be a power of two and at least 2; both are checked at compile
/// time. `head` and `tail` are free-running counters: the slot for a counter
/// is `counter & (N - 1)` and the number of live elements is
/// `head.wrapping_sub(tail)`, which stays correct after either counter wraps
/// past `usize::MAX`.
///
/// Owning the queue gives exclusive access, so the `&mut self` operations
/// below are plain single-threaded calls. For two concurrent contexts use
/// [`BoundedQueue::split`].
pub struct BoundedQueue<T: Copy, const N: usize> {
    /// Inline storage; a slot is initialized once the producer has written it
    slots: [UnsafeCell<MaybeUninit<T>>; N],
    /// Next write position (producer-owned)
    head: CachePadded<AtomicUsize>,
    /// Next read position (consumer-owned, also advanced by evictions)
    tail: CachePadded<AtomicUsize>,
    /// Full-queue behavior, fixed for the queue's lifetime
    policy: OverflowPolicy,
    /// Total elements written (for statistics)
    total_written: AtomicUsize,
    /// Elements discarded by `OverwriteOldest`
    overwritten: AtomicUsize,
}

// SAFETY: slot memory is only reached through `&mut self` or through the
// single Producer/Consumer pair handed out by `split`. The release/acquire
// pairs on `head` and `tail` order every slot write before the matching read.
unsafe impl<T: Copy + Send, const N: usize> Sync for BoundedQueue<T, N> {}

impl<T: Copy, const N: usize> BoundedQueue<T, N> {
    const CAPACITY_CHECK: () = assert!(
        N >= 2 && N.is_power_of_two(),
        "queue capacity must be a power of two and at least 2"
    );
    const MASK: usize = N - 1;

    /// Create an empty queue with the given full-queue policy
    pub fn new(policy: OverflowPolicy) -> Self {
        Self::starting_at(policy, 0)
    }

    /// Create an empty queue whose counters start at `start`
    fn starting_at(policy: OverflowPolicy, start: usize) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;

        Self {
            slots: std::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
            head: CachePadded::new(AtomicUsize::new(start)),
            tail: CachePadded::new(AtomicUsize::new(start)),
            policy,
            total_written: AtomicUsize::new(0),
            overwritten: AtomicUsize::new(0),
        }
    }

    /// Split into the producer and consumer handles
    ///
    /// The handles borrow the queue, so no other access is possible until
    /// both are dropped.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        let queue: &Self = self;
        (Producer::new(queue), Consumer::new(queue))
    }

    /// Push an element, see [`Producer::try_push`]
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        // SAFETY: `&mut self` rules out any other producer or consumer.
        unsafe { self.push_as_producer(value) }
    }

    /// Pop the oldest element, see [`Consumer::try_pop`]
    pub fn try_pop(&mut self) -> Option<T> {
        // SAFETY: `&mut self` rules out any other producer or consumer.
        unsafe { self.pop_as_consumer() }
    }

    /// Drop every unread element
    pub fn clear(&mut self) {
        // SAFETY: `&mut self` rules out any other producer or consumer.
        unsafe { self.clear_as_consumer() }
    }

    /// Get the full-queue policy
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Get the queue capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Get the number of unread elements
    ///
    /// Safe from either side; the value is a snapshot and may be stale as
    /// soon as it is returned.
    pub fn len(&self) -> usize {
        // tail first: head only grows, so the difference cannot go negative
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(N)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len() as f64 / N as f64
    }

    /// Get total elements written (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written.load(Ordering::Relaxed)
    }

    /// Get the number of elements evicted by `OverwriteOldest`
    pub fn overwritten(&self) -> usize {
        self.overwritten.load(Ordering::Relaxed)
    }

    fn slot(&self, counter: usize) -> *mut MaybeUninit<T> {
        self.slots[counter & Self::MASK].get()
    }

    /// # Safety
    ///
    /// The caller must be the only producer for the duration of the call.
    pub(crate) unsafe fn push_as_producer(&self, value: T) -> Result<(), T> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) >= N {
            match self.policy {
                OverflowPolicy::Reject => return Err(value),
                OverflowPolicy::OverwriteOldest => self.evict_oldest(head, tail),
            }
        }

        // SAFETY: the slot at `head` holds no live element: it was never
        // written, its element was consumed (acquired through `tail`), or it
        // was just evicted. Only this producer writes slots.
        unsafe { ptr::write(self.slot(head), MaybeUninit::new(value)) };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        self.total_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Advance `tail` past the oldest element unless the consumer already did
    fn evict_oldest(&self, head: usize, mut tail: usize) {
        while head.wrapping_sub(tail) >= N {
            match self.tail.compare_exchange_weak(
                tail,
                tail.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.overwritten.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(current) => tail = current,
            }
        }
    }

    /// # Safety
    ///
    /// The caller must be the only consumer for the duration of the call.
    pub(crate) unsafe fn pop_as_consumer(&self) -> Option<T> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            let head = self.head.load(Ordering::Acquire);
            if head == tail {
                return None;
            }

            let slot = self.slot(tail);
            match self.policy {
                OverflowPolicy::Reject => {
                    // SAFETY: `head != tail` and the acquire on `head` make the
                    // producer's write visible; the producer does not reuse the
                    // slot until the release below.
                    let value = unsafe { ptr::read(slot).assume_init() };
                    self.tail.store(tail.wrapping_add(1), Ordering::Release);
                    return Some(value);
                }
                OverflowPolicy::OverwriteOldest => {
                    // Seqlock-style read: the producer may evict this element
                    // and rewrite the slot while we copy it, so the copy can be
                    // torn. It is kept only if the CAS below proves `tail` did
                    // not move, i.e. no eviction touched the slot.
                    // SAFETY: the read goes into a `MaybeUninit<T>` and is never
                    // interpreted as `T` unless validated; `T: Copy` makes
                    // discarding a torn copy a no-op.
                    let copy = unsafe { ptr::read_volatile(slot) };
                    if self
                        .tail
                        .compare_exchange(
                            tail,
                            tail.wrapping_add(1),
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                    {
                        // SAFETY: `tail` was unchanged when we claimed it, so
                        // the producer did not start rewriting the slot before
                        // our copy finished and it holds the published value.
                        return Some(unsafe { copy.assume_init() });
                    }
                }
            }
        }
    }

    /// # Safety
    ///
    /// The caller must be the only consumer for the duration of the call.
    pub(crate) unsafe fn clear_as_consumer(&self) {
        let mut tail = self.tail.load(Ordering::Acquire);
        loop {
            let head = self.head.load(Ordering::Acquire);
            match self
                .tail
                .compare_exchange(tail, head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(current) => tail = current,
            }
        }
    }
}

impl<T: Copy, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new(OverflowPolicy::default())
    }
}

impl<T: Copy, const N: usize> fmt::Debug for BoundedQueue<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("policy", &self.policy)
            .field("total_written", &self.total_written())
            .field("overwritten", &self.overwritten())
            .finish()
    }
}
