//! Lock-Free Bounded Queue
//!
//! Provides a fixed-capacity SPSC queue for handing sensor samples from a
//! producer context to a consumer context without locks or allocation.
//!
//! The queue owns its storage inline. Call [`BoundedQueue::split`] to obtain
//! the one [`Producer`] and the one [`Consumer`] that may touch it
//! concurrently, typically from scoped threads.

mod buffer;
mod handle;

pub use buffer::BoundedQueue;
pub use handle::{Consumer, Producer};

/// What `try_push` does when the queue already holds `N` elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Refuse the new element and hand it back to the caller
    #[default]
    Reject,
    /// Evict the oldest unread element to make room; the push always succeeds
    OverwriteOldest,
}
