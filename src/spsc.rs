//! Single-producer / single-consumer bounded ring.
//!
//! The simplest of the rings: with only one writer, reservations come from a
//! plain (non-atomic) counter the producer owns, and publication is a single
//! release store of the public head. The consumer polls the head with an
//! acquire load and advances its own tail.
//!
//! # Memory ordering
//!
//! - producer: plain bump of the private head, then `head.store(release)`
//!   once the slot is fully written;
//! - consumer: `head.load(acquire)` pairs with that store, making the slot
//!   write visible before the value is moved out; `tail.store(release)`
//!   hands the slot back to the producer.
//!
//! The private head, the public head, and the tail each live on their own
//! cache line, so steady-state traffic between the two threads is limited to
//! the two published counters.

use crate::cache::{CachePadded, LineBuffer, PackPolicy, Pow2};
use crate::invariants::{debug_assert_bounded_depth, debug_assert_readable};
use std::cell::UnsafeCell;
use std::hint;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded lock-free ring for exactly one producer thread and exactly one
/// consumer thread.
///
/// The type does not guard the role assignment itself: callers must ensure
/// that at most one thread pushes and at most one thread pops at any time.
/// The usual shape is one clone-free `Arc` on each side, or
/// `std::thread::scope` with the ring borrowed by both closures.
///
/// ```
/// use ringfan::SpscRing;
///
/// let ring = SpscRing::<u64>::new(1, 8);
/// ring.push(7);
/// assert_eq!(ring.pop(), Some(7));
/// assert_eq!(ring.pop(), None);
/// ```
pub struct SpscRing<T, P: PackPolicy = Pow2> {
    buffer: LineBuffer<T, P>,

    /// Producer-only reservation counter; never read by the consumer.
    private_head: CachePadded<UnsafeCell<u64>>,
    /// Producer -> consumer: one past the last published slot.
    head: CachePadded<AtomicU64>,
    /// Consumer -> producer: first slot not yet consumed.
    tail: CachePadded<AtomicU64>,

    capacity: usize,
    /// One slot stays vacant so a full ring is distinguishable from an
    /// empty one.
    free_needed: u64,
}

unsafe impl<T: Send, P: PackPolicy> Send for SpscRing<T, P> {}
unsafe impl<T: Send, P: PackPolicy> Sync for SpscRing<T, P> {}

impl<T, P: PackPolicy> SpscRing<T, P> {
    /// Creates a ring backed by at least `min_lanes` cache lines and at
    /// least `min_elems` slots, whichever is larger.
    pub fn new(min_lanes: usize, min_elems: usize) -> Self {
        let buffer = LineBuffer::new(min_lanes, min_elems);
        let capacity = buffer.len();
        Self {
            buffer,
            private_head: CachePadded::new(UnsafeCell::new(0)),
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            capacity,
            free_needed: capacity as u64 - 1,
        }
    }

    /// Total slots in the ring; at most `capacity() - 1` are usable at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current depth. Approximate while both sides are active; exact from
    /// within either role's own thread.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        self.head.load(Ordering::Acquire).wrapping_sub(tail) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `value`, spinning while the ring is full. Never fails and
    /// never drops an element.
    ///
    /// Must only be called from the single producer thread.
    pub fn push(&self, value: T) {
        let index = self.claim_slot();
        // SAFETY: `claim_slot` waited until the consumer passed
        // `index - capacity`, so this cell was moved out (or never written)
        // and nobody else touches it until the head store below.
        unsafe { self.buffer.slot(index).write(value) };
        self.head.store(index + 1, Ordering::Release);
    }

    /// Reserves the next index, waiting for space.
    fn claim_slot(&self) -> u64 {
        // SAFETY: the cell is written by the sole producer only; this
        // unsynchronized read-modify-write has exactly one writer.
        let index = unsafe {
            let head = self.private_head.get();
            let index = *head;
            *head = index + 1;
            index
        };
        while index.wrapping_sub(self.tail.load(Ordering::Relaxed)) >= self.free_needed {
            hint::spin_loop();
        }
        debug_assert_bounded_depth!(
            index.wrapping_sub(self.tail.load(Ordering::Relaxed)),
            self.capacity
        );
        index
    }

    /// Removes the oldest element, or returns `None` when the ring is
    /// empty.
    ///
    /// Must only be called from the single consumer thread.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail >= head {
            return None;
        }
        debug_assert_readable!(tail, head);
        // SAFETY: `tail < head`, and the acquire load of `head` pairs with
        // the producer's release store, so the slot holds a fully written
        // value that only this consumer will touch.
        let value = unsafe { self.buffer.slot(tail).read() };
        self.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }
}

impl<T, P: PackPolicy> Drop for SpscRing<T, P> {
    fn drop(&mut self) {
        // Release whatever was pushed but never popped.
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        for index in tail..head {
            // SAFETY: slots in [tail, head) hold live values and `&mut self`
            // means no thread is using the ring anymore.
            unsafe { ptr::drop_in_place(self.buffer.slot(index)) };
        }
    }
}
