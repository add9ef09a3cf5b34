//! Multi-producer / single-consumer bounded ring.
//!
//! Producers share a [`WriteConfirm`] barrier: a fetch-add hands each one an
//! exclusive slot, and the commit step publishes slots in reservation order
//! no matter which producer finishes writing first. The single consumer
//! polls the barrier's read index and owns the tail outright, so it never
//! contends with producers on its own cursor.

use crate::barrier::WriteConfirm;
use crate::cache::{CachePadded, LineBuffer, PackPolicy, Pow2};
use crate::invariants::{debug_assert_bounded_depth, debug_assert_readable};
use std::hint;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bounded lock-free ring for any number of producer threads and exactly
/// one consumer thread.
///
/// `push` may be called concurrently from any thread; `pop` must stay on a
/// single consumer thread at a time.
///
/// ```
/// use ringfan::MpscRing;
///
/// let ring = MpscRing::<u64>::new(1, 8);
/// ring.push(1);
/// ring.push(2);
/// assert_eq!(ring.pop(), Some(1));
/// assert_eq!(ring.pop(), Some(2));
/// assert_eq!(ring.pop(), None);
/// ```
pub struct MpscRing<T, P: PackPolicy = Pow2> {
    buffer: LineBuffer<T, P>,
    barrier: WriteConfirm,

    /// Consumer cursor: first slot not yet consumed.
    tail: CachePadded<AtomicU64>,

    capacity: usize,
    /// One slot stays vacant to distinguish full from empty.
    free_needed: u64,
}

unsafe impl<T: Send, P: PackPolicy> Send for MpscRing<T, P> {}
unsafe impl<T: Send, P: PackPolicy> Sync for MpscRing<T, P> {}

impl<T, P: PackPolicy> MpscRing<T, P> {
    /// Creates a ring backed by at least `min_lanes` cache lines and at
    /// least `min_elems` slots, whichever is larger.
    pub fn new(min_lanes: usize, min_elems: usize) -> Self {
        let buffer = LineBuffer::new(min_lanes, min_elems);
        let capacity = buffer.len();
        Self {
            buffer,
            barrier: WriteConfirm::new(),
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

    /// Committed elements not yet consumed. Approximate under concurrency.
    #[inline]
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        self.barrier.read_index().wrapping_sub(tail) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `value`, spinning while the ring is full. Elements become
    /// visible to the consumer in reservation order; a producer that
    /// reserved later than an unfinished peer waits for that peer inside
    /// the commit, never on the consumer.
    pub fn push(&self, value: T) {
        let index = self.barrier.reserve();
        while index.wrapping_sub(self.tail.load(Ordering::Relaxed)) >= self.free_needed {
            hint::spin_loop();
        }
        debug_assert_bounded_depth!(
            index.wrapping_sub(self.tail.load(Ordering::Relaxed)),
            self.capacity
        );
        // SAFETY: the reservation is exclusive, and the wait above ensures
        // the consumer has moved the previous occupant of this cell out.
        unsafe { self.buffer.slot(index).write(value) };
        self.barrier.commit(index);
    }

    /// Removes the oldest committed element, or returns `None` when the
    /// ring is empty.
    ///
    /// Must only be called from the single consumer thread.
    pub fn pop(&self) -> Option<T> {
        let read_head = self.barrier.read_index();
        let tail = self.tail.load(Ordering::Relaxed);
        if read_head <= tail {
            return None;
        }
        debug_assert_readable!(tail, read_head);
        // SAFETY: `tail < read_head`, and the acquire load inside
        // `read_index` pairs with the committing producer's release, so the
        // slot holds a fully written value owned by this consumer now.
        let value = unsafe { self.buffer.slot(tail).read() };
        self.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }
}

impl<T, P: PackPolicy> Drop for MpscRing<T, P> {
    fn drop(&mut self) {
        // Committed but unconsumed slots still hold live values. Slots past
        // the committed frontier (a producer that reserved and never
        // committed) are untracked and left alone; with `&mut self` the
        // ring is quiescent and normally read_head == write_head.
        let tail = self.tail.load(Ordering::Relaxed);
        let read_head = self.barrier.read_index();
        for index in tail..read_head {
            // SAFETY: see above; nobody else can touch the ring anymore.
            unsafe { ptr::drop_in_place(self.buffer.slot(index)) };
        }
    }
}
