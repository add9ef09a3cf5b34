//! Reserve-then-commit publication barrier for multi-producer rings.
//!
//! A [`WriteConfirm`] pairs two monotone 64-bit counters. Producers claim
//! slots from `write_head` with a single fetch-add, write their data, then
//! commit. The commit advances `read_head` from exactly the claimed index to
//! the next one, so consumers observe slots in strict reservation order even
//! when producers finish writing out of order: a producer that reserved a
//! later slot parks on its compare-exchange until every earlier reservation
//! has committed.
//!
//! Both counters are padded to their own cache lines; producers contending
//! on `write_head` never invalidate the consumer's view of `read_head`.

use crate::cache::CachePadded;
use crate::invariants::debug_assert_commit_pending;
use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

/// Multi-producer commit barrier.
///
/// ```
/// use ringfan::WriteConfirm;
///
/// let barrier = WriteConfirm::new();
/// let index = barrier.reserve();
/// // ... write the slot for `index` ...
/// barrier.commit(index);
/// assert_eq!(barrier.read_index(), index + 1);
/// ```
#[derive(Debug, Default)]
pub struct WriteConfirm {
    /// Next free reservation.
    write_head: CachePadded<AtomicU64>,
    /// One past the highest committed index visible to consumers.
    read_head: CachePadded<AtomicU64>,
}

impl WriteConfirm {
    pub const fn new() -> Self {
        Self {
            write_head: CachePadded::new(AtomicU64::new(0)),
            read_head: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Claims the next slot index. Safe to call from any number of threads;
    /// each caller gets an exclusive index.
    #[inline]
    pub fn reserve(&self) -> u64 {
        self.write_head.fetch_add(1, Ordering::AcqRel)
    }

    /// Snapshot of the consumer-visible frontier.
    #[inline]
    pub fn read_index(&self) -> u64 {
        self.read_head.load(Ordering::Acquire)
    }

    /// Publishes the slot at `index`, making `read_head` reach `index + 1`.
    ///
    /// Returns once the frontier has passed the slot. When it does, the
    /// caller's preceding writes are visible to any thread that subsequently
    /// observes `read_index() > index`. Spins while earlier reservations are
    /// still uncommitted; never skips ahead.
    pub fn commit(&self, index: u64) {
        let next = index + 1;
        loop {
            match self.read_head.compare_exchange_weak(
                index,
                next,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => {
                    debug_assert_commit_pending!(observed, index);
                    hint::spin_loop();
                }
            }
        }
    }
}
