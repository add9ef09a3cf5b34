//! Multi-producer / multi-consumer fan-out ring.
//!
//! Every committed element is delivered to every live subscriber: consumers
//! carry independent read cursors instead of stealing from a shared tail, so
//! `pop` clones the slot value rather than moving it out. Producer
//! back-pressure is measured against the slowest subscriber through a
//! `min_tail` aggregate that a background daemon callback recomputes on
//! every pass. The callback also prunes subscriptions that were retired, so
//! dropping a slow subscriber releases the producers after the daemon's
//! next sweep.
//!
//! Subscribing is deliberately late-join: a new subscription starts at the
//! current committed frontier and never replays history.

use crate::barrier::WriteConfirm;
use crate::cache::{CachePadded, LineBuffer, PackPolicy, Pow2};
use crate::daemon::{global_daemon, CallbackKey, DaemonHandle};
use crate::invariants::{debug_assert_bounded_depth, debug_assert_readable};
use std::hint;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Per-subscriber cursor into the shared ring.
struct SubscriberState {
    /// Next index this subscriber will read.
    tail: CachePadded<AtomicU64>,
    /// Cleared on unsubscribe; the sweep prunes dead entries.
    live: AtomicBool,
}

/// State shared by the queue, its subscriptions, and the daemon callback.
struct Shared<T, P: PackPolicy> {
    buffer: LineBuffer<T, P>,
    barrier: WriteConfirm,

    /// Slowest live subscriber cursor, as of the last daemon sweep.
    min_tail: CachePadded<AtomicU64>,

    capacity: usize,
    /// One slot stays vacant to distinguish full from empty.
    free_needed: u64,

    subscribers: Mutex<Vec<Arc<SubscriberState>>>,
}

// Slots are cloned concurrently by subscribers and dropped by producers on
// overwrite, so both `Send` and `Sync` are required of the element.
unsafe impl<T: Send + Sync, P: PackPolicy> Send for Shared<T, P> {}
unsafe impl<T: Send + Sync, P: PackPolicy> Sync for Shared<T, P> {}

impl<T, P: PackPolicy> Shared<T, P> {
    /// Recomputes `min_tail` over the live subscribers and prunes retired
    /// ones. Runs on the daemon thread.
    ///
    /// Seeded with the committed frontier: with no subscribers at all the
    /// ring reports empty and producers are never throttled by a cursor
    /// that no longer exists.
    fn sweep(&self) {
        let mut subscribers = self.subscribers.lock().unwrap();
        let mut min_tail = self.barrier.read_index();
        subscribers.retain(|state| {
            if state.live.load(Ordering::Acquire) {
                min_tail = min_tail.min(state.tail.load(Ordering::Relaxed));
                true
            } else {
                false
            }
        });
        self.min_tail.store(min_tail, Ordering::Release);
    }
}

impl<T, P: PackPolicy> Drop for Shared<T, P> {
    fn drop(&mut self) {
        // Cells still holding live values are the last `capacity` committed
        // indices; everything older was dropped when its cell was
        // overwritten.
        let read_head = self.barrier.read_index();
        let live = read_head.min(self.capacity as u64);
        for index in (read_head - live)..read_head {
            // SAFETY: each of these indices maps to a distinct cell holding
            // the value committed there; no handles are left to observe it.
            unsafe { ptr::drop_in_place(self.buffer.slot(index)) };
        }
    }
}

/// Bounded lock-free ring delivering every element to every subscriber.
///
/// Producers may push from any number of threads. Consumers attach with
/// [`subscribe`](FanoutRing::subscribe) and read at their own pace; the
/// ring throttles producers against the slowest live subscriber.
///
/// ```
/// use ringfan::FanoutRing;
///
/// let queue = FanoutRing::<u32>::new(1, 8);
/// let mut sub = queue.subscribe();
/// queue.push(42);
/// assert_eq!(sub.pop(), Some(42));
/// assert_eq!(sub.pop(), None);
/// ```
pub struct FanoutRing<T, P: PackPolicy = Pow2> {
    shared: Arc<Shared<T, P>>,
    daemon: DaemonHandle,
    callback_key: CallbackKey,
}

impl<T, P> FanoutRing<T, P>
where
    T: Send + Sync + 'static,
    P: PackPolicy,
{
    /// Creates a fan-out ring whose min-tail sweep runs on the process-wide
    /// daemon.
    pub fn new(min_lanes: usize, min_elems: usize) -> Self {
        Self::new_in(&global_daemon(), min_lanes, min_elems)
    }

    /// Creates a fan-out ring whose sweep runs on the given daemon. Tests
    /// use this with a private [`Daemon`](crate::Daemon) to avoid coupling
    /// through the global instance.
    pub fn new_in(daemon: &DaemonHandle, min_lanes: usize, min_elems: usize) -> Self {
        let buffer = LineBuffer::new(min_lanes, min_elems);
        let capacity = buffer.len();
        let shared = Arc::new(Shared {
            buffer,
            barrier: WriteConfirm::new(),
            min_tail: CachePadded::new(AtomicU64::new(0)),
            capacity,
            free_needed: capacity as u64 - 1,
            subscribers: Mutex::new(Vec::new()),
        });

        // The callback holds a weak reference so an abandoned queue cannot
        // be kept alive by the daemon registry between drop and
        // deregistration.
        let sweep_target: Weak<Shared<T, P>> = Arc::downgrade(&shared);
        let callback_key = daemon.add_callback(move || {
            if let Some(shared) = sweep_target.upgrade() {
                shared.sweep();
            }
        });

        Self {
            shared,
            daemon: daemon.clone(),
            callback_key,
        }
    }
}

impl<T, P: PackPolicy> FanoutRing<T, P> {
    /// Total slots in the ring; at most `capacity() - 1` are usable at once.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Committed elements the slowest subscriber has not read yet, as of
    /// the last daemon sweep. Approximate under concurrency.
    #[inline]
    pub fn len(&self) -> usize {
        let min_tail = self.shared.min_tail.load(Ordering::Relaxed);
        self.shared.barrier.read_index().wrapping_sub(min_tail) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `value`, spinning while the slowest subscriber still needs
    /// the slot this write would reuse. Never fails and never drops an
    /// element that a live subscriber has not seen.
    pub fn push(&self, value: T) {
        let shared = &*self.shared;
        let index = shared.barrier.reserve();
        while index.wrapping_sub(shared.min_tail.load(Ordering::Relaxed)) >= shared.free_needed {
            hint::spin_loop();
        }
        debug_assert_bounded_depth!(
            index.wrapping_sub(shared.min_tail.load(Ordering::Relaxed)),
            shared.capacity
        );
        let slot = shared.buffer.slot(index);
        // SAFETY: the reservation is exclusive and the wait above ensures
        // every subscriber has moved past `index - capacity`, so the
        // previous occupant (present once the ring has wrapped) is dead to
        // all readers and this cell is ours to overwrite.
        unsafe {
            if index >= shared.capacity as u64 {
                ptr::drop_in_place(slot);
            }
            slot.write(value);
        }
        shared.barrier.commit(index);
    }

    /// Attaches a new subscriber starting at the current committed
    /// frontier. Elements pushed before this call are not delivered.
    pub fn subscribe(&self) -> Subscription<T, P> {
        let mut subscribers = self.shared.subscribers.lock().unwrap();
        let state = Arc::new(SubscriberState {
            tail: CachePadded::new(AtomicU64::new(self.shared.barrier.read_index())),
            live: AtomicBool::new(true),
        });
        subscribers.push(Arc::clone(&state));
        Subscription {
            shared: Arc::clone(&self.shared),
            state,
        }
    }
}

impl<T, P: PackPolicy> Drop for FanoutRing<T, P> {
    fn drop(&mut self) {
        self.daemon.remove_callback(self.callback_key);
    }
}

/// Independent read cursor into a [`FanoutRing`].
///
/// Dropping the handle unsubscribes it; the daemon reclaims the registry
/// entry on its next sweep. Outstanding subscriptions keep the ring's
/// storage alive even after the `FanoutRing` itself is dropped.
pub struct Subscription<T, P: PackPolicy = Pow2> {
    shared: Arc<Shared<T, P>>,
    state: Arc<SubscriberState>,
}

impl<T: Clone, P: PackPolicy> Subscription<T, P> {
    /// Reads the next element, or returns `None` when this subscriber has
    /// seen everything committed so far.
    ///
    /// The value is cloned out of the slot: other subscribers still read
    /// the same element at their own pace.
    pub fn pop(&mut self) -> Option<T> {
        let read_head = self.shared.barrier.read_index();
        let tail = self.state.tail.load(Ordering::Relaxed);
        if read_head <= tail {
            return None;
        }
        debug_assert_readable!(tail, read_head);
        // SAFETY: `tail < read_head` means the slot is committed, and
        // producers never reuse a cell until every live subscriber's tail
        // has passed it, so the value stays valid for the duration of this
        // clone.
        let value = unsafe { (*self.shared.buffer.slot(tail)).clone() };
        self.state.tail.store(tail + 1, Ordering::Release);
        Some(value)
    }
}

impl<T, P: PackPolicy> Subscription<T, P> {
    /// Retires this subscriber. Equivalent to dropping the handle; the
    /// daemon prunes the registry entry asynchronously.
    pub fn unsubscribe(self) {}
}

impl<T, P: PackPolicy> Drop for Subscription<T, P> {
    fn drop(&mut self) {
        self.state.live.store(false, Ordering::Release);
    }
}
