//! ringfan - lock-free containers for low-latency inter-thread messaging.
//!
//! Four containers share a false-sharing-aware storage substrate and a
//! reserve-then-commit publication discipline:
//!
//! - [`SpscRing`]: bounded ring, one producer, one consumer;
//! - [`MpscRing`]: bounded ring, many producers publishing in reservation
//!   order through a [`WriteConfirm`] barrier, one consumer;
//! - [`FanoutRing`]: bounded ring where every element reaches every
//!   [`Subscription`], with producer back-pressure against the slowest
//!   subscriber aggregated by a background [`Daemon`];
//! - [`PushVec`]: append-only vector, one producer, many
//!   [`PushVecReader`]s, with references stable across growth.
//!
//! Rings never block in the OS sense: a full ring spins the producer, an
//! empty ring returns `None`. Capacity is fixed at construction and sized
//! in cache lines; the [`Pow2`] packing policy (the default) keeps all
//! index arithmetic branch-free, [`Exact`] packs to the byte.
//!
//! # Example
//!
//! ```
//! use ringfan::{FanoutRing, SpscRing};
//!
//! let ring = SpscRing::<u64>::new(1, 8);
//! ring.push(7);
//! assert_eq!(ring.pop(), Some(7));
//!
//! let queue = FanoutRing::<u32>::new(1, 8);
//! let mut a = queue.subscribe();
//! let mut b = queue.subscribe();
//! queue.push(42);
//! assert_eq!(a.pop(), Some(42));
//! assert_eq!(b.pop(), Some(42));
//! ```

mod barrier;
mod cache;
mod daemon;
mod fanout;
mod invariants;
mod mpsc;
mod push_vec;
mod spsc;

pub use barrier::WriteConfirm;
pub use cache::{CachePadded, Exact, LineBuffer, PackPolicy, Pow2, CACHE_LINE_SIZE};
pub use daemon::{global_daemon, CallbackKey, Daemon, DaemonHandle};
pub use fanout::{FanoutRing, Subscription};
pub use mpsc::MpscRing;
pub use push_vec::{Iter as PushVecIter, PushVec, PushVecReader, ResizeError};
pub use spsc::SpscRing;
