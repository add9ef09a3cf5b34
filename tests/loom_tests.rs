//! Loom model of the reserve-then-commit publication protocol.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`
//!
//! Loom explores the possible interleavings exhaustively, so the protocol
//! is modelled standalone on loom's atomics with a tiny buffer; the points
//! being checked are the ones the real barrier relies on: the commit CAS
//! serializes publication in reservation order, and a slot write is visible
//! to any thread that observes the frontier past it.

#![cfg(feature = "loom")]

use loom::sync::atomic::{AtomicU64, Ordering};
use loom::sync::Arc;
use loom::thread;
use std::cell::UnsafeCell;

/// Two-counter barrier over a four-slot buffer, as the MPSC ring uses it.
struct Model {
    write_head: AtomicU64,
    read_head: AtomicU64,
    buffer: UnsafeCell<[u64; 4]>,
}

unsafe impl Send for Model {}
unsafe impl Sync for Model {}

impl Model {
    fn new() -> Self {
        Self {
            write_head: AtomicU64::new(0),
            read_head: AtomicU64::new(0),
            buffer: UnsafeCell::new([0; 4]),
        }
    }

    fn reserve(&self) -> u64 {
        self.write_head.fetch_add(1, Ordering::AcqRel)
    }

    fn write(&self, index: u64, value: u64) {
        // SAFETY: the reservation gives this thread the slot exclusively.
        unsafe { (*self.buffer.get())[index as usize & 3] = value };
    }

    fn commit(&self, index: u64) {
        loop {
            match self.read_head.compare_exchange_weak(
                index,
                index + 1,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => {
                    assert!(observed <= index);
                    thread::yield_now();
                }
            }
        }
    }

    fn read_index(&self) -> u64 {
        self.read_head.load(Ordering::Acquire)
    }

    fn read(&self, index: u64) -> u64 {
        // SAFETY: only called for indices below an observed read_head.
        unsafe { (*self.buffer.get())[index as usize & 3] }
    }
}

/// Two producers committing out of order still publish in reservation
/// order, and published slots carry the producer's write.
#[test]
fn loom_commit_serializes_publication() {
    loom::model(|| {
        let model = Arc::new(Model::new());

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let model = Arc::clone(&model);
                thread::spawn(move || {
                    let index = model.reserve();
                    model.write(index, index + 100);
                    model.commit(index);
                })
            })
            .collect();

        // Whatever the frontier shows is fully written, in order.
        let frontier = model.read_index();
        for index in 0..frontier {
            assert_eq!(model.read(index), index + 100);
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(model.read_index(), 2);
    });
}

/// The frontier never runs past the write head and never moves backwards.
#[test]
fn loom_frontier_is_bounded_and_monotone() {
    loom::model(|| {
        let model = Arc::new(Model::new());

        let producer = {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                let index = model.reserve();
                model.write(index, 7);
                model.commit(index);
            })
        };

        let mut last = 0;
        for _ in 0..2 {
            let seen = model.read_index();
            assert!(seen >= last);
            assert!(seen <= model.write_head.load(Ordering::Acquire));
            last = seen;
            thread::yield_now();
        }

        producer.join().unwrap();
        assert_eq!(model.read_index(), 1);
    });
}
