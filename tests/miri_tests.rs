//! Miri-compatible tests for the unsafe paths.
//!
//! Run with: `cargo +nightly miri test --test miri_tests`
//!
//! Small capacities and short loops keep the interpreter fast while still
//! exercising wrap-around (cell reuse), value moves out of raw slots, drop
//! of archived blocks, and the overwrite-drop in the fan-out ring.

use ringfan::{Daemon, Exact, FanoutRing, MpscRing, PushVec, SpscRing};

#[test]
fn miri_spsc_wrap_with_heap_values() {
    let ring = SpscRing::<String>::new(1, 4);

    for round in 0..3 {
        for item in 0..4 {
            ring.push(format!("{round}-{item}"));
            assert_eq!(ring.pop().as_deref(), Some(format!("{round}-{item}").as_str()));
        }
    }
    assert_eq!(ring.pop(), None);
}

#[test]
fn miri_spsc_drops_leftovers() {
    let ring = SpscRing::<Vec<u8>>::new(1, 8);
    ring.push(vec![1, 2, 3]);
    ring.push(vec![4, 5, 6]);
    // Dropped with the ring; miri flags any leak or double free.
}

#[test]
fn miri_mpsc_reserve_commit_single_thread() {
    let ring = MpscRing::<Box<u64>, Exact>::new(1, 4);

    for value in 0..10u64 {
        ring.push(Box::new(value));
        assert_eq!(ring.pop().as_deref(), Some(&value));
    }
}

#[test]
fn miri_push_vec_growth_and_drop_old() {
    let mut vec = PushVec::new(1);
    for value in 0..6u32 {
        vec.push_back(value.to_string());
    }
    assert_eq!(vec[5], "5");

    // No outstanding references; archived blocks can go.
    unsafe { vec.drop_old() };
    assert_eq!(vec[0], "0");
    assert_eq!(vec.len(), 6);
}

#[test]
fn miri_fanout_overwrite_drops_cleanly() {
    let daemon = Daemon::new();
    let queue = FanoutRing::<String>::new_in(&daemon.handle(), 1, 8);
    let mut sub = queue.subscribe();

    // Wrap the ring so cells are reused and old values dropped.
    let rounds = queue.capacity() * 2;
    for value in 0..rounds {
        queue.push(value.to_string());
        assert_eq!(sub.pop(), Some(value.to_string()));
    }
}
