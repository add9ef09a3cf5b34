//! Property-based tests for the ring protocols.
//!
//! Random operation sequences are replayed against a model deque; the
//! containers must stay prefix-identical with the model and never exceed
//! their usable depth.

use proptest::prelude::*;
use ringfan::{Exact, LineBuffer, MpscRing, Pow2, PushVec, SpscRing};
use std::collections::VecDeque;

proptest! {
    /// The consumer sees exactly the producer's sequence, in order.
    #[test]
    fn spsc_matches_a_model_deque(ops in prop::collection::vec(prop::bool::ANY, 1..200)) {
        let ring = SpscRing::<u64>::new(1, 32);
        let usable = ring.capacity() - 1;
        let mut model = VecDeque::new();
        let mut next_value = 0u64;

        for push_op in ops {
            if push_op {
                // A full ring would spin forever single-threaded; the model
                // only pushes while space remains.
                if model.len() < usable {
                    ring.push(next_value);
                    model.push_back(next_value);
                    next_value += 1;
                }
            } else {
                prop_assert_eq!(ring.pop(), model.pop_front());
            }
            prop_assert_eq!(ring.len(), model.len());
            prop_assert!(ring.len() <= usable);
        }

        // Drain: still prefix-identical.
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(ring.pop(), Some(expected));
        }
        prop_assert_eq!(ring.pop(), None);
    }

    /// Same contract for the barrier-backed ring driven from one thread.
    #[test]
    fn mpsc_matches_a_model_deque(ops in prop::collection::vec(prop::bool::ANY, 1..200)) {
        let ring = MpscRing::<u64, Exact>::new(1, 24);
        let usable = ring.capacity() - 1;
        let mut model = VecDeque::new();
        let mut next_value = 0u64;

        for push_op in ops {
            if push_op {
                if model.len() < usable {
                    ring.push(next_value);
                    model.push_back(next_value);
                    next_value += 1;
                }
            } else {
                prop_assert_eq!(ring.pop(), model.pop_front());
            }
            prop_assert!(ring.len() <= usable);
        }
    }

    /// Every monotone index maps to a distinct cell within one capacity
    /// window, and to the same cell one window later.
    #[test]
    fn line_buffer_cells_are_a_bijection(min_lanes in 1usize..8, min_elems in 0usize..64) {
        fn check<P: ringfan::PackPolicy>(min_lanes: usize, min_elems: usize) {
            let buffer = LineBuffer::<u32, P>::new(min_lanes, min_elems);
            let capacity = buffer.len() as u64;
            let mut seen = std::collections::HashSet::new();
            for index in 0..capacity {
                assert!(seen.insert(buffer.slot(index) as usize));
                assert_eq!(buffer.slot(index), buffer.slot(index + capacity));
            }
        }
        check::<Exact>(min_lanes, min_elems);
        check::<Pow2>(min_lanes, min_elems);
    }

    /// Published length is exact for the producer and never decreases.
    #[test]
    fn push_vec_length_tracks_pushes(values in prop::collection::vec(prop::num::u32::ANY, 0..100)) {
        let mut vec = PushVec::new(1);
        for (index, value) in values.iter().enumerate() {
            vec.push_back(*value);
            prop_assert_eq!(vec.len(), index + 1);
        }
        for (index, value) in values.iter().enumerate() {
            prop_assert_eq!(vec[index], *value);
        }
    }
}
