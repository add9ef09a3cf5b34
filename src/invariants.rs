//! Debug-build assertion macros for the counter protocols.
//!
//! Active only under `debug_assertions`; release builds compile them away.
//! The rings and the write barrier use these to catch protocol violations
//! (a cursor running past a frontier, a slot read outside the committed
//! range) at the point where they happen instead of as corrupted data later.

/// Assert that a ring never holds more than `capacity` elements.
///
/// Checked by producers right after winning a slot: the distance between
/// the reserved index and the consumer cursor must be below capacity.
macro_rules! debug_assert_bounded_depth {
    ($depth:expr, $capacity:expr) => {
        debug_assert!(
            ($depth) < $capacity as u64,
            "ring depth {} reached capacity {}",
            $depth,
            $capacity
        )
    };
}

/// Assert that a consumer only reads slots below the published frontier.
macro_rules! debug_assert_readable {
    ($pos:expr, $frontier:expr) => {
        debug_assert!(
            $pos < $frontier,
            "reading slot {} at or past the published frontier {}",
            $pos,
            $frontier
        )
    };
}

/// Assert that a failed commit observed a read head at or below the index
/// being committed; the head overtaking an uncommitted reservation means a
/// double commit or a foreign advance.
macro_rules! debug_assert_commit_pending {
    ($observed:expr, $index:expr) => {
        debug_assert!(
            $observed <= $index,
            "read head {} ran past uncommitted index {}",
            $observed,
            $index
        )
    };
}

pub(crate) use debug_assert_bounded_depth;
pub(crate) use debug_assert_commit_pending;
pub(crate) use debug_assert_readable;
