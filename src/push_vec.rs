//! Single-producer / multi-consumer append-only vector.
//!
//! One producer appends; any number of readers index and iterate with
//! nothing more than an acquire load per access. The trick is archival:
//! when the active backing block fills up, the producer allocates a bigger
//! one, clones the prefix across, publishes the new block pointer, and
//! keeps the old block alive. A reference handed out before the growth
//! still points into the archived block, so readers never observe a moved
//! element and never pay a reference count or a CAS.
//!
//! The producer side is the owning [`PushVec`] handle (`&mut self`
//! operations, which is what makes the single-producer contract hold by
//! construction); readers get cheap [`PushVecReader`] clones.

use crate::cache::CachePadded;
use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ops::Index;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error returned when [`PushVec::resize`] is asked to shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot shrink from {len} to {requested} elements")]
pub struct ResizeError {
    /// The requested new length.
    pub requested: usize,
    /// The current length.
    pub len: usize,
}

/// One fixed-capacity backing allocation. The initialized prefix
/// `[0, init)` never moves and never shrinks while the block is alive.
struct Block<T> {
    data: NonNull<T>,
    cap: usize,
    init: usize,
}

impl<T> Block<T> {
    fn allocate(cap: usize) -> Self {
        if cap == 0 {
            return Self {
                data: NonNull::dangling(),
                cap: 0,
                init: 0,
            };
        }
        let layout = Layout::array::<T>(cap).expect("backing block layout overflows");
        assert!(layout.size() > 0, "zero-sized element types are not supported");
        // SAFETY: the layout was just checked to have nonzero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(data) = NonNull::new(raw.cast::<T>()) else {
            alloc::handle_alloc_error(layout);
        };
        Self { data, cap, init: 0 }
    }
}

impl<T> Drop for Block<T> {
    fn drop(&mut self) {
        unsafe {
            // Drop the initialized prefix, then the storage.
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.data.as_ptr(), self.init));
            if self.cap > 0 {
                let layout = Layout::array::<T>(self.cap).unwrap();
                alloc::dealloc(self.data.as_ptr().cast(), layout);
            }
        }
    }
}

/// State shared between the producer handle and all reader handles.
struct Shared<T> {
    /// Data pointer of the active block; readers index through this.
    current: AtomicPtr<T>,
    /// Published logical length.
    size: CachePadded<AtomicUsize>,
    /// All backing blocks, newest last. Mutated only through the producer
    /// handle; readers never touch it.
    blocks: UnsafeCell<Vec<Block<T>>>,
    _marker: PhantomData<T>,
}

// Readers hand out `&T` across threads and the last handle (whichever
// thread it lives on) drops the elements.
unsafe impl<T: Send + Sync> Send for Shared<T> {}
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    #[inline]
    fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len() {
            return None;
        }
        // SAFETY: `index < size` was published after the element (and, on
        // growth, the block pointer) with release stores; the acquire loads
        // here pair with them. The block stays alive while any handle does.
        Some(unsafe { &*self.current.load(Ordering::Acquire).add(index) })
    }

    /// # Safety
    ///
    /// `index` must be below a previously observed `len()`.
    #[inline]
    unsafe fn get_unchecked(&self, index: usize) -> &T {
        &*self.current.load(Ordering::Acquire).add(index)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        // Blocks (and their initialized prefixes) go with the last handle.
        self.blocks.get_mut().clear();
    }
}

/// Append-only vector with one producer and any number of readers.
///
/// Producer operations take `&mut self`; reading works through `&self` on
/// this handle or through any [`PushVecReader`].
///
/// ```
/// use ringfan::PushVec;
///
/// let mut vec = PushVec::new(4);
/// let reader = vec.reader();
/// vec.push_back(1);
/// vec.push_back(2);
/// assert_eq!(reader.len(), 2);
/// assert_eq!(reader[0], 1);
/// ```
pub struct PushVec<T> {
    shared: Arc<Shared<T>>,
}

impl<T> PushVec<T> {
    /// Creates an empty vector with room for `initial_capacity` elements
    /// before the first growth.
    pub fn new(initial_capacity: usize) -> Self {
        let block = Block::allocate(initial_capacity);
        let shared = Arc::new(Shared {
            current: AtomicPtr::new(block.data.as_ptr()),
            size: CachePadded::new(AtomicUsize::new(0)),
            blocks: UnsafeCell::new(vec![block]),
            _marker: PhantomData,
        });
        Self { shared }
    }

    /// A shareable read handle. Readers keep the backing storage alive even
    /// if the producer handle is dropped first.
    pub fn reader(&self) -> PushVecReader<T> {
        PushVecReader {
            shared: Arc::clone(&self.shared),
        }
    }

    // ---------------------------------------------------------------------
    // Producer API
    // ---------------------------------------------------------------------

    fn blocks(&self) -> &[Block<T>] {
        // SAFETY: only the unique producer handle reaches this cell, and
        // producer methods take `&self`/`&mut self` on that handle, so the
        // usual borrow rules serialize every access.
        unsafe { &*self.shared.blocks.get() }
    }

    fn blocks_mut(&mut self) -> &mut Vec<Block<T>> {
        // SAFETY: as above, plus `&mut self` for the mutation paths.
        unsafe { &mut *self.shared.blocks.get() }
    }

    fn active(&self) -> &Block<T> {
        self.blocks().last().expect("a backing block always exists")
    }

    /// Capacity of the active backing block.
    pub fn capacity(&self) -> usize {
        self.active().cap
    }

    /// Appends `value`, growing (and archiving the old block) when the
    /// active block is full.
    pub fn push_back(&mut self, value: T)
    where
        T: Clone,
    {
        let len = self.len();
        if len >= self.capacity() {
            self.grow((self.capacity() * 2).max(1));
        }
        let active = self.blocks_mut().last_mut().expect("a backing block always exists");
        // SAFETY: `len < cap` after the growth check and slot `len` of the
        // active block is uninitialized until the size store below.
        unsafe { active.data.as_ptr().add(len).write(value) };
        active.init = len + 1;
        self.shared.size.store(len + 1, Ordering::Release);
    }

    /// Ensures capacity for at least `elements` without changing the
    /// length. Growth archives the previous block so outstanding references
    /// stay valid.
    pub fn reserve(&mut self, elements: usize)
    where
        T: Clone,
    {
        if self.capacity() < elements {
            self.grow(elements);
        }
    }

    /// Grows the length to `elements`, default-constructing the new tail.
    /// Shrinking is refused.
    pub fn resize(&mut self, elements: usize) -> Result<(), ResizeError>
    where
        T: Clone + Default,
    {
        let len = self.len();
        if elements < len {
            return Err(ResizeError {
                requested: elements,
                len,
            });
        }
        self.reserve(elements);
        let active = self.blocks_mut().last_mut().expect("a backing block always exists");
        for index in len..elements {
            // SAFETY: within capacity after the reserve; slots at and above
            // `len` are uninitialized.
            unsafe { active.data.as_ptr().add(index).write(T::default()) };
            active.init = index + 1;
        }
        self.shared.size.store(elements, Ordering::Release);
        Ok(())
    }

    /// Discards every archived block, keeping only the active one.
    ///
    /// # Safety
    ///
    /// No reader may still hold a reference (or a live iterator position)
    /// into a block that was retired by an earlier growth; such references
    /// dangle the moment this returns. Callers synchronize that externally.
    pub unsafe fn drop_old(&mut self) {
        let blocks = self.blocks_mut();
        let active = blocks.pop().expect("a backing block always exists");
        blocks.clear();
        blocks.push(active);
    }

    /// Allocates a block of capacity `new_cap`, clones the live prefix into
    /// it, and publishes it as the active block. The old block is retired
    /// into the archive, not freed.
    fn grow(&mut self, new_cap: usize)
    where
        T: Clone,
    {
        let len = self.len();
        let mut block: Block<T> = Block::allocate(new_cap);
        {
            let old = self.active();
            for index in 0..len {
                // SAFETY: `[0, len)` of the old block is initialized; the
                // new block has room (new_cap > old cap >= len). `init` is
                // kept current so a panicking clone drops what was copied.
                unsafe {
                    block
                        .data
                        .as_ptr()
                        .add(index)
                        .write((*old.data.as_ptr().add(index)).clone());
                }
                block.init = index + 1;
            }
        }
        self.shared.current.store(block.data.as_ptr(), Ordering::Release);
        self.blocks_mut().push(block);
    }

    // ---------------------------------------------------------------------
    // Read API (same view a reader handle gets)
    // ---------------------------------------------------------------------

    /// Published length, with acquire ordering.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference into the currently published block, or `None` past the
    /// end.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.shared.get(index)
    }

    /// # Safety
    ///
    /// `index` must be below a previously observed [`len`](Self::len).
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        self.shared.get_unchecked(index)
    }

    /// Forward iterator over the elements published at the time of the
    /// call. Elements appended afterwards are not visited; re-create the
    /// iterator to pick them up.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            shared: &self.shared,
            index: 0,
            end: self.len(),
        }
    }
}

impl<T> Default for PushVec<T> {
    fn default() -> Self {
        Self::new(256)
    }
}

impl<T> Index<usize> for PushVec<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index).expect("index past published length")
    }
}

impl<'a, T> IntoIterator for &'a PushVec<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Shared read handle onto a [`PushVec`]. Cheap to clone and `Send` when
/// the element type allows it.
pub struct PushVecReader<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PushVecReader<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> PushVecReader<T> {
    /// Published length, with acquire ordering.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference into the currently published block, or `None` past the
    /// end. The reference stays valid across producer growth (the old block
    /// is archived) until [`PushVec::drop_old`].
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.shared.get(index)
    }

    /// # Safety
    ///
    /// `index` must be below a previously observed [`len`](Self::len).
    #[inline]
    pub unsafe fn get_unchecked(&self, index: usize) -> &T {
        self.shared.get_unchecked(index)
    }

    /// Forward iterator over the elements published at the time of the
    /// call; concurrent appends are not visited.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            shared: &self.shared,
            index: 0,
            end: self.len(),
        }
    }
}

impl<T> Index<usize> for PushVecReader<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        self.get(index).expect("index past published length")
    }
}

impl<'a, T> IntoIterator for &'a PushVecReader<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Index-based forward iterator with the end captured at construction.
pub struct Iter<'a, T> {
    shared: &'a Shared<T>,
    index: usize,
    end: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.index >= self.end {
            return None;
        }
        // SAFETY: `index < end <= len` as captured at construction, and
        // `len` never decreases.
        let item = unsafe { self.shared.get_unchecked(self.index) };
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end - self.index;
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
