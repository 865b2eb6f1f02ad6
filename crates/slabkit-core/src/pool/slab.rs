//! Fixed-size slab pool.
//!
//! One contiguous buffer sliced into `element_count` elements of
//! `element_size` bytes each. Unused elements are threaded into a
//! singly-linked free list stored inside the elements themselves: the
//! first word of a free element holds the *index* of the next free
//! element rather than its address, so list maintenance never does
//! pointer arithmetic on user data. Allocate and free are O(1).

use std::alloc::{self, Layout};
use std::ops::Range;
use std::ptr::{self, NonNull};

use crate::error::{AllocError, AllocResult};

/// Free-list terminator index.
const NIL: usize = usize::MAX;

/// Buffer alignment. Covers the free-list word and every ladder class.
pub(crate) const POOL_ALIGN: usize = 16;

/// A single fixed-size memory pool.
///
/// The pool owns its buffer exclusively; elements handed out by
/// [`SlabPool::allocate`] are opaque to the pool until returned via
/// [`SlabPool::deallocate`].
pub struct SlabPool {
    element_size: usize,
    element_count: usize,
    base: NonNull<u8>,
    layout: Layout,
    /// Index of the first free element, `NIL` when exhausted.
    free_head: usize,
    free_count: usize,
}

// SAFETY: the pool is the sole owner of its buffer. Nothing in it is tied
// to the constructing thread, so moving the pool between threads is sound.
unsafe impl Send for SlabPool {}

impl SlabPool {
    /// Creates a pool of `element_count` elements of `element_size` bytes.
    ///
    /// `element_size` is coerced up to at least one word (the free-list
    /// link must fit inside a free element) and `element_count` up to at
    /// least 1. The buffer is acquired once and never resized.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] if the system allocator cannot provide
    /// the buffer.
    pub fn new(element_size: usize, element_count: usize) -> AllocResult<Self> {
        let element_size = element_size.max(size_of::<usize>());
        let element_count = element_count.max(1);

        let buffer_size = element_size
            .checked_mul(element_count)
            .ok_or(AllocError::OutOfMemory { size: usize::MAX })?;
        let layout = Layout::from_size_align(buffer_size, POOL_ALIGN)
            .map_err(|_| AllocError::OutOfMemory { size: buffer_size })?;

        // SAFETY: `layout` has non-zero size (element_size and
        // element_count are both at least 1).
        let raw = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size: buffer_size })?;

        let mut pool = Self {
            element_size,
            element_count,
            base,
            layout,
            free_head: NIL,
            free_count: element_count,
        };

        // Thread every element into the free list. Each element written
        // becomes the new head, so the list ends up in reverse buffer
        // order; callers may not rely on any particular order.
        for idx in 0..element_count {
            // SAFETY: `idx` is in range, so the element starts inside the
            // buffer and has at least one word of space for the link.
            unsafe {
                ptr::write_unaligned(pool.element_ptr(idx).cast::<usize>(), pool.free_head);
            }
            pool.free_head = idx;
        }

        Ok(pool)
    }

    /// Pops one element off the free list.
    ///
    /// Returns `None` without side effects when the pool is exhausted.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if self.free_head == NIL {
            return None;
        }
        let idx = self.free_head;
        let elem = self.element_ptr(idx);
        // SAFETY: `idx` came from the free list, which only ever holds
        // in-range indices; the element is free, so its first word is the
        // link we wrote.
        self.free_head = unsafe { ptr::read_unaligned(elem.cast::<usize>()) };
        self.free_count -= 1;
        // SAFETY: `elem` is derived from the non-null buffer base.
        Some(unsafe { NonNull::new_unchecked(elem) })
    }

    /// Pushes an element back onto the free list.
    ///
    /// A pointer outside the pool's address span is silently ignored; the
    /// owning manager routes frees by range, and this check is the last
    /// line of defense against a misrouted pointer.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        if !self.contains(addr) {
            return;
        }
        let offset = addr - self.base_addr();
        debug_assert_eq!(offset % self.element_size, 0, "free of interior pointer");
        let idx = offset / self.element_size;
        // SAFETY: `idx` is in range because `addr` is inside the buffer;
        // the element is being returned to the pool, so overwriting its
        // first word with the link is allowed.
        unsafe {
            ptr::write_unaligned(self.element_ptr(idx).cast::<usize>(), self.free_head);
        }
        self.free_head = idx;
        self.free_count += 1;
    }

    /// Number of elements currently on the free list.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Total number of elements the pool manages.
    pub fn capacity(&self) -> usize {
        self.element_count
    }

    /// Size of one element in bytes (after coercion).
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Lowest address of the buffer.
    pub fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Half-open address span of the buffer.
    pub fn address_range(&self) -> Range<usize> {
        let base = self.base_addr();
        base..base + self.element_size * self.element_count
    }

    /// Whether `addr` falls inside the buffer.
    pub fn contains(&self, addr: usize) -> bool {
        self.address_range().contains(&addr)
    }

    /// Whether every element is free.
    pub fn is_unused(&self) -> bool {
        self.free_count == self.element_count
    }

    /// Walks the free list and returns the number of reachable nodes.
    ///
    /// Returns `None` if the list is corrupt: an out-of-range index, a
    /// node revisited (cycle), or more nodes than the pool has elements.
    pub fn free_list_len(&self) -> Option<usize> {
        let mut seen = vec![false; self.element_count];
        let mut len = 0usize;
        let mut idx = self.free_head;
        while idx != NIL {
            if idx >= self.element_count || seen[idx] {
                return None;
            }
            seen[idx] = true;
            len += 1;
            // SAFETY: `idx` was just bounds-checked; the element is free,
            // so its first word holds the next link.
            idx = unsafe { ptr::read_unaligned(self.element_ptr(idx).cast::<usize>()) };
        }
        Some(len)
    }

    fn element_ptr(&self, idx: usize) -> *mut u8 {
        debug_assert!(idx < self.element_count);
        // SAFETY: callers pass an in-range index, so the offset stays
        // inside the allocated buffer.
        unsafe { self.base.as_ptr().add(idx * self.element_size) }
    }
}

impl Drop for SlabPool {
    fn drop(&mut self) {
        // SAFETY: `base` was produced by `alloc::alloc` with exactly this
        // layout and is released exactly once.
        unsafe {
            alloc::dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn coerces_degenerate_shape_to_minimums() {
        let pool = SlabPool::new(1, 0).expect("pool");
        assert_eq!(pool.element_size(), size_of::<usize>());
        assert_eq!(pool.capacity(), 1);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn allocations_are_unique_until_exhausted() {
        let mut pool = SlabPool::new(32, 8).expect("pool");
        let mut addrs = HashSet::new();
        for _ in 0..8 {
            let ptr = pool.allocate().expect("element");
            assert!(pool.contains(ptr.as_ptr() as usize));
            assert!(addrs.insert(ptr.as_ptr() as usize), "duplicate address");
        }
        assert_eq!(pool.free_count(), 0);
        assert!(pool.allocate().is_none());
        // Exhaustion has no side effects.
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn free_count_returns_to_capacity_in_any_order() {
        let mut pool = SlabPool::new(16, 6).expect("pool");
        let ptrs: Vec<_> = (0..6).map(|_| pool.allocate().expect("element")).collect();
        // Interleaved order: evens forward, odds backward.
        for &p in ptrs.iter().step_by(2) {
            pool.deallocate(p);
        }
        for &p in ptrs.iter().skip(1).step_by(2).rev() {
            pool.deallocate(p);
        }
        assert_eq!(pool.free_count(), pool.capacity());
        assert!(pool.is_unused());
        assert_eq!(pool.free_list_len(), Some(6));
    }

    #[test]
    fn foreign_pointer_is_ignored() {
        let mut pool = SlabPool::new(16, 2).expect("pool");
        let local = 0u64;
        let foreign = NonNull::from(&local).cast::<u8>();
        pool.deallocate(foreign);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.free_list_len(), Some(2));
    }

    #[test]
    fn address_range_covers_every_element() {
        let mut pool = SlabPool::new(64, 4).expect("pool");
        let range = pool.address_range();
        assert_eq!(range.len(), 64 * 4);
        while let Some(ptr) = pool.allocate() {
            let addr = ptr.as_ptr() as usize;
            assert!(range.contains(&addr));
            assert!(range.contains(&(addr + 63)));
        }
    }

    #[test]
    fn reallocation_reuses_freed_elements() {
        let mut pool = SlabPool::new(32, 2).expect("pool");
        let a = pool.allocate().expect("a");
        let b = pool.allocate().expect("b");
        pool.deallocate(a);
        pool.deallocate(b);
        let c = pool.allocate().expect("c");
        assert!(c == a || c == b);
    }

    #[test]
    fn free_list_walk_matches_free_count_mid_traffic() {
        let mut pool = SlabPool::new(24, 10).expect("pool");
        let ptrs: Vec<_> = (0..10).map(|_| pool.allocate().expect("element")).collect();
        for &p in ptrs.iter().take(4) {
            pool.deallocate(p);
        }
        assert_eq!(pool.free_count(), 4);
        assert_eq!(pool.free_list_len(), Some(4));
    }
}
