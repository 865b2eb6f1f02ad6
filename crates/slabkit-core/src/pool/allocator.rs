//! Size-class segregated allocator.
//!
//! One [`PoolSet`] per ladder class; a request is served by the smallest
//! class that fits, and anything above the largest class goes straight to
//! the system allocator with no pooling and no per-block metadata.
//!
//! # The size contract
//!
//! No size is recorded per block anywhere in this allocator. `deallocate`
//! **must** receive the exact size passed to the matching `allocate`;
//! that value alone decides whether the pointer is routed to a pool class
//! or to the system allocator's free. A mismatched size is a contract
//! violation with undefined (non-crashing but incorrect) behavior. This
//! is a deliberate zero-overhead design: every consumer tracks its own
//! sizes, as the engine's containers do.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::pool::pool_set::PoolSet;
use crate::pool::size_class::{CLASS_SIZES, NUM_CLASSES, SizeClass};
use crate::pool::slab::POOL_ALIGN;

/// Initial pool element count for each ladder class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    /// Element counts indexed by [`SizeClass::index`].
    pub per_class: [usize; NUM_CLASSES],
}

impl PoolCounts {
    /// The same element count for every class.
    pub const fn uniform(count: usize) -> Self {
        Self {
            per_class: [count; NUM_CLASSES],
        }
    }
}

impl Default for PoolCounts {
    fn default() -> Self {
        Self::uniform(64)
    }
}

/// Cumulative traffic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrafficStats {
    /// Allocations served from a pool class.
    pub pooled_allocs: u64,
    /// Frees routed back to a pool class.
    pub pooled_frees: u64,
    /// Oversized allocations forwarded to the system allocator.
    pub oversize_allocs: u64,
    /// Oversized frees forwarded to the system allocator.
    pub oversize_frees: u64,
    /// Pools created because a class's target ran dry.
    pub pool_growths: u64,
    /// Fully-free pools released back to the system allocator.
    pub pool_evictions: u64,
}

/// Kind of pool lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEventKind {
    /// A class grew by one pool.
    PoolGrown,
    /// A class shed a fully-free pool.
    PoolEvicted,
}

/// A recorded pool lifecycle event.
///
/// Per-operation logging is deliberately absent: the allocator sits under
/// a process-wide lock and cannot afford to allocate log machinery of its
/// own, so only the rare pool-count transitions are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEvent {
    /// Class whose pool count changed.
    pub class: SizeClass,
    /// What happened.
    pub kind: PoolEventKind,
    /// Pool count of the class after the event.
    pub pool_count: usize,
}

/// Size-class dispatching allocator.
pub struct SizeClassAllocator {
    classes: [PoolSet; NUM_CLASSES],
    /// Oversized allocations currently live. Pooled accounting derives
    /// from the pools themselves.
    oversize_live: usize,
    stats: TrafficStats,
    events: Vec<PoolEvent>,
}

impl SizeClassAllocator {
    /// Creates one pool set per ladder class, each with the initial
    /// element count from `counts`.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] if any class's first pool cannot be
    /// created.
    pub fn new(counts: PoolCounts) -> AllocResult<Self> {
        let c = counts.per_class;
        let classes = [
            PoolSet::new(CLASS_SIZES[0], c[0])?,
            PoolSet::new(CLASS_SIZES[1], c[1])?,
            PoolSet::new(CLASS_SIZES[2], c[2])?,
            PoolSet::new(CLASS_SIZES[3], c[3])?,
            PoolSet::new(CLASS_SIZES[4], c[4])?,
        ];
        Ok(Self {
            classes,
            oversize_live: 0,
            stats: TrafficStats::default(),
            events: Vec::new(),
        })
    }

    /// Allocates `size` bytes.
    ///
    /// # Errors
    ///
    /// [`AllocError::ZeroSize`] for a zero-byte request,
    /// [`AllocError::OutOfMemory`] if pool growth or the system allocator
    /// fails. Never returns a dangling pointer on success.
    pub fn allocate(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        if size == 0 {
            return Err(AllocError::ZeroSize);
        }
        match SizeClass::for_size(size) {
            Some(class) => {
                let set = &mut self.classes[class.index()];
                let pools_before = set.pool_count();
                let ptr = set.allocate()?;
                let pools_after = set.pool_count();
                self.stats.pooled_allocs += 1;
                if pools_after > pools_before {
                    self.stats.pool_growths += 1;
                    self.events.push(PoolEvent {
                        class,
                        kind: PoolEventKind::PoolGrown,
                        pool_count: pools_after,
                    });
                }
                Ok(ptr)
            }
            None => self.allocate_oversize(size),
        }
    }

    /// Frees `ptr`, which must have been allocated with exactly `size`
    /// bytes (see the module docs for the size contract).
    pub fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        if size == 0 {
            // No zero-byte allocation ever succeeds, so there is nothing
            // this pointer could refer to.
            return;
        }
        match SizeClass::for_size(size) {
            Some(class) => {
                let set = &mut self.classes[class.index()];
                let pools_before = set.pool_count();
                set.deallocate(ptr);
                let pools_after = set.pool_count();
                self.stats.pooled_frees += 1;
                if pools_after < pools_before {
                    self.stats.pool_evictions += 1;
                    self.events.push(PoolEvent {
                        class,
                        kind: PoolEventKind::PoolEvicted,
                        pool_count: pools_after,
                    });
                }
            }
            None => {
                // A size no layout accepts was never allocated; ignore it
                // like any other clearly-foreign free.
                let Ok(layout) = Self::oversize_layout(size) else {
                    return;
                };
                // SAFETY: by the size contract, `ptr` came from
                // `allocate_oversize(size)`, which used this exact layout.
                unsafe {
                    alloc::dealloc(ptr.as_ptr(), layout);
                }
                self.oversize_live = self.oversize_live.saturating_sub(1);
                self.stats.oversize_frees += 1;
            }
        }
    }

    /// Element count used for the next pool the class creates.
    pub fn elements_per_pool(&self, class: SizeClass) -> usize {
        self.classes[class.index()].elements_per_pool()
    }

    /// Sets the element count for pools the class creates from now on.
    /// Existing pools keep their size.
    pub fn set_elements_per_pool(&mut self, class: SizeClass, count: usize) {
        self.classes[class.index()].set_elements_per_pool(count);
    }

    /// Read-only view of one class's pool set.
    pub fn class(&self, class: SizeClass) -> &PoolSet {
        &self.classes[class.index()]
    }

    /// Total allocations currently live: pooled elements in use plus
    /// oversized blocks not yet freed.
    pub fn outstanding(&self) -> usize {
        let pooled: usize = self.classes.iter().map(PoolSet::in_use).sum();
        pooled + self.oversize_live
    }

    /// Cumulative traffic counters.
    pub fn stats(&self) -> TrafficStats {
        self.stats
    }

    /// Takes all recorded pool lifecycle events.
    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Re-walks every pool of every class and checks all structural
    /// invariants.
    pub fn verify_integrity(&self) -> bool {
        self.classes.iter().all(PoolSet::verify_integrity)
    }

    fn allocate_oversize(&mut self, size: usize) -> AllocResult<NonNull<u8>> {
        let layout = Self::oversize_layout(size)?;
        // SAFETY: `size` is non-zero here, so the layout has non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(raw).ok_or(AllocError::OutOfMemory { size })?;
        self.oversize_live += 1;
        self.stats.oversize_allocs += 1;
        Ok(ptr)
    }

    /// Layout for an oversized block. Rebuilt from the size at free time;
    /// this only works because the size contract forbids mismatches.
    fn oversize_layout(size: usize) -> AllocResult<Layout> {
        debug_assert!(size > 0);
        Layout::from_size_align(size, POOL_ALIGN)
            .map_err(|_| AllocError::OutOfMemory { size })
    }
}
