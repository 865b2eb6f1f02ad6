//! Thread-safe allocator context and the process-wide facade.
//!
//! An [`AllocatorContext`] is an explicit, injectable handle: construct
//! one and pass it by reference to every consumer. All operations take a
//! single lock for their full duration, so allocator traffic from any
//! number of threads is totally ordered. For code that wants the classic
//! "one allocator per process" shape, [`global`] lazily constructs a
//! shared context exactly once and hands out the same reference forever.

use std::ptr::NonNull;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::error::AllocResult;
use crate::pool::allocator::{PoolCounts, PoolEvent, SizeClassAllocator, TrafficStats};
use crate::pool::size_class::SizeClass;

/// Shared, lock-serialized allocator.
///
/// The context owns the entire allocator state; nothing below it is safe
/// to touch from multiple threads without this lock, and nothing below it
/// is reachable from outside. A call that cannot take the lock blocks
/// indefinitely; there are no timeouts and no cancellation.
pub struct AllocatorContext {
    inner: Mutex<SizeClassAllocator>,
}

impl AllocatorContext {
    /// Builds a context with the given initial per-class pool counts.
    ///
    /// # Errors
    ///
    /// [`crate::AllocError::OutOfMemory`] if any class's first pool
    /// cannot be created.
    pub fn new(counts: PoolCounts) -> AllocResult<Self> {
        Ok(Self {
            inner: Mutex::new(SizeClassAllocator::new(counts)?),
        })
    }

    /// Builds a context with the default pool counts.
    ///
    /// # Errors
    ///
    /// Same as [`AllocatorContext::new`].
    pub fn with_defaults() -> AllocResult<Self> {
        Self::new(PoolCounts::default())
    }

    /// Allocates `size` bytes. See
    /// [`SizeClassAllocator::allocate`](crate::pool::allocator::SizeClassAllocator::allocate).
    ///
    /// # Errors
    ///
    /// [`crate::AllocError`] when the request is zero-sized or memory is
    /// exhausted.
    pub fn allocate(&self, size: usize) -> AllocResult<NonNull<u8>> {
        self.inner.lock().allocate(size)
    }

    /// Frees `ptr` with the exact `size` it was allocated with. The size
    /// contract is unchecked; see the pool allocator's module docs.
    pub fn deallocate(&self, ptr: NonNull<u8>, size: usize) {
        self.inner.lock().deallocate(ptr, size);
    }

    /// Element count the class will use for its next pool.
    pub fn elements_per_pool(&self, class: SizeClass) -> usize {
        self.inner.lock().elements_per_pool(class)
    }

    /// Sets the element count the class uses for pools created from now
    /// on.
    pub fn set_elements_per_pool(&self, class: SizeClass, count: usize) {
        self.inner.lock().set_elements_per_pool(class, count);
    }

    /// Number of allocations currently live across all classes and the
    /// oversized path.
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding()
    }

    /// Snapshot of the cumulative traffic counters.
    pub fn stats(&self) -> TrafficStats {
        self.inner.lock().stats()
    }

    /// Takes all recorded pool lifecycle events.
    pub fn drain_events(&self) -> Vec<PoolEvent> {
        self.inner.lock().drain_events()
    }

    /// Re-walks every pool under the lock and checks all structural
    /// invariants.
    pub fn verify_integrity(&self) -> bool {
        self.inner.lock().verify_integrity()
    }
}

/// The process-wide allocator context.
///
/// Constructed on first use, from whichever thread gets here first; all
/// racers block until that one construction finishes. The context is
/// never torn down, so allocations may legitimately outlive `main`.
///
/// # Panics
///
/// Panics if the initial pools cannot be allocated. A process that cannot
/// construct its allocator cannot run; there is no caller to hand the
/// error to.
pub fn global() -> &'static AllocatorContext {
    static CONTEXT: OnceLock<AllocatorContext> = OnceLock::new();
    CONTEXT.get_or_init(|| match AllocatorContext::with_defaults() {
        Ok(context) => context,
        Err(err) => panic!("process-wide allocator construction failed: {err}"),
    })
}
