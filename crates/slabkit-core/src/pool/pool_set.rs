//! Growable set of same-shaped slab pools.
//!
//! A `PoolSet` owns every pool for one element size, kept sorted by
//! ascending buffer base address so a freed pointer can be routed back to
//! its owning pool with a lower-bound search. One pool is always the
//! allocation target; the set grows when the target runs dry and sheds a
//! pool once it is entirely free again (but never drops to zero pools).

use std::ops::Range;
use std::ptr::NonNull;

use crate::error::{AllocError, AllocResult};
use crate::pool::slab::SlabPool;

/// Address-sorted collection of [`SlabPool`]s sharing one element shape.
pub struct PoolSet {
    element_size: usize,
    /// Element count applied to pools created from now on. Existing pools
    /// keep the count they were built with.
    elements_per_pool: usize,
    /// Invariant: non-empty, strictly sorted by base address, spans
    /// pairwise disjoint.
    pools: Vec<SlabPool>,
    /// Index of the current allocation target in `pools`.
    target: usize,
}

impl PoolSet {
    /// Creates the set with its first pool.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] if the initial pool's buffer cannot be
    /// acquired.
    pub fn new(element_size: usize, elements_per_pool: usize) -> AllocResult<Self> {
        let first = SlabPool::new(element_size, elements_per_pool)?;
        Ok(Self {
            element_size: first.element_size(),
            elements_per_pool: first.capacity(),
            pools: vec![first],
            target: 0,
        })
    }

    /// Hands out one element, growing the set if the target is exhausted.
    ///
    /// # Errors
    ///
    /// [`AllocError::OutOfMemory`] if a replacement pool cannot be
    /// created. Exhaustion of an individual pool is handled internally and
    /// never surfaces.
    pub fn allocate(&mut self) -> AllocResult<NonNull<u8>> {
        if self.pools[self.target].free_count() == 0 {
            self.grow()?;
        }
        match self.pools[self.target].allocate() {
            Some(ptr) => Ok(ptr),
            // Unreachable: the target either had free elements or was just
            // replaced by a fresh pool with at least one.
            None => Err(AllocError::OutOfMemory {
                size: self.element_size,
            }),
        }
    }

    /// Returns an element to its owning pool.
    ///
    /// The owner is found by lower-bound search over the sorted pool
    /// sequence. Pointers outside every managed span are silently ignored.
    /// A pool that becomes entirely free is evicted, unless it is the last
    /// one; the target is then repaired to the pool with the most free
    /// elements.
    pub fn deallocate(&mut self, ptr: NonNull<u8>) {
        let addr = ptr.as_ptr() as usize;
        let Some(idx) = self.owner_index(addr) else {
            return;
        };
        self.pools[idx].deallocate(ptr);

        if self.pools[idx].is_unused() && self.pools.len() > 1 {
            self.pools.remove(idx);
            if self.target == idx {
                self.target = self.most_free_pool();
            } else if self.target > idx {
                self.target -= 1;
            }
        }
    }

    /// Index of the pool whose span contains `addr`, if any.
    pub fn owner_index(&self, addr: usize) -> Option<usize> {
        // Rightmost pool whose base address is <= addr. Correct because
        // spans are disjoint and sorted.
        let idx = self.pools.partition_point(|p| p.base_addr() <= addr);
        let idx = idx.checked_sub(1)?;
        self.pools[idx].contains(addr).then_some(idx)
    }

    /// Element size shared by every pool in the set.
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Element count used for the next pool created.
    pub fn elements_per_pool(&self) -> usize {
        self.elements_per_pool
    }

    /// Sets the element count for pools created from now on. Coerced up
    /// to at least 1; existing pools are unaffected.
    pub fn set_elements_per_pool(&mut self, count: usize) {
        self.elements_per_pool = count.max(1);
    }

    /// Number of pools currently owned.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Sum of free elements across all pools.
    pub fn free_elements(&self) -> usize {
        self.pools.iter().map(SlabPool::free_count).sum()
    }

    /// Sum of element capacity across all pools.
    pub fn capacity(&self) -> usize {
        self.pools.iter().map(SlabPool::capacity).sum()
    }

    /// Number of elements currently handed out.
    pub fn in_use(&self) -> usize {
        self.capacity() - self.free_elements()
    }

    /// Address spans of all pools, in base-address order.
    pub fn pool_spans(&self) -> Vec<Range<usize>> {
        self.pools.iter().map(SlabPool::address_range).collect()
    }

    /// Per-pool element capacities, in base-address order.
    pub fn pool_capacities(&self) -> Vec<usize> {
        self.pools.iter().map(SlabPool::capacity).collect()
    }

    /// Checks every structural invariant of the set.
    ///
    /// Verifies the sequence is non-empty and strictly sorted with
    /// disjoint spans, the target index is valid, and each pool's free
    /// list re-walks to exactly its free count.
    pub fn verify_integrity(&self) -> bool {
        if self.pools.is_empty() || self.target >= self.pools.len() {
            return false;
        }
        for pair in self.pools.windows(2) {
            if pair[0].address_range().end > pair[1].base_addr() {
                return false;
            }
        }
        self.pools
            .iter()
            .all(|p| p.free_list_len() == Some(p.free_count()))
    }

    fn grow(&mut self) -> AllocResult<()> {
        let pool = SlabPool::new(self.element_size, self.elements_per_pool)?;
        let at = self
            .pools
            .partition_point(|p| p.base_addr() < pool.base_addr());
        self.pools.insert(at, pool);
        self.target = at;
        Ok(())
    }

    /// Index of the pool with the most free elements. Ties resolve to the
    /// later pool; the choice only matters for allocation locality.
    fn most_free_pool(&self) -> usize {
        self.pools
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.free_count())
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn exhausting_target_grows_the_set() {
        let mut set = PoolSet::new(16, 2).expect("set");
        assert_eq!(set.pool_count(), 1);
        let _a = set.allocate().expect("a");
        let _b = set.allocate().expect("b");
        let _c = set.allocate().expect("c");
        assert_eq!(set.pool_count(), 2);
        assert!(set.verify_integrity());
    }

    #[test]
    fn frees_route_to_the_owning_pool() {
        let mut set = PoolSet::new(32, 2).expect("set");
        // Record each pointer's producing pool by its span: spans are a
        // stable pool identity even as later growth reshuffles indices.
        let mut produced: Vec<(NonNull<u8>, Range<usize>)> = Vec::new();
        for _ in 0..6 {
            let ptr = set.allocate().expect("element");
            let addr = ptr.as_ptr() as usize;
            let owner = set.owner_index(addr).expect("freshly allocated pointer");
            produced.push((ptr, set.pool_spans()[owner].clone()));
        }
        assert_eq!(set.pool_count(), 3);

        // A free on the exact pointer resolves to the pool that produced
        // it.
        for (ptr, span) in produced {
            let addr = ptr.as_ptr() as usize;
            let owner = set.owner_index(addr).expect("still owned");
            assert_eq!(set.pool_spans()[owner], span);
            set.deallocate(ptr);
        }
        assert_eq!(set.in_use(), 0);
    }

    #[test]
    fn sequence_stays_sorted_and_nonempty_under_traffic() {
        let mut set = PoolSet::new(16, 4).expect("set");
        let mut live = Vec::new();
        let mut rng = 0x9E37_79B9_7F4A_7C15u64;
        for _ in 0..500 {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            if rng % 3 != 0 || live.is_empty() {
                live.push(set.allocate().expect("allocate"));
            } else {
                let idx = (rng as usize >> 8) % live.len();
                set.deallocate(live.swap_remove(idx));
            }
            assert!(set.verify_integrity());
            assert!(set.pool_count() >= 1);
        }
        for ptr in live {
            set.deallocate(ptr);
        }
        assert!(set.verify_integrity());
        assert_eq!(set.free_elements(), set.capacity());
    }

    #[test]
    fn fully_free_pool_is_evicted_and_addresses_retired() {
        let mut set = PoolSet::new(16, 2).expect("set");
        let a = set.allocate().expect("a");
        let b = set.allocate().expect("b");
        let c = set.allocate().expect("c");
        assert_eq!(set.pool_count(), 2);

        let first_owner = set.owner_index(a.as_ptr() as usize).expect("owner of a");
        let first_span = set.pool_spans()[first_owner].clone();

        set.deallocate(a);
        set.deallocate(b);
        // First pool became empty while the second still existed.
        assert_eq!(set.pool_count(), 1);
        assert!(set.verify_integrity());

        // The survivor is the pool that served `c`.
        assert!(set.owner_index(c.as_ptr() as usize).is_some());

        // The survivor still has a free element, so the next allocation
        // comes from it, not from the evicted span (the two spans were
        // disjoint while both pools were alive).
        let d = set.allocate().expect("d");
        assert_eq!(set.pool_count(), 1);
        assert!(set.pool_spans()[0].contains(&(d.as_ptr() as usize)));
        assert!(!first_span.contains(&(d.as_ptr() as usize)));

        set.deallocate(c);
        set.deallocate(d);
        assert_eq!(set.pool_count(), 1);
    }

    #[test]
    fn last_pool_is_never_evicted() {
        let mut set = PoolSet::new(64, 3).expect("set");
        let ptrs: Vec<_> = (0..3).map(|_| set.allocate().expect("element")).collect();
        for ptr in ptrs {
            set.deallocate(ptr);
        }
        assert_eq!(set.pool_count(), 1);
        assert_eq!(set.free_elements(), 3);
    }

    #[test]
    fn foreign_pointer_does_not_corrupt_state() {
        let mut set = PoolSet::new(16, 2).expect("set");
        let keep = set.allocate().expect("element");
        let local = 0u64;
        set.deallocate(NonNull::from(&local).cast());
        assert!(set.verify_integrity());
        assert_eq!(set.in_use(), 1);
        set.deallocate(keep);
        assert_eq!(set.in_use(), 0);
    }

    #[test]
    fn element_count_change_applies_to_future_pools_only() {
        let mut set = PoolSet::new(16, 2).expect("set");
        set.set_elements_per_pool(5);
        assert_eq!(set.pool_capacities(), vec![2]);

        let _a = set.allocate().expect("a");
        let _b = set.allocate().expect("b");
        let _c = set.allocate().expect("c");
        let mut caps = set.pool_capacities();
        caps.sort_unstable();
        assert_eq!(caps, vec![2, 5]);
    }

    #[test]
    fn set_coerces_element_count_to_one() {
        let mut set = PoolSet::new(16, 4).expect("set");
        set.set_elements_per_pool(0);
        assert_eq!(set.elements_per_pool(), 1);
    }

    #[test]
    fn unique_addresses_across_pools() {
        let mut set = PoolSet::new(16, 3).expect("set");
        let mut seen = HashSet::new();
        let ptrs: Vec<_> = (0..10).map(|_| set.allocate().expect("element")).collect();
        for &ptr in &ptrs {
            assert!(seen.insert(ptr.as_ptr() as usize), "duplicate address");
        }
        for ptr in ptrs {
            set.deallocate(ptr);
        }
        assert_eq!(set.in_use(), 0);
    }
}
