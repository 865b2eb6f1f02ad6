//! Pooled allocation stack.
//!
//! Layered bottom-up:
//! - [`slab`]: one fixed-size buffer with an index-threaded free list.
//! - [`pool_set`]: a sorted, growable set of same-shaped slabs with
//!   address-ownership routing for frees.
//! - [`size_class`]: the fixed request-size ladder.
//! - [`allocator`]: per-class pool sets plus the oversized passthrough.

pub mod allocator;
pub mod pool_set;
pub mod size_class;
pub mod slab;

pub use allocator::{PoolCounts, PoolEvent, PoolEventKind, SizeClassAllocator, TrafficStats};
pub use pool_set::PoolSet;
pub use size_class::{CLASS_SIZES, MAX_POOLED_SIZE, NUM_CLASSES, SizeClass};
pub use slab::SlabPool;
