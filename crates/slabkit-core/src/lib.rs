//! # slabkit-core
//!
//! Pooled, size-class-segregated allocation core for engine runtimes.
//! Replaces general-purpose heap traffic for small objects with O(1)
//! fixed-size pools: requests are routed to the smallest class of a fixed
//! ladder (16/32/64/128/256 bytes), each class grows and sheds
//! same-shaped slab pools on demand, and anything above the ladder is
//! passed through to the system allocator.
//!
//! ## The size contract
//!
//! **No per-block size metadata exists anywhere in this crate.**
//! [`AllocatorContext::deallocate`] must be called with the exact size
//! given to the matching `allocate`; the size alone selects the pool
//! class (or the oversized path) for the free. Passing a different size
//! is undefined behavior that no layer detects. Consumers track their
//! allocation sizes themselves, the way containers already know their
//! capacities.
//!
//! ## Concurrency
//!
//! [`AllocatorContext`] serializes every operation behind one lock, so
//! allocator traffic has a single process-wide linearization. For the
//! conventional one-allocator-per-process shape, [`context::global`]
//! constructs a shared context exactly once on first use.

pub mod context;
pub mod error;
pub mod pool;

pub use context::{AllocatorContext, global};
pub use error::{AllocError, AllocResult};
pub use pool::{PoolCounts, SizeClass, TrafficStats};
