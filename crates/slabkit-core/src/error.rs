//! Allocation error types.
//!
//! Only genuine allocation failures are modeled as errors. Contract
//! violations (mismatched free size, double free, foreign pointers) are
//! absorbed by best-effort address-range checks in the pool layer and are
//! never surfaced here.

use thiserror::Error;

/// Failure to satisfy an allocation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The requested size was zero bytes.
    #[error("requested allocation size was zero")]
    ZeroSize,

    /// The system allocator returned no memory, either while creating a
    /// new pool or while serving an oversized request directly.
    #[error("system allocator could not provide {size} bytes")]
    OutOfMemory {
        /// Size of the request that failed, in bytes.
        size: usize,
    },
}

/// Result alias used throughout the allocation core.
pub type AllocResult<T> = Result<T, AllocError>;
