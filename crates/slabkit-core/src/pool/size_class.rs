//! Size-class ladder and request routing.
//!
//! Variable-size requests are routed to a fixed ladder of five classes;
//! anything above the largest class bypasses pooling entirely. The ladder
//! is a deliberate simplicity trade-off, not a configuration surface.

/// Number of pooled size classes.
pub const NUM_CLASSES: usize = 5;

/// Byte width of each class, ascending.
pub const CLASS_SIZES: [usize; NUM_CLASSES] = [16, 32, 64, 128, 256];

/// Largest request size served from pools. Anything bigger goes straight
/// to the system allocator.
pub const MAX_POOLED_SIZE: usize = CLASS_SIZES[NUM_CLASSES - 1];

/// One rung of the size-class ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    B16,
    B32,
    B64,
    B128,
    B256,
}

impl SizeClass {
    /// All classes, ascending by byte width.
    pub const ALL: [SizeClass; NUM_CLASSES] = [
        SizeClass::B16,
        SizeClass::B32,
        SizeClass::B64,
        SizeClass::B128,
        SizeClass::B256,
    ];

    /// The smallest class able to hold `size` bytes, or `None` when the
    /// request exceeds the ladder (or is zero, which no class serves).
    pub fn for_size(size: usize) -> Option<SizeClass> {
        if size == 0 || size > MAX_POOLED_SIZE {
            return None;
        }
        let idx = CLASS_SIZES.partition_point(|&class| class < size);
        Some(Self::ALL[idx])
    }

    /// Byte width of this class.
    pub const fn bytes(self) -> usize {
        CLASS_SIZES[self.index()]
    }

    /// Position in the ladder, `0` for the smallest class.
    pub const fn index(self) -> usize {
        match self {
            SizeClass::B16 => 0,
            SizeClass::B32 => 1,
            SizeClass::B64 => 2,
            SizeClass::B128 => 3,
            SizeClass::B256 => 4,
        }
    }
}
