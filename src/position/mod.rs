//! Aligned range generation
//!
//! Every operation works on a [`ByteRange`] drawn from a [`PositionGenerator`].
//! Generators are confined to a [`Zone`] and emit ranges whose offset and size
//! are multiples of the active alignment unit.
//!
//! # Generators
//!
//! - **Random**: offset uniform over the zone (optionally biased into the
//!   current logical region), size uniform up to the maximum op size
//! - **Windowed**: fixed strides walking the zone front to back, wrapping to
//!   the lower bound
//!
//! # Example
//!
//! ```
//! use blkx::position::{align_range, ByteRange};
//!
//! // One unaligned byte becomes one full 4K block
//! let range = align_range(100, 1, 4096);
//! assert_eq!(range, ByteRange::new(0, 4096));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A byte extent on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub offset: u64,
    pub size: u64,
}

impl ByteRange {
    pub const fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Exclusive end offset
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_aligned(&self, unit: u64) -> bool {
        self.offset % unit == 0 && self.size % unit == 0
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Half-open address window an instance is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Zone {
    pub lower: u64,
    pub upper: u64,
}

impl Zone {
    pub const fn new(lower: u64, upper: u64) -> Self {
        Self { lower, upper }
    }

    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.upper.saturating_sub(self.lower)
    }

    pub fn is_empty(&self) -> bool {
        self.upper <= self.lower
    }

    /// Whether `range` lies entirely inside the zone
    pub fn contains(&self, range: &ByteRange) -> bool {
        range.offset >= self.lower
            && range
                .offset
                .checked_add(range.size)
                .map_or(false, |end| end <= self.upper)
    }

    /// Whether two zones share at least one byte
    pub fn overlaps(&self, other: &Zone) -> bool {
        self.lower < other.upper && other.lower < self.upper
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

#[inline(always)]
pub fn align_down(value: u64, unit: u64) -> u64 {
    value - value % unit
}

#[inline(always)]
pub fn align_up(value: u64, unit: u64) -> u64 {
    match value % unit {
        0 => value,
        rem => value + (unit - rem),
    }
}

/// Align a raw `(offset, size)` pair to `unit`
///
/// The offset is rounded down and the bytes skipped by that rounding are added
/// to the size, so the aligned range still covers the raw one. A size that
/// collapses to zero becomes one byte before being rounded up.
pub fn align_range(offset: u64, size: u64, unit: u64) -> ByteRange {
    let diff = offset % unit;
    let offset = offset - diff;
    let mut size = size + diff;
    if size == 0 {
        size = 1;
    }
    ByteRange::new(offset, align_up(size, unit))
}

/// Source of ranges for the driver
///
/// `logical_size` is the current logical size of the instance, relative to
/// the zone's lower bound. Implementations must uphold, for every returned
/// range `r`: `zone.contains(&r)`, `r.is_aligned(unit)`, `r.size > 0` and
/// `r.size <= max_op_size`.
pub trait PositionGenerator: Send {
    fn next_range(&mut self, logical_size: u64) -> ByteRange;

    /// Zone the generator is confined to
    fn zone(&self) -> Zone;
}

/// Parameters shared by all generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorBounds {
    pub zone: Zone,
    pub unit: u64,
    pub max_op_size: u64,
}

impl GeneratorBounds {
    /// Clamp an aligned range back into the zone and the op-size limit
    ///
    /// The zone bounds and `max_op_size` are multiples of `unit`, so the
    /// result stays aligned.
    pub(crate) fn clamp(&self, mut range: ByteRange) -> ByteRange {
        if range.offset < self.zone.lower {
            range.offset = self.zone.lower;
        }
        if range.offset >= self.zone.upper {
            range.offset = self.zone.upper - self.unit;
        }
        if range.size > self.max_op_size {
            range.size = self.max_op_size;
        }
        if range.end() > self.zone.upper {
            range.size = self.zone.upper - range.offset;
        }
        range
    }
}

pub mod random;
pub mod windowed;

pub use random::RandomPositions;
pub use windowed::WindowedPositions;
