//! Windowed rotation
//!
//! Walks the zone in fixed strides starting at the lower bound. When the next
//! stride would start at or past the upper bound it wraps back to the lower
//! bound, so repeated calls cover the whole zone without gaps.

use super::{align_range, ByteRange, GeneratorBounds, PositionGenerator, Zone};

/// Deterministic stride generator
#[derive(Debug)]
pub struct WindowedPositions {
    bounds: GeneratorBounds,
    stride: u64,
    /// Offset of the next range
    cursor: u64,
}

impl WindowedPositions {
    /// Create a windowed generator
    ///
    /// `stride` is aligned to the unit and capped at the max op size; a zero
    /// stride means "use the max op size".
    pub fn new(bounds: GeneratorBounds, stride: u64) -> Self {
        let stride = if stride == 0 { bounds.max_op_size } else { stride };
        let stride = align_range(0, stride, bounds.unit).size.min(bounds.max_op_size);
        Self {
            bounds,
            stride,
            cursor: bounds.zone.lower,
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }
}

impl PositionGenerator for WindowedPositions {
    fn next_range(&mut self, _logical_size: u64) -> ByteRange {
        if self.cursor >= self.bounds.zone.upper {
            self.cursor = self.bounds.zone.lower;
        }

        let range = self.bounds.clamp(ByteRange::new(self.cursor, self.stride));

        self.cursor = range.end();
        if self.cursor >= self.bounds.zone.upper {
            self.cursor = self.bounds.zone.lower;
        }

        range
    }

    fn zone(&self) -> Zone {
        self.bounds.zone
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> GeneratorBounds {
        GeneratorBounds {
            zone: Zone::new(1 << 20, (1 << 20) + 5 * 4096),
            unit: 4096,
            max_op_size: 8192,
        }
    }

    #[test]
    fn test_windowed_basic() {
        let mut gen = WindowedPositions::new(bounds(), 0);
        let lower = 1 << 20;

        assert_eq!(gen.next_range(0), ByteRange::new(lower, 8192));
        assert_eq!(gen.next_range(0), ByteRange::new(lower + 8192, 8192));
    }

    #[test]
    fn test_windowed_wraparound() {
        let mut gen = WindowedPositions::new(bounds(), 0);
        let lower = 1 << 20;

        gen.next_range(0);
        gen.next_range(0);
        // Only one block left before the upper bound
        assert_eq!(gen.next_range(0), ByteRange::new(lower + 16384, 4096));
        assert_eq!(gen.next_range(0), ByteRange::new(lower, 8192)); // Wrapped
    }

    #[test]
    fn test_windowed_covers_zone() {
        let b = bounds();
        let mut gen = WindowedPositions::new(b, 4096);
        let mut covered = 0;
        for _ in 0..5 {
            let r = gen.next_range(0);
            assert!(b.zone.contains(&r));
            covered += r.size;
        }
        assert_eq!(covered, b.zone.len());
    }

    #[test]
    fn test_windowed_stride_is_aligned_and_capped() {
        let gen = WindowedPositions::new(bounds(), 5000);
        assert_eq!(gen.stride(), 8192);
        let gen = WindowedPositions::new(bounds(), 1);
        assert_eq!(gen.stride(), 4096);
    }
}
