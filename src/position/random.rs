//! Randomized range generation
//!
//! Offsets and sizes are drawn with xoshiro256++ and then aligned. An optional
//! bias keeps a share of the offsets inside the current logical region, which
//! raises the rate of overwrites and in-place extends relative to writes that
//! leave gaps.

use super::{align_range, ByteRange, GeneratorBounds, PositionGenerator, Zone};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Uniform random ranges inside a zone
pub struct RandomPositions {
    bounds: GeneratorBounds,
    /// Percentage of draws confined to `[lower, lower + logical_size)`
    bias_percent: u8,
    rng: Xoshiro256PlusPlus,
}

impl RandomPositions {
    pub fn new(bounds: GeneratorBounds, bias_percent: u8) -> Self {
        Self {
            bounds,
            bias_percent: bias_percent.min(100),
            rng: Xoshiro256PlusPlus::from_entropy(),
        }
    }

    /// Create a generator with a specific seed
    ///
    /// Same seed and same sequence of logical sizes give the same ranges.
    pub fn with_seed(bounds: GeneratorBounds, bias_percent: u8, seed: u64) -> Self {
        Self {
            bounds,
            bias_percent: bias_percent.min(100),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }
}

impl PositionGenerator for RandomPositions {
    fn next_range(&mut self, logical_size: u64) -> ByteRange {
        let span = self.bounds.zone.len();
        let max_size = self.bounds.max_op_size.min(span);

        let raw_size = self.rng.gen_range(1..=max_size);

        // Last start that still fits raw_size inside the zone
        let start_slots = span - raw_size + 1;
        let window = if logical_size > 0
            && self.bias_percent > 0
            && self.rng.gen_range(0..100u8) < self.bias_percent
        {
            logical_size.min(start_slots)
        } else {
            start_slots
        };
        let raw_offset = self.bounds.zone.lower + self.rng.gen_range(0..window);

        self.bounds
            .clamp(align_range(raw_offset, raw_size, self.bounds.unit))
    }

    fn zone(&self) -> Zone {
        self.bounds.zone
    }
}
