//! Write patterns and byte-exact comparison
//!
//! Each write gets its own [`WritePattern`]. The byte stored at an absolute
//! device offset is a pure function of the pattern seed and that offset, so the
//! same function fills the IO buffer and the shadow model. Every byte is a
//! lowercase ASCII letter: never zero, easy to read in a hex dump, and two
//! writes with different seeds disagree on most bytes.

/// Per-write fill pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePattern {
    seed: u64,
}

impl WritePattern {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Byte this pattern stores at absolute `offset`
    #[inline(always)]
    pub fn byte_at(&self, offset: u64) -> u8 {
        // splitmix64 finalizer over (seed, offset)
        let mut z = self.seed ^ offset.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        b'a' + (z % 26) as u8
    }

    /// Fill `buffer` as if it were placed at absolute `offset`
    pub fn fill(&self, buffer: &mut [u8], offset: u64) {
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.byte_at(offset + i as u64);
        }
    }
}

/// First differing byte between expected and observed content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    /// Absolute device offset
    pub offset: u64,
    pub expected: u8,
    pub observed: u8,
}

/// Compare two equally sized buffers that start at absolute `base`
pub fn first_mismatch(expected: &[u8], observed: &[u8], base: u64) -> Option<Mismatch> {
    debug_assert_eq!(expected.len(), observed.len());
    expected
        .iter()
        .zip(observed)
        .position(|(e, o)| e != o)
        .map(|i| Mismatch {
            offset: base + i as u64,
            expected: expected[i],
            observed: observed[i],
        })
}
