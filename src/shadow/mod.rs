//! Shadow model
//!
//! The shadow model is the oracle for read verification: it holds the bytes
//! the device should contain and the instance's current logical size.
//!
//! # Layout
//!
//! Offsets passed in are absolute device offsets. The model covers
//! `[origin, origin + capacity)`, where `origin` is the lower bound of the
//! instance's zone; `logical_size` is measured from `origin`.
//!
//! # Stores
//!
//! - **Dense**: one zeroed `Vec<u8>` sized at `reserve()` time
//! - **Sparse**: 64 KiB chunks in a `BTreeMap`, absent chunks read as zero
//! - **Size-only**: no bytes at all, for instances that never verify content
//!
//! # Zero invariant
//!
//! Every byte at or past `logical_size` is zero, except between a write's
//! `mark_written()` and the `grow_to()` that follows it. `shrink_to()` zeroes
//! the released region, which is what makes growth by truncate read back as
//! zeros without any fill at grow time.

pub mod extent;

pub use extent::ExtentSet;

use crate::position::ByteRange;
use std::collections::BTreeMap;
use std::ops::Range;

/// Largest capacity backed by a dense buffer under [`StoreKind::Auto`]
pub const DENSE_LIMIT: u64 = 64 * 1024 * 1024;

/// Chunk size of the sparse store
pub const SPARSE_CHUNK: u64 = 64 * 1024;

/// Which bytes of the zone have a known expected value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Every byte is known; unwritten bytes read as zero (regular file reset
    /// at start of run)
    Full,
    /// Only bytes written during this run are known (raw block devices keep
    /// whatever was there before)
    Written,
}

/// Requested backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Auto,
    Dense,
    Sparse,
    SizeOnly,
}

enum Store {
    Dense(Vec<u8>),
    Sparse(BTreeMap<u64, Box<[u8]>>),
    SizeOnly,
}

/// In-memory expectation of device content
pub struct ShadowModel {
    origin: u64,
    capacity: u64,
    logical_size: u64,
    kind: StoreKind,
    store: Store,
    coverage: Coverage,
    written: ExtentSet,
}

impl ShadowModel {
    pub fn new(origin: u64, coverage: Coverage, kind: StoreKind) -> Self {
        Self {
            origin,
            capacity: 0,
            logical_size: 0,
            kind,
            store: Store::SizeOnly,
            coverage,
            written: ExtentSet::new(),
        }
    }

    /// Size the backing store for `capacity` bytes past the origin
    ///
    /// Existing content is discarded.
    pub fn reserve(&mut self, capacity: u64) {
        self.capacity = capacity;
        self.logical_size = 0;
        self.written = ExtentSet::new();
        self.store = match self.kind {
            StoreKind::SizeOnly => Store::SizeOnly,
            StoreKind::Sparse => Store::Sparse(BTreeMap::new()),
            StoreKind::Dense => Store::Dense(vec![0u8; capacity as usize]),
            StoreKind::Auto if capacity <= DENSE_LIMIT => Store::Dense(vec![0u8; capacity as usize]),
            StoreKind::Auto => Store::Sparse(BTreeMap::new()),
        };
    }

    pub fn origin(&self) -> u64 {
        self.origin
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn coverage(&self) -> Coverage {
        self.coverage
    }

    /// Whether the model keeps byte content
    pub fn tracks_content(&self) -> bool {
        !matches!(self.store, Store::SizeOnly)
    }

    #[inline(always)]
    pub fn current_logical_size(&self) -> u64 {
        self.logical_size
    }

    /// Absolute offset one past the logical region
    #[inline(always)]
    pub fn logical_end(&self) -> u64 {
        self.origin + self.logical_size
    }

    /// Record that `range` now holds `pattern(offset)` at each absolute offset
    pub fn mark_written<F>(&mut self, range: ByteRange, pattern: F)
    where
        F: Fn(u64) -> u8,
    {
        let (start, end) = self.clip(range.offset, range.end());
        if start >= end {
            return;
        }

        match &mut self.store {
            Store::Dense(buf) => {
                let lo = (start - self.origin) as usize;
                let hi = (end - self.origin) as usize;
                for (i, byte) in buf[lo..hi].iter_mut().enumerate() {
                    *byte = pattern(start + i as u64);
                }
            }
            Store::Sparse(chunks) => {
                let mut pos = start;
                while pos < end {
                    let rel = pos - self.origin;
                    let index = rel / SPARSE_CHUNK;
                    let chunk_start = index * SPARSE_CHUNK;
                    let chunk_end = (chunk_start + SPARSE_CHUNK).min(end - self.origin);
                    let chunk = chunks
                        .entry(index)
                        .or_insert_with(|| vec![0u8; SPARSE_CHUNK as usize].into_boxed_slice());
                    for r in rel..chunk_end {
                        chunk[(r - chunk_start) as usize] = pattern(self.origin + r);
                    }
                    pos = self.origin + chunk_end;
                }
            }
            Store::SizeOnly => {}
        }

        if self.coverage == Coverage::Written {
            self.written.insert(start, end);
        }
    }

    /// Expected bytes for `range`
    ///
    /// Bytes outside the modelled region, or never recorded, are zero. Use
    /// [`verified_spans`](Self::verified_spans) to learn which of them are
    /// actually known.
    pub fn read_expected(&self, range: ByteRange) -> Vec<u8> {
        let mut out = vec![0u8; range.size as usize];
        let (start, end) = self.clip(range.offset, range.end());
        if start >= end {
            return out;
        }
        let dst_base = (start - range.offset) as usize;

        match &self.store {
            Store::Dense(buf) => {
                let lo = (start - self.origin) as usize;
                let hi = (end - self.origin) as usize;
                out[dst_base..dst_base + (hi - lo)].copy_from_slice(&buf[lo..hi]);
            }
            Store::Sparse(chunks) => {
                let rel_start = start - self.origin;
                let rel_end = end - self.origin;
                let first = rel_start / SPARSE_CHUNK;
                let last = (rel_end - 1) / SPARSE_CHUNK;
                for (&index, chunk) in chunks.range(first..=last) {
                    let chunk_start = index * SPARSE_CHUNK;
                    let lo = rel_start.max(chunk_start);
                    let hi = rel_end.min(chunk_start + SPARSE_CHUNK);
                    let dst = dst_base + (lo - rel_start) as usize;
                    out[dst..dst + (hi - lo) as usize].copy_from_slice(
                        &chunk[(lo - chunk_start) as usize..(hi - chunk_start) as usize],
                    );
                }
            }
            Store::SizeOnly => {}
        }
        out
    }

    /// Sub-ranges of `range` whose expected content is known
    pub fn verified_spans(&self, range: ByteRange) -> Vec<Range<u64>> {
        if !self.tracks_content() || range.is_empty() {
            return Vec::new();
        }
        match self.coverage {
            Coverage::Full => vec![range.offset..range.end()],
            Coverage::Written => self.written.intersect(range.offset, range.end()),
        }
    }

    /// Raise the logical size to `new_size`; smaller values are ignored
    ///
    /// Returns whether the size changed.
    pub fn grow_to(&mut self, new_size: u64) -> bool {
        if new_size <= self.logical_size {
            return false;
        }
        self.logical_size = new_size.min(self.capacity);
        true
    }

    /// Lower the logical size to `new_size`, zeroing the released bytes
    ///
    /// Returns whether the size changed.
    pub fn shrink_to(&mut self, new_size: u64) -> bool {
        if new_size >= self.logical_size {
            return false;
        }
        let cut = self.origin + new_size;
        let old_end = self.logical_end();

        match &mut self.store {
            Store::Dense(buf) => {
                let lo = new_size as usize;
                let hi = (self.logical_size as usize).min(buf.len());
                if lo < hi {
                    buf[lo..hi].fill(0);
                }
            }
            Store::Sparse(chunks) => {
                let first_dropped = (new_size + SPARSE_CHUNK - 1) / SPARSE_CHUNK;
                drop(chunks.split_off(&first_dropped));
                if new_size % SPARSE_CHUNK != 0 {
                    if let Some(chunk) = chunks.get_mut(&(new_size / SPARSE_CHUNK)) {
                        chunk[(new_size % SPARSE_CHUNK) as usize..].fill(0);
                    }
                }
            }
            Store::SizeOnly => {}
        }

        self.written.truncate(cut);
        self.logical_size = new_size;
        debug_assert!(cut < old_end);
        true
    }

    /// Intersect `[start, end)` with the modelled region
    fn clip(&self, start: u64, end: u64) -> (u64, u64) {
        let lo = start.max(self.origin);
        let hi = end.min(self.origin + self.capacity);
        (lo, hi.max(lo))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(kind: StoreKind, coverage: Coverage) -> ShadowModel {
        let mut m = ShadowModel::new(0, coverage, kind);
        m.reserve(1024 * 1024);
        m
    }

    fn letters(offset: u64) -> u8 {
        b'a' + (offset % 26) as u8
    }

    #[test]
    fn test_read_after_write_dense_and_sparse() {
        for kind in [StoreKind::Dense, StoreKind::Sparse] {
            let mut m = model(kind, Coverage::Full);
            let range = ByteRange::new(60 * 1024, 16 * 1024); // straddles a sparse chunk
            m.mark_written(range, letters);
            m.grow_to(range.end());

            let got = m.read_expected(range);
            for (i, &b) in got.iter().enumerate() {
                assert_eq!(b, letters(range.offset + i as u64));
            }
            assert_eq!(m.current_logical_size(), range.end());
        }
    }

    #[test]
    fn test_last_write_wins() {
        let mut m = model(StoreKind::Sparse, Coverage::Full);
        m.mark_written(ByteRange::new(0, 8192), |_| b'a');
        m.mark_written(ByteRange::new(4096, 8192), |_| b'b');
        let got = m.read_expected(ByteRange::new(0, 12288));
        assert!(got[..4096].iter().all(|&b| b == b'a'));
        assert!(got[4096..].iter().all(|&b| b == b'b'));
    }

    #[test]
    fn test_grow_reads_zero() {
        let mut m = model(StoreKind::Dense, Coverage::Full);
        m.mark_written(ByteRange::new(0, 4096), |_| b'x');
        m.grow_to(4096);
        assert!(m.grow_to(65536));
        let got = m.read_expected(ByteRange::new(4096, 61440));
        assert!(got.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shrink_then_regrow_has_no_stale_data() {
        for kind in [StoreKind::Dense, StoreKind::Sparse] {
            let mut m = model(kind, Coverage::Full);
            let range = ByteRange::new(0, 200 * 1024);
            m.mark_written(range, letters);
            m.grow_to(range.end());

            assert!(m.shrink_to(70 * 1024));
            assert!(m.grow_to(200 * 1024));

            let got = m.read_expected(ByteRange::new(70 * 1024, 130 * 1024));
            assert!(got.iter().all(|&b| b == 0), "{:?} leaked stale bytes", kind);
            let kept = m.read_expected(ByteRange::new(0, 70 * 1024));
            assert_eq!(kept[69 * 1024], letters(69 * 1024));
        }
    }

    #[test]
    fn test_shrink_and_grow_ignore_wrong_direction() {
        let mut m = model(StoreKind::Dense, Coverage::Full);
        m.grow_to(8192);
        assert!(!m.grow_to(4096));
        assert!(!m.shrink_to(16384));
        assert_eq!(m.current_logical_size(), 8192);
    }

    #[test]
    fn test_read_expected_is_pure() {
        let mut m = model(StoreKind::Sparse, Coverage::Full);
        m.mark_written(ByteRange::new(0, 4096), |_| b'q');
        let a = m.read_expected(ByteRange::new(0, 8192));
        let b = m.read_expected(ByteRange::new(0, 8192));
        assert_eq!(a, b);
        assert_eq!(m.current_logical_size(), 0);
    }

    #[test]
    fn test_written_coverage_tracks_only_writes() {
        let mut m = model(StoreKind::Dense, Coverage::Written);
        assert!(m.verified_spans(ByteRange::new(0, 8192)).is_empty());

        m.mark_written(ByteRange::new(4096, 4096), |_| b'z');
        assert_eq!(m.verified_spans(ByteRange::new(0, 16384)), vec![4096..8192]);
    }

    #[test]
    fn test_origin_offsets() {
        let mut m = ShadowModel::new(1 << 30, Coverage::Full, StoreKind::Sparse);
        m.reserve(1 << 20);
        let range = ByteRange::new((1 << 30) + 4096, 4096);
        m.mark_written(range, |_| b'k');
        m.grow_to(range.end() - m.origin());

        assert_eq!(m.current_logical_size(), 8192);
        assert_eq!(m.logical_end(), (1 << 30) + 8192);
        assert!(m.read_expected(range).iter().all(|&b| b == b'k'));
        // Below the origin nothing is modelled
        assert!(m.read_expected(ByteRange::new(0, 4096)).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_auto_store_selection() {
        let mut small = ShadowModel::new(0, Coverage::Full, StoreKind::Auto);
        small.reserve(DENSE_LIMIT);
        assert!(matches!(small.store, Store::Dense(_)));

        let mut large = ShadowModel::new(0, Coverage::Full, StoreKind::Auto);
        large.reserve(1 << 30);
        assert!(matches!(large.store, Store::Sparse(_)));
    }

    #[test]
    fn test_size_only_model() {
        let mut m = model(StoreKind::SizeOnly, Coverage::Written);
        assert!(!m.tracks_content());
        m.mark_written(ByteRange::new(0, 4096), |_| b'a');
        assert!(m.grow_to(1 << 20));
        assert!(m.verified_spans(ByteRange::new(0, 4096)).is_empty());
    }
}
