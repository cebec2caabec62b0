//! Coalescing set of byte extents

use std::collections::BTreeMap;
use std::ops::Range;

/// Disjoint, non-adjacent half-open extents keyed by start offset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtentSet {
    extents: BTreeMap<u64, u64>,
}

impl ExtentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Number of disjoint extents
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    /// Add `[start, end)`, merging with overlapping or touching extents
    pub fn insert(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        let mut start = start;
        let mut end = end;

        // Extent starting at or before `start` that reaches it
        if let Some((&s, &e)) = self.extents.range(..=start).next_back() {
            if e >= start {
                start = s;
                end = end.max(e);
                self.extents.remove(&s);
            }
        }

        // Extents starting inside (or right at the end of) the new one
        let absorbed: Vec<u64> = self.extents.range(start..=end).map(|(&s, _)| s).collect();
        for s in absorbed {
            if let Some(e) = self.extents.remove(&s) {
                end = end.max(e);
            }
        }

        self.extents.insert(start, end);
    }

    /// Remove everything at or past `offset`
    pub fn truncate(&mut self, offset: u64) {
        drop(self.extents.split_off(&offset));
        let last = self.extents.range(..offset).next_back().map(|(&s, &e)| (s, e));
        if let Some((s, e)) = last {
            if e > offset {
                self.extents.insert(s, offset);
            }
        }
    }

    /// Portions of `[start, end)` covered by the set, in ascending order
    pub fn intersect(&self, start: u64, end: u64) -> Vec<Range<u64>> {
        let mut out = Vec::new();
        if start >= end {
            return out;
        }

        let first = self
            .extents
            .range(..=start)
            .next_back()
            .map(|(&s, _)| s)
            .unwrap_or(start);

        for (&s, &e) in self.extents.range(first..end) {
            let lo = s.max(start);
            let hi = e.min(end);
            if lo < hi {
                out.push(lo..hi);
            }
        }
        out
    }

    /// Whether `[start, end)` is entirely covered
    pub fn covers(&self, start: u64, end: u64) -> bool {
        let parts = self.intersect(start, end);
        parts.len() == 1 && parts[0] == (start..end)
    }
}
