//! Per-run exerciser state

use crate::config::{ExerciserConfig, TruncatePolicy};
use crate::error::OpKind;
use crate::position::Zone;
use crate::shadow::{Coverage, ShadowModel, StoreKind};
use crate::util::buffer::AlignedBuffer;
use crate::util::verification::WritePattern;
use crate::Result;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;

/// Everything the executors read or mutate during a run
///
/// Owned by the driver and lent to one executor at a time.
pub struct ExerciserState {
    pub shadow: ShadowModel,
    pub buffer: AlignedBuffer,
    pub zone: Zone,
    pub unit: u64,
    pub max_op_size: u64,
    pub max_logical_size: u64,
    pub truncate_policy: TruncatePolicy,
    pub count_empty_ops: bool,
    pub counters: OpCounters,
    rng: Xoshiro256PlusPlus,
}

impl ExerciserState {
    /// Allocate the shadow model and IO buffer for `zone`
    ///
    /// The shadow model covers `min(max_logical_size, zone.len())` bytes from
    /// the zone's lower bound and keeps content only when `config.verify` is
    /// set.
    pub fn new(
        config: &ExerciserConfig,
        zone: Zone,
        unit: u64,
        coverage: Coverage,
        seed: u64,
    ) -> Result<Self> {
        let store = if config.verify {
            StoreKind::Auto
        } else {
            StoreKind::SizeOnly
        };
        let max_logical_size = config.max_logical_size.min(zone.len());
        let mut shadow = ShadowModel::new(zone.lower, coverage, store);
        shadow.reserve(max_logical_size);

        let buffer = AlignedBuffer::new(config.max_op_size as usize, unit as usize)?;

        Ok(Self {
            shadow,
            buffer,
            zone,
            unit,
            max_op_size: config.max_op_size,
            max_logical_size,
            truncate_policy: config.truncate_policy,
            count_empty_ops: config.count_empty_ops,
            counters: OpCounters::default(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        })
    }

    /// Fresh fill pattern for the next write
    pub fn next_pattern(&mut self) -> WritePattern {
        WritePattern::new(self.rng.gen())
    }
}

/// Per-operation progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OpCounters {
    pub reads: u64,
    pub writes: u64,
    pub truncates: u64,
    pub discards: u64,
    pub skipped: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub bytes_discarded: u64,
}

impl OpCounters {
    /// Count one operation of `op` that made progress over `bytes`
    pub fn record(&mut self, op: OpKind, bytes: u64) {
        match op {
            OpKind::Read => {
                self.reads += 1;
                self.bytes_read += bytes;
            }
            OpKind::Write => {
                self.writes += 1;
                self.bytes_written += bytes;
            }
            OpKind::Truncate => self.truncates += 1,
            OpKind::Discard => {
                self.discards += 1;
                self.bytes_discarded += bytes;
            }
        }
    }

    /// Operations that made progress
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.truncates + self.discards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    #[test]
    fn test_state_sizes_from_config() {
        let mut config = ExerciserConfig::for_profile(Profile::File);
        config.max_logical_size = 1024 * 1024;
        config.max_op_size = 64 * 1024;

        let state = ExerciserState::new(&config, Zone::new(0, 512 * 1024), 4096, Coverage::Full, 1)
            .unwrap();
        // Capped by the zone
        assert_eq!(state.max_logical_size, 512 * 1024);
        assert_eq!(state.shadow.capacity(), 512 * 1024);
        assert_eq!(state.buffer.size(), 64 * 1024);
        assert!(state.buffer.is_aligned());
        assert!(state.shadow.tracks_content());
    }

    #[test]
    fn test_no_verify_keeps_size_only() {
        let config = ExerciserConfig::for_profile(Profile::Discard);
        let state =
            ExerciserState::new(&config, Zone::new(0, 1 << 30), 4096, Coverage::Written, 1).unwrap();
        assert!(!state.shadow.tracks_content());
    }

    #[test]
    fn test_patterns_are_seeded() {
        let config = ExerciserConfig::for_profile(Profile::File);
        let zone = Zone::new(0, 1 << 20);
        let mut a = ExerciserState::new(&config, zone, 4096, Coverage::Full, 9).unwrap();
        let mut b = ExerciserState::new(&config, zone, 4096, Coverage::Full, 9).unwrap();
        assert_eq!(a.next_pattern(), b.next_pattern());
        assert_ne!(a.next_pattern().seed(), a.next_pattern().seed());
    }

    #[test]
    fn test_counters() {
        let mut counters = OpCounters::default();
        counters.record(OpKind::Write, 4096);
        counters.record(OpKind::Read, 4096);
        counters.record(OpKind::Truncate, 0);
        assert_eq!(counters.total(), 3);
        assert_eq!(counters.bytes_written, 4096);
        assert_eq!(counters.skipped, 0);
    }
}
