//! Operation executors
//!
//! One executor per operation kind. Each performs the real device call,
//! updates or consults the shadow model, and reports an [`Outcome`]:
//!
//! - `Progressed`: the operation completed and counts toward the budget
//! - `Skipped`: nothing meaningful to do (read of an empty region, or a
//!   zero-length range when those do not count)
//! - `Diverged`: the run must stop; see [`Divergence`]
//!
//! Executors never retry. A device error is reported as is.

use crate::config::TruncatePolicy;
use crate::device::Device;
use crate::engine::ExerciserState;
use crate::error::{Divergence, InvariantViolation, OpKind};
use crate::position::ByteRange;
use crate::util::verification::first_mismatch;
use tracing::{debug, info, warn};

/// Size a truncate or discard jumps to from an empty logical region
pub const MIN_GROWTH: u64 = 1024 * 1024;

/// Result of one executor call
#[derive(Debug)]
pub enum Outcome {
    Progressed,
    Skipped,
    Diverged(Divergence),
}

impl Outcome {
    pub fn is_progressed(&self) -> bool {
        matches!(self, Outcome::Progressed)
    }
}

impl From<InvariantViolation> for Outcome {
    fn from(violation: InvariantViolation) -> Self {
        Outcome::Diverged(Divergence::Invariant(violation))
    }
}

/// Dispatch `op` over `range`
pub fn execute(
    op: OpKind,
    range: ByteRange,
    state: &mut ExerciserState,
    device: &dyn Device,
) -> Outcome {
    match op {
        OpKind::Read => read(range, state, device),
        OpKind::Write => write(range, state, device),
        OpKind::Truncate => truncate(range, state, device),
        OpKind::Discard => discard(range, state, device),
    }
}

/// New logical size under the doubling policy
///
/// From empty, jump to [`MIN_GROWTH`] (or at least the range end). Otherwise
/// grow to double the current size when the range ends before that, or to the
/// range end when it lies further out. Always capped at `cap`.
pub fn doubling_target(logical: u64, range_end: u64, cap: u64) -> u64 {
    let target = if logical == 0 {
        MIN_GROWTH.max(range_end)
    } else if range_end < logical.saturating_mul(2) {
        logical.saturating_mul(2)
    } else {
        range_end
    };
    target.min(cap)
}

/// Logical size a truncate or discard over `range` moves to
fn next_logical_size(range: ByteRange, state: &ExerciserState) -> u64 {
    let rel_end = range.end().saturating_sub(state.zone.lower);
    match state.truncate_policy {
        TruncatePolicy::Doubling => {
            doubling_target(state.shadow.current_logical_size(), rel_end, state.max_logical_size)
        }
        TruncatePolicy::RangeEnd => rel_end.min(state.max_logical_size),
    }
}

fn io_divergence(op: OpKind, range: ByteRange, error: anyhow::Error) -> Outcome {
    Outcome::Diverged(Divergence::Io {
        op,
        offset: range.offset,
        len: range.size,
        error,
    })
}

fn empty_range(op: OpKind, range: ByteRange, state: &ExerciserState) -> Outcome {
    if state.count_empty_ops {
        debug!(%op, offset = range.offset, "zero-length operation counted");
        Outcome::Progressed
    } else {
        warn!(%op, offset = range.offset, "skipping zero-length operation");
        Outcome::Skipped
    }
}

/// Zone and buffer checks shared by read and write
fn check_range(op: OpKind, range: ByteRange, state: &ExerciserState) -> Result<(), InvariantViolation> {
    if !state.zone.contains(&range) {
        return Err(InvariantViolation::ZoneEscape {
            op,
            range,
            zone: state.zone,
        });
    }
    if range.size > state.buffer.size() as u64 {
        return Err(InvariantViolation::OversizedRange {
            op,
            range,
            maximum: state.buffer.size() as u64,
        });
    }
    Ok(())
}

/// Fill `range` with a fresh pattern, write it and record it
pub fn write(range: ByteRange, state: &mut ExerciserState, device: &dyn Device) -> Outcome {
    if range.is_empty() {
        return empty_range(OpKind::Write, range, state);
    }
    if let Err(violation) = check_range(OpKind::Write, range, state) {
        return violation.into();
    }

    let rel_end = range.end() - state.zone.lower;
    if rel_end > state.max_logical_size {
        return InvariantViolation::LogicalSizeExceeded {
            range,
            requested: rel_end,
            maximum: state.max_logical_size,
        }
        .into();
    }

    let pattern = state.next_pattern();
    let buf = &mut state.buffer.as_mut_slice()[..range.size as usize];
    pattern.fill(buf, range.offset);

    debug!(offset = range.offset, size = range.size, seed = pattern.seed(), "write");
    if let Err(error) = device.write_at(buf, range.offset) {
        return io_divergence(OpKind::Write, range, error);
    }

    state.shadow.mark_written(range, |offset| pattern.byte_at(offset));
    if state.shadow.grow_to(rel_end) {
        info!(logical_size = state.shadow.current_logical_size(), "logical size changed");
    }
    state.counters.record(OpKind::Write, range.size);
    Outcome::Progressed
}

/// Read `range` back and compare every known byte
pub fn read(range: ByteRange, state: &mut ExerciserState, device: &dyn Device) -> Outcome {
    if state.shadow.current_logical_size() == 0 {
        warn!(offset = range.offset, "skipping read of empty logical region");
        return Outcome::Skipped;
    }
    if range.is_empty() {
        return empty_range(OpKind::Read, range, state);
    }

    let outcome = verify(range, state, device);
    if outcome.is_progressed() {
        state.counters.record(OpKind::Read, range.size);
    }
    outcome
}

/// Read `range` and compare it against the shadow model
///
/// Leaves the operation counters alone; the final verification pass reads
/// through here.
pub fn verify(range: ByteRange, state: &mut ExerciserState, device: &dyn Device) -> Outcome {
    if let Err(violation) = check_range(OpKind::Read, range, state) {
        return violation.into();
    }

    let buf = &mut state.buffer.as_mut_slice()[..range.size as usize];
    buf.fill(0);

    debug!(offset = range.offset, size = range.size, "read");
    if let Err(error) = device.read_at(buf, range.offset) {
        return io_divergence(OpKind::Read, range, error);
    }

    let spans = state.shadow.verified_spans(range);
    if !spans.is_empty() {
        let expected = state.shadow.read_expected(range);
        for span in spans {
            let lo = (span.start - range.offset) as usize;
            let hi = (span.end - range.offset) as usize;
            if let Some(m) = first_mismatch(&expected[lo..hi], &buf[lo..hi], span.start) {
                tracing::error!(
                    offset = m.offset,
                    expected = m.expected,
                    observed = m.observed,
                    "content mismatch"
                );
                return Outcome::Diverged(Divergence::Content {
                    offset: m.offset,
                    expected: m.expected,
                    observed: m.observed,
                });
            }
        }
    }

    Outcome::Progressed
}

/// Resize the target to a size derived from `range`
pub fn truncate(range: ByteRange, state: &mut ExerciserState, device: &dyn Device) -> Outcome {
    let logical = state.shadow.current_logical_size();
    let new_size = next_logical_size(range, state);

    let end = state.zone.lower + new_size;
    if end < range.offset {
        return InvariantViolation::TruncateBelowOffset {
            end,
            offset: range.offset,
        }
        .into();
    }

    debug!(from = logical, to = new_size, offset = end, "truncate");
    if let Err(error) = device.set_len(end) {
        return io_divergence(OpKind::Truncate, ByteRange::new(end, 0), error);
    }

    let changed = if new_size > logical {
        state.shadow.grow_to(new_size)
    } else {
        state.shadow.shrink_to(new_size)
    };
    if changed {
        info!(logical_size = new_size, "logical size changed");
    }
    state.counters.record(OpKind::Truncate, 0);
    Outcome::Progressed
}

/// Discard from `range.offset` to the end of the logical region
///
/// The logical region grows by the same rule as truncate but is never
/// resized on the device; discard only releases blocks. Content is not
/// verified afterwards.
pub fn discard(range: ByteRange, state: &mut ExerciserState, device: &dyn Device) -> Outcome {
    let logical = state.shadow.current_logical_size();
    let new_size = next_logical_size(range, state);
    let changed = if new_size > logical {
        state.shadow.grow_to(new_size)
    } else {
        state.shadow.shrink_to(new_size)
    };
    if changed {
        info!(logical_size = new_size, "logical size changed");
    }

    let end = state.shadow.logical_end();
    if end < range.offset {
        return InvariantViolation::TruncateBelowOffset {
            end,
            offset: range.offset,
        }
        .into();
    }

    let length = end - range.offset;
    if length == 0 {
        return empty_range(OpKind::Discard, range, state);
    }
    if length > state.max_logical_size {
        return InvariantViolation::DiscardTooLong {
            offset: range.offset,
            length,
            maximum: state.max_logical_size,
        }
        .into();
    }

    let target = ByteRange::new(range.offset, length);
    if !state.zone.contains(&target) {
        return InvariantViolation::ZoneEscape {
            op: OpKind::Discard,
            range: target,
            zone: state.zone,
        }
        .into();
    }

    debug!(offset = target.offset, length, logical_end = end, "discard");
    if let Err(error) = device.discard(target.offset, length) {
        return io_divergence(OpKind::Discard, target, error);
    }

    state.counters.record(OpKind::Discard, length);
    Outcome::Progressed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExerciserConfig, Profile};
    use crate::device::mock::STALE_BYTE;
    use crate::device::MemDevice;
    use crate::position::Zone;
    use crate::shadow::Coverage;

    const KB: u64 = 1024;

    fn file_state(policy: TruncatePolicy) -> ExerciserState {
        let mut config = ExerciserConfig::for_profile(Profile::File);
        config.max_logical_size = 1024 * KB;
        config.max_op_size = 128 * KB;
        config.truncate_policy = policy;
        ExerciserState::new(&config, Zone::new(0, 1024 * KB), 4096, Coverage::Full, 3).unwrap()
    }

    fn block_state(zone: Zone) -> ExerciserState {
        let mut config = ExerciserConfig::for_profile(Profile::Device);
        config.max_logical_size = zone.len();
        config.max_op_size = 64 * KB;
        ExerciserState::new(&config, zone, 4096, Coverage::Written, 3).unwrap()
    }

    fn discard_state(zone: Zone, max_logical: u64) -> ExerciserState {
        let mut config = ExerciserConfig::for_profile(Profile::Discard);
        config.max_logical_size = max_logical;
        config.max_op_size = 64 * KB;
        ExerciserState::new(&config, zone, 4096, Coverage::Written, 3).unwrap()
    }

    #[test]
    fn test_doubling_target() {
        let cap = 64 * MIN_GROWTH;
        assert_eq!(doubling_target(0, 4096, cap), MIN_GROWTH);
        assert_eq!(doubling_target(0, 4096, 64 * KB), 64 * KB);
        assert_eq!(doubling_target(0, 3 * MIN_GROWTH, cap), 3 * MIN_GROWTH);
        assert_eq!(doubling_target(MIN_GROWTH, 4096, cap), 2 * MIN_GROWTH);
        assert_eq!(doubling_target(MIN_GROWTH, 5 * MIN_GROWTH, cap), 5 * MIN_GROWTH);
        assert_eq!(doubling_target(40 * MIN_GROWTH, 0, cap), cap);
    }

    #[test]
    fn test_write_then_read_progresses() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        let range = ByteRange::new(8192, 16384);

        assert!(write(range, &mut state, &device).is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 24576);
        assert!(device.contents(8192, 16384).iter().all(|b| b.is_ascii_lowercase()));

        assert!(read(range, &mut state, &device).is_progressed());
        // The hole before the write reads as zero and is verified too
        assert!(read(ByteRange::new(0, 8192), &mut state, &device).is_progressed());
        assert_eq!(state.counters.writes, 1);
        assert_eq!(state.counters.reads, 2);
    }

    #[test]
    fn test_verify_leaves_counters_alone() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        let range = ByteRange::new(0, 16384);
        assert!(write(range, &mut state, &device).is_progressed());

        assert!(verify(range, &mut state, &device).is_progressed());
        assert_eq!(state.counters.reads, 0);
        assert_eq!(state.counters.bytes_read, 0);
        assert_eq!(device.count_of(OpKind::Read), 1);

        device.corrupt(100, &[0]);
        assert!(matches!(
            verify(range, &mut state, &device),
            Outcome::Diverged(Divergence::Content { offset: 100, .. })
        ));
    }

    #[test]
    fn test_read_of_empty_region_is_skipped() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        let outcome = read(ByteRange::new(0, 4096), &mut state, &device);
        assert!(matches!(outcome, Outcome::Skipped));
        assert_eq!(device.op_count(), 0);
    }

    #[test]
    fn test_read_detects_corruption() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        let range = ByteRange::new(0, 8192);
        assert!(write(range, &mut state, &device).is_progressed());

        device.corrupt(5000, &[0]);
        match read(range, &mut state, &device) {
            Outcome::Diverged(Divergence::Content {
                offset, observed, expected,
            }) => {
                assert_eq!(offset, 5000);
                assert_eq!(observed, 0);
                assert!(expected.is_ascii_lowercase());
            }
            other => panic!("expected content divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_write_io_error_carries_errno() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        device.fail_next(OpKind::Write, libc::EIO);

        match write(ByteRange::new(4096, 4096), &mut state, &device) {
            Outcome::Diverged(div) => {
                assert_eq!(div.kind(), "io");
                assert_eq!(div.errno(), Some(libc::EIO));
            }
            other => panic!("expected io divergence, got {:?}", other),
        }
        // Nothing recorded for a failed write
        assert_eq!(state.shadow.current_logical_size(), 0);
    }

    #[test]
    fn test_write_past_logical_limit_is_invariant_violation() {
        let device = MemDevice::new_file(4096);
        let mut config = ExerciserConfig::for_profile(Profile::File);
        config.max_logical_size = 1024 * KB;
        config.max_op_size = 128 * KB;
        // Zone larger than the logical limit
        let mut state =
            ExerciserState::new(&config, Zone::new(0, 2048 * KB), 4096, Coverage::Full, 3).unwrap();

        match write(ByteRange::new(1024 * KB, 64 * KB), &mut state, &device) {
            Outcome::Diverged(Divergence::Invariant(InvariantViolation::LogicalSizeExceeded {
                requested,
                maximum,
                ..
            })) => {
                assert_eq!(requested, 1088 * KB);
                assert_eq!(maximum, 1024 * KB);
            }
            other => panic!("expected logical size violation, got {:?}", other),
        }
        assert_eq!(device.op_count(), 0);
        assert_eq!(state.shadow.current_logical_size(), 0);
        assert_eq!(state.counters.writes, 0);
    }

    #[test]
    fn test_write_outside_zone_is_invariant_violation() {
        let device = MemDevice::new_block(1024 * KB, 4096);
        let mut state = block_state(Zone::new(0, 256 * KB));
        match write(ByteRange::new(256 * KB, 4096), &mut state, &device) {
            Outcome::Diverged(Divergence::Invariant(InvariantViolation::ZoneEscape { op, .. })) => {
                assert_eq!(op, OpKind::Write)
            }
            other => panic!("expected zone escape, got {:?}", other),
        }
        assert_eq!(device.op_count(), 0);
    }

    #[test]
    fn test_oversized_range_rejected() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        let outcome = write(ByteRange::new(0, 256 * KB), &mut state, &device);
        assert!(matches!(
            outcome,
            Outcome::Diverged(Divergence::Invariant(InvariantViolation::OversizedRange { .. }))
        ));
    }

    #[test]
    fn test_block_device_compares_written_bytes_only() {
        let device = MemDevice::new_block(1024 * KB, 4096);
        let mut state = block_state(Zone::new(0, 512 * KB));

        assert!(write(ByteRange::new(4096, 4096), &mut state, &device).is_progressed());
        // Surrounding bytes still hold stale content and are not compared
        assert!(read(ByteRange::new(0, 16384), &mut state, &device).is_progressed());
        assert_eq!(device.contents(0, 1), vec![STALE_BYTE]);

        device.corrupt(4100, &[STALE_BYTE]);
        assert!(matches!(
            read(ByteRange::new(0, 16384), &mut state, &device),
            Outcome::Diverged(Divergence::Content { offset: 4100, .. })
        ));
    }

    #[test]
    fn test_truncate_grow_reads_zero() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::RangeEnd);

        assert!(write(ByteRange::new(0, 4096), &mut state, &device).is_progressed());
        assert!(truncate(ByteRange::new(0, 64 * KB), &mut state, &device).is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 64 * KB);
        assert_eq!(device.size().unwrap(), 64 * KB);

        assert!(read(ByteRange::new(4096, 60 * KB), &mut state, &device).is_progressed());
        assert!(device.contents(4096, 60 * KB).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_shrink_then_regrow_has_no_stale_data() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::RangeEnd);

        assert!(write(ByteRange::new(0, 64 * KB), &mut state, &device).is_progressed());
        assert!(truncate(ByteRange::new(0, 4096), &mut state, &device).is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 4096);

        assert!(truncate(ByteRange::new(0, 64 * KB), &mut state, &device).is_progressed());
        let region = ByteRange::new(4096, 60 * KB);
        assert!(read(region, &mut state, &device).is_progressed());
        assert!(state.shadow.read_expected(region).iter().all(|&b| b == 0));
        assert!(device.contents(4096, 60 * KB).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_truncate_doubling_from_empty() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);

        assert!(truncate(ByteRange::new(0, 4096), &mut state, &device).is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 1024 * KB);
        // Already at the cap: stays there
        assert!(truncate(ByteRange::new(0, 4096), &mut state, &device).is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 1024 * KB);
        assert_eq!(state.counters.truncates, 2);
    }

    #[test]
    fn test_truncate_io_error() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::RangeEnd);
        device.fail_next(OpKind::Truncate, libc::ENOSPC);
        let outcome = truncate(ByteRange::new(0, 4096), &mut state, &device);
        match outcome {
            Outcome::Diverged(div) => assert_eq!(div.errno(), Some(libc::ENOSPC)),
            other => panic!("expected io divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_discard_to_logical_end() {
        let zone = Zone::new(4096 * KB, 8192 * KB);
        let device = MemDevice::new_block(8192 * KB, 4096);
        let mut state = discard_state(zone, zone.len());

        // From empty: logical region jumps to 1 MiB
        assert!(discard(ByteRange::new(zone.lower, 64 * KB), &mut state, &device).is_progressed());
        assert_eq!(
            device.ops()[0],
            crate::device::mock::OperationRecord {
                op: OpKind::Discard,
                offset: zone.lower,
                length: MIN_GROWTH,
            }
        );

        // Next window doubles it
        assert!(discard(
            ByteRange::new(zone.lower + 64 * KB, 64 * KB),
            &mut state,
            &device
        )
        .is_progressed());
        assert_eq!(state.shadow.current_logical_size(), 2 * MIN_GROWTH);
        assert_eq!(device.ops()[1].length, 2 * MIN_GROWTH - 64 * KB);
        assert_eq!(state.counters.discards, 2);
    }

    #[test]
    fn test_discard_length_bounded_by_max_logical() {
        let zone = Zone::new(0, 4096 * KB);
        let device = MemDevice::new_block(4096 * KB, 4096);
        let mut state = discard_state(zone, 256 * KB);

        assert!(discard(ByteRange::new(0, 64 * KB), &mut state, &device).is_progressed());
        assert_eq!(device.ops()[0].length, 256 * KB);
        assert_eq!(state.shadow.logical_end(), 256 * KB);
    }

    #[test]
    fn test_discard_past_logical_end_is_invariant_violation() {
        let zone = Zone::new(0, 4096 * KB);
        let device = MemDevice::new_block(4096 * KB, 4096);
        let mut state = discard_state(zone, 256 * KB);

        // Range starts beyond the largest logical region this instance may have
        let outcome = discard(ByteRange::new(512 * KB, 64 * KB), &mut state, &device);
        assert!(matches!(
            outcome,
            Outcome::Diverged(Divergence::Invariant(
                InvariantViolation::TruncateBelowOffset { .. }
            ))
        ));
        assert_eq!(device.op_count(), 0);
    }

    #[test]
    fn test_discard_below_zone_is_too_long() {
        let zone = Zone::new(1024 * KB, 2048 * KB);
        let device = MemDevice::new_block(2048 * KB, 4096);
        let mut state = discard_state(zone, 256 * KB);

        // From below the zone the span to the logical end exceeds the limit
        let outcome = discard(ByteRange::new(0, 64 * KB), &mut state, &device);
        match outcome {
            Outcome::Diverged(Divergence::Invariant(InvariantViolation::DiscardTooLong {
                offset,
                length,
                maximum,
            })) => {
                assert_eq!(offset, 0);
                assert_eq!(length, 1024 * KB + 256 * KB);
                assert_eq!(maximum, 256 * KB);
            }
            other => panic!("expected an oversized discard, got {:?}", other),
        }
        assert_eq!(device.op_count(), 0);
    }

    #[test]
    fn test_discard_io_error() {
        let zone = Zone::new(0, 4096 * KB);
        let device = MemDevice::new_block(4096 * KB, 4096);
        let mut state = discard_state(zone, zone.len());
        device.fail_next(OpKind::Discard, libc::EOPNOTSUPP);

        match discard(ByteRange::new(0, 64 * KB), &mut state, &device) {
            Outcome::Diverged(div) => {
                assert_eq!(div.errno(), Some(libc::EOPNOTSUPP));
                assert_eq!(div.to_report().op, Some(OpKind::Discard));
            }
            other => panic!("expected io divergence, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_length_range_policy() {
        let device = MemDevice::new_file(4096);
        let mut state = file_state(TruncatePolicy::Doubling);
        assert!(matches!(
            write(ByteRange::new(0, 0), &mut state, &device),
            Outcome::Skipped
        ));

        state.count_empty_ops = true;
        assert!(write(ByteRange::new(0, 0), &mut state, &device).is_progressed());
        assert_eq!(device.op_count(), 0);
    }
}
