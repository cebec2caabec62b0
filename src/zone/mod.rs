//! Address-space partitioning
//!
//! A write/read/truncate instance and a discard-only instance may run as
//! separate processes against the same device. They never coordinate at run
//! time; safety comes from giving each a disjoint slice of the device chosen
//! up front:
//!
//! ```text
//! 0                write_upper        discard_lower              device_end
//! |---- write zone ----|---- margin ----|------ discard zone ------|
//! ```
//!
//! The margin is at least the larger of the two instances' maximum single
//! operation sizes, so an operation issued right at a zone boundary cannot
//! reach the other zone. Layouts that violate the margin are rejected before
//! any I/O is issued.

use crate::config::{Config, Profile};
use crate::position::Zone;
use serde::Serialize;
use thiserror::Error;

pub const GIB: u64 = 1024 * 1024 * 1024;

/// Default upper bound of the write zone
pub const DEFAULT_WRITE_UPPER: u64 = 10 * GIB;

/// Default lower bound of the discard zone
pub const DEFAULT_DISCARD_LOWER: u64 = 20 * GIB;

/// Partitioning rejections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error(
        "discard zone lower bound {requested} is below the minimum safe bound {minimum} \
         (write zone ends at {write_upper}, margin {margin})"
    )]
    UnsafeDiscardLower {
        requested: u64,
        minimum: u64,
        write_upper: u64,
        margin: u64,
    },

    #[error("{profile} instance zone {zone} leaves its assigned zone {assigned}")]
    OutsideAssigned {
        profile: Profile,
        zone: Zone,
        assigned: Zone,
    },

    #[error("zone {zone} extends past the end of the device ({device_size} bytes)")]
    PastDeviceEnd { zone: Zone, device_size: u64 },

    #[error("zone {zone} is empty")]
    Empty { zone: Zone },

    #[error("zone {zone} is not aligned to {unit} bytes")]
    Misaligned { zone: Zone, unit: u64 },
}

/// Per-instance limits that feed the margin computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceLimits {
    pub max_op_size: u64,
}

/// Caller-supplied partition bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionRequest {
    pub device_size: u64,
    pub write_upper: u64,
    pub discard_lower: u64,
    pub write: InstanceLimits,
    pub discard: InstanceLimits,
}

/// Computed, validated partition of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZonePlan {
    pub write_zone: Zone,
    pub discard_zone: Zone,
    pub margin: u64,
    pub device_size: u64,
}

impl ZonePlan {
    /// Margin required between the two zones
    pub fn required_margin(write: &InstanceLimits, discard: &InstanceLimits) -> u64 {
        write.max_op_size.max(discard.max_op_size)
    }

    /// Compute the partition, rejecting an unsafe discard lower bound
    pub fn compute(req: &PartitionRequest) -> Result<Self, ZoneError> {
        let margin = Self::required_margin(&req.write, &req.discard);
        let write_upper = req.write_upper.min(req.device_size);
        let minimum = write_upper.saturating_add(margin);

        if req.discard_lower < minimum {
            return Err(ZoneError::UnsafeDiscardLower {
                requested: req.discard_lower,
                minimum,
                write_upper,
                margin,
            });
        }

        Ok(Self {
            write_zone: Zone::new(0, write_upper),
            discard_zone: Zone::new(req.discard_lower, req.device_size.max(req.discard_lower)),
            margin,
            device_size: req.device_size,
        })
    }

    /// Working zone `[base, base + max_logical_size)` of one instance
    ///
    /// The zone must sit inside the zone assigned to `profile` and inside the
    /// device. File instances are not partitioned and only need to fit the
    /// device bounds they are given.
    pub fn instance_zone(
        &self,
        profile: Profile,
        base: u64,
        max_logical_size: u64,
    ) -> Result<Zone, ZoneError> {
        let zone = Zone::new(base, base.saturating_add(max_logical_size));
        if zone.is_empty() {
            return Err(ZoneError::Empty { zone });
        }

        let assigned = match profile {
            Profile::Device => self.write_zone,
            Profile::Discard => self.discard_zone,
            Profile::File => Zone::new(0, u64::MAX),
        };
        if zone.lower < assigned.lower || zone.upper > assigned.upper {
            return Err(ZoneError::OutsideAssigned {
                profile,
                zone,
                assigned,
            });
        }

        if profile != Profile::File && zone.upper > self.device_size {
            return Err(ZoneError::PastDeviceEnd {
                zone,
                device_size: self.device_size,
            });
        }

        Ok(zone)
    }
}

/// Zone layout of one configured instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancePlan {
    /// Device partition; `None` for file instances
    pub partition: Option<ZonePlan>,
    /// Working zone of this instance
    pub zone: Zone,
}

/// Plan the working zone of the instance described by `config`
///
/// Device and discard instances get a partition computed from the configured
/// bounds, with the peer instance's limits taken from
/// `zones.peer_max_op_size`. File instances are not partitioned.
pub fn plan_instance(config: &Config, device_size: u64) -> Result<InstancePlan, ZoneError> {
    let exerciser = &config.exerciser;
    let base = config.base_offset();

    if exerciser.profile == Profile::File {
        let zone = Zone::new(base, base.saturating_add(exerciser.max_logical_size));
        if zone.is_empty() {
            return Err(ZoneError::Empty { zone });
        }
        return Ok(InstancePlan {
            partition: None,
            zone,
        });
    }

    let own = InstanceLimits {
        max_op_size: exerciser.max_op_size,
    };
    let peer = InstanceLimits {
        max_op_size: config.zones.peer_max_op_size,
    };
    let (write, discard) = match exerciser.profile {
        Profile::Discard => (peer, own),
        _ => (own, peer),
    };

    let plan = ZonePlan::compute(&PartitionRequest {
        device_size,
        write_upper: config.zones.write_upper,
        discard_lower: config.zones.discard_lower,
        write,
        discard,
    })?;
    let zone = plan.instance_zone(exerciser.profile, base, exerciser.max_logical_size)?;

    Ok(InstancePlan {
        partition: Some(plan),
        zone,
    })
}

/// Reject a zone whose bounds are not multiples of `unit`
pub fn check_alignment(zone: Zone, unit: u64) -> Result<(), ZoneError> {
    if zone.lower % unit != 0 || zone.upper % unit != 0 {
        return Err(ZoneError::Misaligned { zone, unit });
    }
    Ok(())
}
