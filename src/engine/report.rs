//! Final run report

use super::OpCounters;
use crate::config::Profile;
use crate::device::DeviceKind;
use crate::error::DivergenceReport;
use crate::position::Zone;
use crate::zone::ZonePlan;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The iteration budget was reached with no divergence
    Completed,
    /// A divergence stopped the run
    Failed,
}

/// Everything a human or a harness needs to judge a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub profile: Profile,
    pub device_kind: DeviceKind,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub seed: u64,
    /// Operations that made progress
    pub iterations: u64,
    pub budget: u64,
    pub counters: OpCounters,
    /// Logical size relative to the zone's lower bound
    pub logical_size: u64,
    /// Absolute offset one past the logical region
    pub logical_end: u64,
    pub alignment: u64,
    pub zone: Zone,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<ZonePlan>,
    /// Bytes compared by the final read-back
    pub final_verify_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<DivergenceReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}
