//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//!
//! One engine runs in three profiles. A profile fixes the defaults for the
//! operation mix, position mode, iteration budget and verification; every one
//! of them can be overridden individually from the CLI or a config file.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::error::OpKind;
use crate::zone::{DEFAULT_DISCARD_LOWER, DEFAULT_WRITE_UPPER, GIB};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default maximum logical size of an instance
pub const DEFAULT_MAX_LOGICAL_SIZE: u64 = GIB;

/// Default maximum size of a single operation
pub const DEFAULT_MAX_OP_SIZE: u64 = 128 * 1024;

/// Complete run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub exerciser: ExerciserConfig,
    #[serde(default)]
    pub zones: ZoneConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Configuration for `path` with every other value at its profile default
    pub fn for_profile(path: PathBuf, profile: Profile) -> Self {
        Self {
            target: TargetConfig {
                path,
                base_offset: None,
                direct: true,
            },
            exerciser: ExerciserConfig::for_profile(profile),
            zones: ZoneConfig::default(),
            output: OutputConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }

    /// Lower bound of the working zone
    ///
    /// Discard instances default to the discard zone's lower bound; every
    /// other profile defaults to offset 0.
    pub fn base_offset(&self) -> u64 {
        match (self.target.base_offset, self.exerciser.profile) {
            (Some(base), _) => base,
            (None, Profile::Discard) => self.zones.discard_lower,
            (None, _) => 0,
        }
    }
}

/// Device or file under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Regular file or block device
    pub path: PathBuf,
    /// Lower bound of this instance's working zone, in bytes
    ///
    /// Unset means the start of the zone assigned to the profile; see
    /// [`Config::base_offset`].
    #[serde(default)]
    pub base_offset: Option<u64>,
    /// Open with O_DIRECT
    #[serde(default = "default_true")]
    pub direct: bool,
}

fn default_true() -> bool {
    true
}

/// Exerciser profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Regular file: weighted read/write/truncate over a file reset to zero
    /// bytes
    File,
    /// Block device write zone: write then read back the same range
    Device,
    /// Block device discard zone: windowed discards, no verification
    Discard,
}

impl Default for Profile {
    fn default() -> Self {
        Self::Device
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::File => write!(f, "file"),
            Profile::Device => write!(f, "device"),
            Profile::Discard => write!(f, "discard"),
        }
    }
}

/// How the driver picks the next operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum OperationSelection {
    /// Always the same operation
    Fixed { op: OpKind },
    /// All listed operations in order, sharing one generated range
    Rotation { ops: Vec<OpKind> },
    /// One operation per range, drawn with the given weights
    Weighted { weights: Vec<OpWeight> },
}

impl OperationSelection {
    /// Whether `op` can ever be selected
    pub fn includes(&self, op: OpKind) -> bool {
        match self {
            OperationSelection::Fixed { op: fixed } => *fixed == op,
            OperationSelection::Rotation { ops } => ops.contains(&op),
            OperationSelection::Weighted { weights } => {
                weights.iter().any(|w| w.op == op && w.weight > 0)
            }
        }
    }

    /// Whether no operation can ever be selected
    pub fn is_empty(&self) -> bool {
        match self {
            OperationSelection::Fixed { .. } => false,
            OperationSelection::Rotation { ops } => ops.is_empty(),
            OperationSelection::Weighted { weights } => weights.iter().all(|w| w.weight == 0),
        }
    }
}

/// Weight of one operation in a weighted selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpWeight {
    pub op: OpKind,
    pub weight: u32,
}

impl OpWeight {
    pub const fn new(op: OpKind, weight: u32) -> Self {
        Self { op, weight }
    }
}

/// How ranges are placed in the zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PositionMode {
    /// Uniform offsets; `bias_percent` of them land inside the current
    /// logical region
    Random {
        #[serde(default)]
        bias_percent: u8,
    },
    /// Fixed strides through the zone, wrapping at the end; a stride of 0
    /// means the maximum operation size
    Windowed {
        #[serde(default)]
        stride: u64,
    },
}

/// How truncate and discard compute the new logical size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncatePolicy {
    /// Jump to 1 MiB from empty, then roughly double, capped at the maximum
    Doubling,
    /// Truncate to the end of the generated range (may shrink)
    RangeEnd,
}

impl Default for TruncatePolicy {
    fn default() -> Self {
        Self::Doubling
    }
}

/// Engine parameters for one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ExerciserSection")]
pub struct ExerciserConfig {
    pub profile: Profile,
    pub operations: OperationSelection,
    pub positions: PositionMode,
    /// Number of operations that must make progress
    pub iterations: u64,
    pub max_op_size: u64,
    pub max_logical_size: u64,
    /// Extra alignment on top of the device block size; 0 means none
    pub alignment: u64,
    /// Compare reads against the shadow model
    pub verify: bool,
    /// Re-read the whole logical region after the budget completes
    pub final_verify: bool,
    pub truncate_policy: TruncatePolicy,
    /// Let zero-length operations count toward the budget
    pub count_empty_ops: bool,
    /// Random seed; drawn from entropy when absent
    pub seed: Option<u64>,
}

impl ExerciserConfig {
    /// Defaults of `profile`
    pub fn for_profile(profile: Profile) -> Self {
        let (operations, positions, iterations, verify) = match profile {
            Profile::File => (
                OperationSelection::Weighted {
                    weights: vec![
                        OpWeight::new(OpKind::Read, 40),
                        OpWeight::new(OpKind::Write, 40),
                        OpWeight::new(OpKind::Truncate, 20),
                    ],
                },
                PositionMode::Random { bias_percent: 50 },
                1000,
                true,
            ),
            Profile::Device => (
                OperationSelection::Rotation {
                    ops: vec![OpKind::Write, OpKind::Read],
                },
                PositionMode::Random { bias_percent: 0 },
                10_000,
                true,
            ),
            Profile::Discard => (
                OperationSelection::Fixed { op: OpKind::Discard },
                PositionMode::Windowed { stride: 0 },
                10_000,
                false,
            ),
        };

        Self {
            profile,
            operations,
            positions,
            iterations,
            max_op_size: DEFAULT_MAX_OP_SIZE,
            max_logical_size: DEFAULT_MAX_LOGICAL_SIZE,
            alignment: 0,
            verify,
            final_verify: verify,
            truncate_policy: TruncatePolicy::default(),
            count_empty_ops: false,
            seed: None,
        }
    }
}

impl Default for ExerciserConfig {
    fn default() -> Self {
        Self::for_profile(Profile::default())
    }
}

/// `[exerciser]` table as written in a config file
///
/// Anything left out takes the default of the chosen profile.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExerciserSection {
    #[serde(default)]
    profile: Profile,
    operations: Option<OperationSelection>,
    positions: Option<PositionMode>,
    iterations: Option<u64>,
    max_op_size: Option<u64>,
    max_logical_size: Option<u64>,
    alignment: Option<u64>,
    verify: Option<bool>,
    final_verify: Option<bool>,
    truncate_policy: Option<TruncatePolicy>,
    count_empty_ops: Option<bool>,
    seed: Option<u64>,
}

impl From<ExerciserSection> for ExerciserConfig {
    fn from(section: ExerciserSection) -> Self {
        let defaults = ExerciserConfig::for_profile(section.profile);
        let verify = section.verify.unwrap_or(defaults.verify);
        Self {
            profile: section.profile,
            operations: section.operations.unwrap_or(defaults.operations),
            positions: section.positions.unwrap_or(defaults.positions),
            iterations: section.iterations.unwrap_or(defaults.iterations),
            max_op_size: section.max_op_size.unwrap_or(defaults.max_op_size),
            max_logical_size: section.max_logical_size.unwrap_or(defaults.max_logical_size),
            alignment: section.alignment.unwrap_or(defaults.alignment),
            verify,
            final_verify: section.final_verify.unwrap_or(verify),
            truncate_policy: section.truncate_policy.unwrap_or(defaults.truncate_policy),
            count_empty_ops: section.count_empty_ops.unwrap_or(defaults.count_empty_ops),
            seed: section.seed,
        }
    }
}

/// Device partition between a write instance and a discard instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// Upper bound of the write zone, in bytes
    #[serde(default = "default_write_upper")]
    pub write_upper: u64,
    /// Lower bound of the discard zone, in bytes
    #[serde(default = "default_discard_lower")]
    pub discard_lower: u64,
    /// Maximum operation size of the instance running in the other zone
    #[serde(default = "default_peer_max_op_size")]
    pub peer_max_op_size: u64,
}

fn default_write_upper() -> u64 {
    DEFAULT_WRITE_UPPER
}

fn default_discard_lower() -> u64 {
    DEFAULT_DISCARD_LOWER
}

fn default_peer_max_op_size() -> u64 {
    DEFAULT_MAX_OP_SIZE
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            write_upper: default_write_upper(),
            discard_lower: default_discard_lower(),
            peer_max_op_size: default_peer_max_op_size(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Print the report as JSON instead of text
    #[serde(default)]
    pub json: bool,
    /// Also write the JSON report to this file
    pub json_output: Option<PathBuf>,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Validate and plan, but issue no I/O
    #[serde(default)]
    pub dry_run: bool,
    /// Log every operation
    #[serde(default)]
    pub debug: bool,
    /// Log warnings and errors only
    #[serde(default)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults() {
        let file = ExerciserConfig::for_profile(Profile::File);
        assert_eq!(file.iterations, 1000);
        assert!(file.operations.includes(OpKind::Truncate));
        assert_eq!(file.positions, PositionMode::Random { bias_percent: 50 });

        let device = ExerciserConfig::for_profile(Profile::Device);
        assert_eq!(device.iterations, 10_000);
        assert!(device.operations.includes(OpKind::Write));
        assert!(!device.operations.includes(OpKind::Truncate));
        assert!(device.verify);

        let discard = ExerciserConfig::for_profile(Profile::Discard);
        assert_eq!(discard.operations, OperationSelection::Fixed { op: OpKind::Discard });
        assert!(!discard.verify);
        assert!(!discard.final_verify);
    }

    #[test]
    fn test_empty_selection() {
        assert!(!OperationSelection::Fixed { op: OpKind::Read }.is_empty());
        assert!(OperationSelection::Rotation { ops: vec![] }.is_empty());
        assert!(OperationSelection::Weighted { weights: vec![] }.is_empty());
        assert!(OperationSelection::Weighted {
            weights: vec![OpWeight::new(OpKind::Write, 0)]
        }
        .is_empty());
        assert!(!OperationSelection::Weighted {
            weights: vec![OpWeight::new(OpKind::Write, 0), OpWeight::new(OpKind::Read, 1)]
        }
        .is_empty());
        for profile in [Profile::File, Profile::Device, Profile::Discard] {
            assert!(!ExerciserConfig::for_profile(profile).operations.is_empty());
        }
    }

    #[test]
    fn test_base_offset_follows_profile() {
        let mut discard = Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Discard);
        assert_eq!(discard.base_offset(), DEFAULT_DISCARD_LOWER);

        discard.zones.discard_lower = 30 * GIB;
        assert_eq!(discard.base_offset(), 30 * GIB);

        discard.target.base_offset = Some(40 * GIB);
        assert_eq!(discard.base_offset(), 40 * GIB);

        let device = Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Device);
        assert_eq!(device.base_offset(), 0);
    }

    #[test]
    fn test_shared_defaults() {
        for profile in [Profile::File, Profile::Device, Profile::Discard] {
            let config = ExerciserConfig::for_profile(profile);
            assert_eq!(config.max_logical_size, 1024 * 1024 * 1024);
            assert_eq!(config.max_op_size, 128 * 1024);
        }
        let zones = ZoneConfig::default();
        assert_eq!(zones.write_upper, 10 * GIB);
        assert_eq!(zones.discard_lower, 20 * GIB);
    }

    #[test]
    fn test_weighted_zero_weight_not_included() {
        let selection = OperationSelection::Weighted {
            weights: vec![OpWeight::new(OpKind::Read, 0), OpWeight::new(OpKind::Write, 1)],
        };
        assert!(!selection.includes(OpKind::Read));
        assert!(selection.includes(OpKind::Write));
    }

    #[test]
    fn test_section_fills_profile_defaults() {
        let section = ExerciserSection {
            profile: Profile::Discard,
            iterations: Some(5),
            ..Default::default()
        };
        let config = ExerciserConfig::from(section);
        assert_eq!(config.iterations, 5);
        assert_eq!(config.positions, PositionMode::Windowed { stride: 0 });
        assert!(!config.final_verify);
    }
}
