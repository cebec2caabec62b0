//! Configuration validation
//!
//! Everything here can be checked before the device is opened. Checks that
//! need the device (block size, device size) happen when the exerciser is
//! built.

use super::*;
use crate::zone::plan_instance;
use anyhow::Result;

/// Largest accepted single operation
const MAX_OP_SIZE_LIMIT: u64 = 64 * 1024 * 1024;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_exerciser(&config.exerciser)?;
    validate_zones(config)?;
    validate_output(&config.output)?;
    Ok(())
}

/// Validate engine parameters
pub fn validate_exerciser(ex: &ExerciserConfig) -> Result<()> {
    if ex.iterations == 0 {
        anyhow::bail!("iterations must be at least 1");
    }

    if ex.max_logical_size == 0 {
        anyhow::bail!("max_logical_size must be greater than 0");
    }

    if ex.max_op_size == 0 || ex.max_op_size > MAX_OP_SIZE_LIMIT {
        anyhow::bail!(
            "max_op_size must be between 1 and {} bytes, got {}",
            MAX_OP_SIZE_LIMIT,
            ex.max_op_size
        );
    }

    if ex.max_op_size > ex.max_logical_size {
        anyhow::bail!(
            "max_op_size ({}) must not exceed max_logical_size ({})",
            ex.max_op_size,
            ex.max_logical_size
        );
    }

    if ex.alignment != 0 {
        if !ex.alignment.is_power_of_two() {
            anyhow::bail!("alignment must be a power of 2, got {}", ex.alignment);
        }
        if ex.max_op_size % ex.alignment != 0 {
            anyhow::bail!(
                "max_op_size ({}) must be a multiple of alignment ({})",
                ex.max_op_size,
                ex.alignment
            );
        }
    }

    validate_operations(ex)?;
    validate_positions(&ex.positions, ex.max_op_size)?;

    Ok(())
}

fn validate_operations(ex: &ExerciserConfig) -> Result<()> {
    match &ex.operations {
        OperationSelection::Fixed { .. } => {}
        OperationSelection::Rotation { ops } => {
            if ops.is_empty() {
                anyhow::bail!("operation rotation must list at least one operation");
            }
        }
        OperationSelection::Weighted { weights } => {
            let total: u64 = weights.iter().map(|w| w.weight as u64).sum();
            if total == 0 {
                anyhow::bail!("operation weights must sum to more than 0");
            }
        }
    }

    let ops = &ex.operations;
    if ops.includes(OpKind::Discard) {
        if ex.verify || ex.final_verify {
            anyhow::bail!(
                "discard leaves content unspecified and cannot be combined with verification \
                 (set verify = false and final_verify = false)"
            );
        }
        if ops.includes(OpKind::Read) {
            anyhow::bail!("discard cannot be combined with read verification");
        }
    }

    if ops.includes(OpKind::Truncate) && ex.profile != Profile::File {
        anyhow::bail!(
            "truncate requires a resizable target and is only allowed in the file profile, \
             not {}",
            ex.profile
        );
    }

    if ex.final_verify && !ex.verify {
        anyhow::bail!("final_verify requires verify");
    }

    Ok(())
}

fn validate_positions(positions: &PositionMode, max_op_size: u64) -> Result<()> {
    match *positions {
        PositionMode::Random { bias_percent } => {
            if bias_percent > 100 {
                anyhow::bail!("bias_percent must be between 0 and 100, got {}", bias_percent);
            }
        }
        PositionMode::Windowed { stride } => {
            if stride > max_op_size {
                anyhow::bail!(
                    "window stride ({}) must not exceed max_op_size ({})",
                    stride,
                    max_op_size
                );
            }
        }
    }
    Ok(())
}

/// Check the partition layout without knowing the device size
///
/// The device can only shrink the write zone, so a layout that is safe here
/// stays safe once the real device size is known.
pub fn validate_zones(config: &Config) -> Result<()> {
    if config.exerciser.profile == Profile::File {
        return Ok(());
    }

    if config.zones.peer_max_op_size == 0 {
        anyhow::bail!("peer_max_op_size must be greater than 0");
    }

    // Device size is unknown until the target is opened
    plan_instance(config, u64::MAX)?;

    Ok(())
}

/// Validate output configuration
pub fn validate_output(output: &OutputConfig) -> Result<()> {
    if let Some(path) = &output.json_output {
        if path.is_dir() {
            anyhow::bail!("json_output must be a file, not a directory: {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{ZoneError, GIB};

    fn device_config() -> Config {
        Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Device)
    }

    #[test]
    fn test_profile_defaults_are_valid() {
        for profile in [Profile::File, Profile::Device, Profile::Discard] {
            let config = Config::for_profile(PathBuf::from("/dev/sdb"), profile);
            validate_config(&config).unwrap();
        }
    }

    #[test]
    fn test_zero_iterations() {
        let mut config = device_config();
        config.exerciser.iterations = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_op_size_bounds() {
        let mut config = device_config();
        config.exerciser.max_op_size = 0;
        assert!(validate_config(&config).is_err());

        config.exerciser.max_op_size = 2 * GIB;
        assert!(validate_config(&config).is_err());

        config.exerciser.max_op_size = 1024 * 1024;
        config.exerciser.max_logical_size = 512 * 1024;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_alignment_must_be_power_of_two() {
        let mut config = device_config();
        config.exerciser.alignment = 3000;
        assert!(validate_config(&config).is_err());

        config.exerciser.alignment = 8192;
        validate_config(&config).unwrap();

        config.exerciser.max_op_size = 8192 * 3 + 4096;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = Config::for_profile(PathBuf::from("/tmp/f"), Profile::File);
        config.exerciser.operations = OperationSelection::Weighted {
            weights: vec![OpWeight::new(OpKind::Read, 0)],
        };
        assert!(validate_config(&config).is_err());

        config.exerciser.operations = OperationSelection::Rotation { ops: vec![] };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_discard_with_verification_rejected() {
        let mut config = Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Discard);
        config.target.base_offset = Some(20 * GIB);
        config.exerciser.verify = true;
        config.exerciser.final_verify = true;
        assert!(validate_config(&config).is_err());

        config.exerciser.verify = false;
        config.exerciser.final_verify = false;
        config.exerciser.operations = OperationSelection::Rotation {
            ops: vec![OpKind::Discard, OpKind::Read],
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_truncate_only_in_file_profile() {
        let mut config = device_config();
        config.exerciser.operations = OperationSelection::Rotation {
            ops: vec![OpKind::Write, OpKind::Truncate],
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("truncate"));
    }

    #[test]
    fn test_unsafe_discard_lower_rejected() {
        let mut config = device_config();
        config.zones.write_upper = 10 * GIB;
        config.zones.discard_lower = 10 * GIB + 4096;

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ZoneError>(),
            Some(ZoneError::UnsafeDiscardLower { .. })
        ));
    }

    #[test]
    fn test_device_instance_must_fit_write_zone() {
        let mut config = device_config();
        config.target.base_offset = Some(10 * GIB);
        assert!(validate_config(&config).is_err());

        config.target.base_offset = Some(9 * GIB);
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_discard_instance_must_sit_in_discard_zone() {
        let mut config = Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Discard);
        config.target.base_offset = Some(5 * GIB);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_window_stride_bound() {
        let mut config = Config::for_profile(PathBuf::from("/dev/sdb"), Profile::Discard);
        config.target.base_offset = Some(20 * GIB);
        config.exerciser.positions = PositionMode::Windowed { stride: 1024 * 1024 };
        assert!(validate_config(&config).is_err());
    }
}
