//! TOML configuration file parsing

use super::cli::Cli;
use super::cli_convert::{convert_profile, convert_truncate_policy, gb_to_bytes, parse_size};
use super::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
///
/// A `--profile` that differs from the file's profile replaces the
/// profile-dependent values (operation mix, positions, budget, verification)
/// with the new profile's defaults; sizes, alignment and seed carry over.
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    // Target
    if let Some(path) = &cli.target {
        config.target.path = path.clone();
    }
    if let Some(gb) = cli.offset_gb {
        config.target.base_offset = Some(gb_to_bytes(gb)?);
    }
    if cli.buffered {
        config.target.direct = false;
    }

    // Profile
    if let Some(arg) = cli.profile {
        let profile = convert_profile(arg);
        if profile != config.exerciser.profile {
            let old = &config.exerciser;
            let mut fresh = ExerciserConfig::for_profile(profile);
            fresh.max_op_size = old.max_op_size;
            fresh.max_logical_size = old.max_logical_size;
            fresh.alignment = old.alignment;
            fresh.seed = old.seed;
            fresh.truncate_policy = old.truncate_policy;
            fresh.count_empty_ops = old.count_empty_ops;
            config.exerciser = fresh;
        }
    }

    // Engine
    let exerciser = &mut config.exerciser;
    if let Some(n) = cli.iterations {
        exerciser.iterations = n;
    }
    if let Some(s) = &cli.max_op_size {
        exerciser.max_op_size = parse_size(s).context("Invalid max op size")?;
    }
    if let Some(s) = &cli.max_logical_size {
        exerciser.max_logical_size = parse_size(s).context("Invalid max logical size")?;
    }
    if let Some(s) = &cli.alignment {
        exerciser.alignment = parse_size(s).context("Invalid alignment")?;
    }
    if let Some(seed) = cli.seed {
        exerciser.seed = Some(seed);
    }
    if let Some(policy) = cli.truncate_policy {
        exerciser.truncate_policy = convert_truncate_policy(policy);
    }
    if cli.no_final_verify {
        exerciser.final_verify = false;
    }
    if cli.count_empty_ops {
        exerciser.count_empty_ops = true;
    }

    // Zones
    if let Some(gb) = cli.write_upper_gb {
        config.zones.write_upper = gb_to_bytes(gb)?;
    }
    if let Some(gb) = cli.discard_lower_gb {
        config.zones.discard_lower = gb_to_bytes(gb)?;
    }
    if let Some(s) = &cli.peer_max_op_size {
        config.zones.peer_max_op_size = parse_size(s).context("Invalid peer max op size")?;
    }

    // Output / runtime
    if cli.json {
        config.output.json = true;
    }
    if let Some(path) = &cli.json_output {
        config.output.json_output = Some(path.clone());
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }
    if cli.verbose {
        config.runtime.debug = true;
    }
    if cli.quiet {
        config.runtime.quiet = true;
    }

    Ok(config)
}
