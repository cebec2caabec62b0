//! Conversion from CLI arguments to configuration values

use super::cli::{self, Cli};
use super::{Config, Profile, TruncatePolicy};
use crate::zone::GIB;
use anyhow::{Context, Result};

/// Parse a size string (e.g., "4k", "1M", "1G") to bytes
pub fn parse_size(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if s.ends_with("k") || s.ends_with("kb") {
        (s.trim_end_matches("kb").trim_end_matches("k"), 1024u64)
    } else if s.ends_with("m") || s.ends_with("mb") {
        (s.trim_end_matches("mb").trim_end_matches("m"), 1024 * 1024)
    } else if s.ends_with("g") || s.ends_with("gb") {
        (s.trim_end_matches("gb").trim_end_matches("g"), GIB)
    } else if s.ends_with("t") || s.ends_with("tb") {
        (s.trim_end_matches("tb").trim_end_matches("t"), 1024 * GIB)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .parse()
        .with_context(|| format!("Invalid size format: {}", s))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| anyhow::anyhow!("Size out of range: {}", s))
}

/// Convert a gigabyte count to bytes
pub fn gb_to_bytes(gb: u64) -> Result<u64> {
    gb.checked_mul(GIB)
        .ok_or_else(|| anyhow::anyhow!("Offset out of range: {}G", gb))
}

/// Convert CLI ProfileArg to Profile
pub fn convert_profile(arg: cli::ProfileArg) -> Profile {
    match arg {
        cli::ProfileArg::File => Profile::File,
        cli::ProfileArg::Device => Profile::Device,
        cli::ProfileArg::Discard => Profile::Discard,
    }
}

/// Convert CLI TruncatePolicyArg to TruncatePolicy
pub fn convert_truncate_policy(arg: cli::TruncatePolicyArg) -> TruncatePolicy {
    match arg {
        cli::TruncatePolicyArg::Doubling => TruncatePolicy::Doubling,
        cli::TruncatePolicyArg::RangeEnd => TruncatePolicy::RangeEnd,
    }
}

/// Build the run configuration from CLI arguments
///
/// With `--config`, the file is the base and CLI options override it.
/// Otherwise the base is the default configuration of the chosen profile.
pub fn build_config_from_cli(cli: &Cli) -> Result<Config> {
    let base = match &cli.config {
        Some(path) => super::toml::parse_toml_file(path)?,
        None => {
            let path = cli
                .target
                .clone()
                .ok_or_else(|| anyhow::anyhow!("a target PATH is required"))?;
            let profile = cli.profile.map(convert_profile).unwrap_or_default();
            Config::for_profile(path, profile)
        }
    };

    super::toml::merge_cli_with_config(cli, base)
}
