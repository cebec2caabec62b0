//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Exerciser profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    /// Regular file: weighted read/write/truncate
    File,
    /// Block device write zone: write then read back
    Device,
    /// Block device discard zone: windowed discards
    Discard,
}

/// Truncate sizing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TruncatePolicyArg {
    /// Grow toward double the current size
    Doubling,
    /// Resize to the end of the generated range
    RangeEnd,
}

/// blkx - randomized consistency exerciser for block storage
#[derive(Parser, Debug)]
#[command(name = "blkx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// File or block device to exercise
    ///
    /// Optional when a config file names the target.
    #[arg(value_name = "PATH")]
    pub target: Option<PathBuf>,

    /// Lower bound of this instance's zone, in GiB
    #[arg(value_name = "OFFSET_GB")]
    pub offset_gb: Option<u64>,

    /// Exerciser profile [default: device]
    #[arg(short = 'p', long, value_enum, env = "BLKX_PROFILE")]
    pub profile: Option<ProfileArg>,

    /// TOML configuration file (CLI options override it)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Engine Options ===
    /// Number of operations that must make progress
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// Maximum size of a single operation (e.g., 4k, 128k, 1M)
    #[arg(long)]
    pub max_op_size: Option<String>,

    /// Maximum logical size of the working region (e.g., 64M, 1G)
    #[arg(long)]
    pub max_logical_size: Option<String>,

    /// Extra alignment on top of the device block size (e.g., 4k)
    #[arg(long)]
    pub alignment: Option<String>,

    /// Random seed (drawn from entropy when omitted)
    #[arg(long, env = "BLKX_SEED")]
    pub seed: Option<u64>,

    /// How truncate computes the new size
    #[arg(long, value_enum)]
    pub truncate_policy: Option<TruncatePolicyArg>,

    /// Skip the final read-back of the whole logical region
    #[arg(long)]
    pub no_final_verify: bool,

    /// Count zero-length operations toward the budget
    #[arg(long)]
    pub count_empty_ops: bool,

    // === Zone Options ===
    /// Upper bound of the write zone, in GiB
    #[arg(long)]
    pub write_upper_gb: Option<u64>,

    /// Lower bound of the discard zone, in GiB
    #[arg(long)]
    pub discard_lower_gb: Option<u64>,

    /// Maximum operation size of the instance in the other zone
    #[arg(long)]
    pub peer_max_op_size: Option<String>,

    // === IO Options ===
    /// Use buffered IO instead of O_DIRECT
    #[arg(long)]
    pub buffered: bool,

    // === Output Options ===
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON report to a file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Log every operation
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Log warnings and errors only
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Validate configuration and plan zones without issuing any IO
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.target.is_none() && self.config.is_none() {
            anyhow::bail!("a target PATH or --config file is required");
        }

        if let Some(0) = self.iterations {
            anyhow::bail!("iterations must be at least 1");
        }

        if let (Some(w), Some(d)) = (self.write_upper_gb, self.discard_lower_gb) {
            if d < w {
                anyhow::bail!(
                    "discard zone lower bound ({}G) is below write zone upper bound ({}G)",
                    d,
                    w
                );
            }
        }

        Ok(())
    }
}
