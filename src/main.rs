//! blkx CLI entry point

use anyhow::{Context, Result};
use blkx::config::{cli::Cli, cli_convert, validator, Config};
use blkx::device::open_device;
use blkx::engine::Exerciser;
use blkx::output::{json, text};
use blkx::util::format::format_bytes;
use blkx::zone;
use tracing::Level;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = cli_convert::build_config_from_cli(&cli)?;
    init_logging(&config);

    validator::validate_config(&config).context("Configuration validation failed")?;

    if !config.output.json {
        println!("blkx v{}", env!("CARGO_PKG_VERSION"));
        println!("Randomized block storage consistency exerciser");
        println!();
        print_configuration(&config)?;
    }

    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let device = open_device(&config.target.path, config.target.direct)
        .with_context(|| format!("Failed to open {}", config.target.path.display()))?;
    let mut exerciser = Exerciser::from_config(&config, device)?;
    let report = exerciser.run()?;

    if config.output.json {
        println!("{}", json::report_to_json(&report)?);
    } else {
        println!();
        text::print_report(&report);
    }
    if let Some(path) = &config.output.json_output {
        json::write_json_report(path, &report, true)?;
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Route tracing to stderr so stdout carries only the report
fn init_logging(config: &Config) {
    let level = if config.runtime.debug {
        Level::DEBUG
    } else if config.runtime.quiet || config.output.json {
        Level::WARN
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Print configuration summary
fn print_configuration(config: &Config) -> Result<()> {
    let ex = &config.exerciser;
    println!("Configuration:");
    println!("  Target:");
    println!("    Path: {}", config.target.path.display());
    println!("    Direct I/O: {}", config.target.direct);
    println!("  Exerciser:");
    println!("    Profile: {}", ex.profile);
    println!("    Operations: {:?}", ex.operations);
    println!("    Positions: {:?}", ex.positions);
    println!("    Iterations: {}", ex.iterations);
    println!("    Max op size: {}", format_bytes(ex.max_op_size));
    println!("    Max logical size: {}", format_bytes(ex.max_logical_size));
    if ex.alignment > 0 {
        println!("    Alignment: {}", format_bytes(ex.alignment));
    }
    println!("    Verify: {} (final: {})", ex.verify, ex.final_verify);
    if let Some(seed) = ex.seed {
        println!("    Seed: {}", seed);
    }

    // Device size is not known until the target is opened
    let plan = zone::plan_instance(config, u64::MAX)?;
    println!("  Zone:");
    println!("    Instance: {}", plan.zone);
    if let Some(partition) = plan.partition {
        println!("    Write zone upper: {}", partition.write_zone.upper);
        println!("    Discard zone lower: {}", partition.discard_zone.lower);
        println!("    Margin: {}", format_bytes(partition.margin));
    }
    Ok(())
}
