//! Human-readable text output

use crate::engine::{RunOutcome, RunReport};
use crate::util::format::{calculate_rate, format_bytes, format_duration, format_number, format_rate};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Print run results to console
pub fn print_report(report: &RunReport) {
    print!("{}", render_report(report));
}

/// Render the results block printed by [`print_report`]
pub fn render_report(report: &RunReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &RunReport) -> std::fmt::Result {
    let c = &report.counters;

    writeln!(out, "{}", RULE)?;
    writeln!(out, "                    RUN RESULTS")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out)?;

    let status = match report.outcome {
        RunOutcome::Completed => "PASSED",
        RunOutcome::Failed => "FAILED",
    };
    writeln!(out, "Result:       {}", status)?;
    writeln!(out, "Profile:      {} on {}", report.profile, report.device_kind)?;
    writeln!(out, "Started:      {}", report.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(out, "Elapsed Time: {}", format_duration(report.elapsed))?;
    writeln!(out, "Seed:         {}", report.seed)?;
    writeln!(out)?;

    writeln!(out, "Zone:")?;
    writeln!(out, "  Range:     {} ({})", report.zone, format_bytes(report.zone.len()))?;
    writeln!(out, "  Alignment: {}", format_bytes(report.alignment))?;
    if let Some(plan) = &report.partition {
        writeln!(out, "  Write zone:   {}", plan.write_zone)?;
        writeln!(out, "  Discard zone: {}", plan.discard_zone)?;
        writeln!(out, "  Margin:       {}", format_bytes(plan.margin))?;
    }
    writeln!(out)?;

    let ops_rate = format_rate(calculate_rate(report.iterations, report.elapsed));
    writeln!(out, "Operations:")?;
    writeln!(
        out,
        "  Progress: {} / {} ({} ops/s)",
        format_number(report.iterations),
        format_number(report.budget),
        ops_rate
    )?;
    writeln!(out, "  Read:     {} ops ({})", format_number(c.reads), format_bytes(c.bytes_read))?;
    writeln!(out, "  Write:    {} ops ({})", format_number(c.writes), format_bytes(c.bytes_written))?;
    if c.truncates > 0 {
        writeln!(out, "  Truncate: {} ops", format_number(c.truncates))?;
    }
    if c.discards > 0 {
        writeln!(
            out,
            "  Discard:  {} ops ({})",
            format_number(c.discards),
            format_bytes(c.bytes_discarded)
        )?;
    }
    if c.skipped > 0 {
        writeln!(out, "  Skipped:  {}", format_number(c.skipped))?;
    }
    writeln!(out)?;

    writeln!(out, "Logical Size: {}", format_bytes(report.logical_size))?;
    if report.final_verify_bytes > 0 {
        writeln!(out, "Final Verify: {}", format_bytes(report.final_verify_bytes))?;
    }

    if let Some(div) = &report.divergence {
        writeln!(out)?;
        writeln!(out, "Divergence ({}):", div.kind)?;
        writeln!(out, "  {}", div.message)?;
        if let Some(errno) = div.errno {
            writeln!(out, "  errno: {} ({})", errno, std::io::Error::from_raw_os_error(errno))?;
        }
    }

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    Ok(())
}
