//! envelope process command - one point cloud.

use std::path::Path;

use anyhow::{Context, Result};
use cloud_envelope::{ReportWriter, process_file};
use colored::Colorize;

use super::ConfigOverrides;
use crate::{Cli, OutputFormat, output};

pub fn run(input: &Path, overrides: &ConfigOverrides, no_report: bool, cli: &Cli) -> Result<()> {
    // The report goes next to the input unless a directory is configured.
    let parent = input.parent().filter(|p| !p.as_os_str().is_empty());
    let mut config = overrides.resolve(None)?;
    if overrides.config.is_none()
        && let Some(parent) = parent
    {
        config.directory = parent.to_path_buf();
    }
    tracing::debug!(?config, "Resolved configuration");

    let writer = if no_report {
        None
    } else {
        let path = config.report_path();
        Some(
            ReportWriter::open(&path)
                .with_context(|| format!("Cannot write report {}", path.display()))?,
        )
    };

    let report = process_file(input, &config)
        .with_context(|| format!("Failed to process {}", input.display()))?;

    if let Some(writer) = &writer {
        writer
            .append(&report.results_row())
            .with_context(|| format!("Failed to append to {}", writer.path().display()))?;
    }

    match cli.format {
        OutputFormat::Json => output::print(&report, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(
                    &format!("Envelope saved to {}", report.mesh_path.display()),
                    cli.format,
                    cli.quiet,
                );
                println!(
                    "  {}: {} ({} sampled)",
                    "Points".cyan(),
                    report.points,
                    report.sampled_points
                );
                println!(
                    "  {}: {} vertices, {} faces",
                    "Envelope".cyan(),
                    report.envelope_vertices,
                    report.envelope_faces
                );
                if report.watertight {
                    println!("  {}: {:.4}", "Volume".cyan(), report.metrics.volume);
                    println!("  {}: {:.4}", "Area".cyan(), report.metrics.area);
                } else {
                    println!(
                        "  {}: envelope is not closed, volume and area reported as 0",
                        "Repair".red()
                    );
                }
                if report.holes_filled > 0 {
                    println!("  {}: {} hole(s) filled", "Repair".green(), report.holes_filled);
                }
                println!(
                    "  {}: {:.4}",
                    "Footprint".cyan(),
                    report.metrics.projected_area
                );
                println!(
                    "  {}: {:.1}% of points enclosed",
                    "Accuracy".cyan(),
                    report.metrics.accuracy
                );
                println!(
                    "  {}: {} ({} closed)",
                    "Envelopes".cyan(),
                    report.metrics.envelope_count,
                    report.closed_shells
                );
                for preview in &report.previews {
                    println!("  {}: {}", "Preview".cyan(), preview.display());
                }
                if let Some(writer) = &writer {
                    println!("  {}: {}", "Report".cyan(), writer.path().display());
                }
            }
        }
    }

    Ok(())
}
