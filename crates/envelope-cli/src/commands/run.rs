//! envelope run command - process a whole directory.

use std::path::Path;

use anyhow::{Context, Result};
use cloud_envelope::{BatchSummary, run_batch};
use colored::Colorize;

use super::ConfigOverrides;
use crate::{Cli, OutputFormat, output};

pub fn run(directory: Option<&Path>, overrides: &ConfigOverrides, cli: &Cli) -> Result<()> {
    let config = overrides.resolve(directory)?;
    tracing::debug!(?config, "Resolved configuration");

    output::info(
        &format!(
            "Processing {} (alpha {}, sampling ratio {})",
            config.directory.display(),
            config.alpha,
            config.sampling_ratio
        ),
        cli.format,
        cli.quiet,
    );

    let summary = run_batch(&config)
        .with_context(|| format!("Batch over {} aborted", config.directory.display()))?;

    match cli.format {
        OutputFormat::Json => output::print(&summary, cli.format, cli.quiet),
        OutputFormat::Text => {
            if !cli.quiet {
                print_summary(&summary);
            }
        }
    }

    for failure in &summary.failures {
        output::warning(
            &format!(
                "{} skipped [{}]: {}",
                failure.path.display(),
                failure.code,
                failure.message
            ),
            cli.format,
            cli.quiet,
        );
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    println!("{}", "Envelopes".bold().underline());
    for file in &summary.files {
        let name = file
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let status = if file.watertight {
            "closed".green()
        } else {
            "open".red()
        };
        println!(
            "  {} [{}] volume {:.4}, area {:.4}, footprint {:.4}, accuracy {:.1}%, {} envelope(s)",
            name.cyan(),
            status,
            file.metrics.volume,
            file.metrics.area,
            file.metrics.projected_area,
            file.metrics.accuracy,
            file.metrics.envelope_count
        );
    }

    let counts = format!(
        "{} processed, {} failed",
        summary.files.len(),
        summary.failures.len()
    );
    if summary.is_clean() {
        println!("{} {}", "✓".green().bold(), counts);
    } else {
        println!("{} {}", "!".yellow().bold(), counts);
    }
    if summary.open_envelopes() > 0 {
        println!(
            "  {}: {} envelope(s) could not be closed; their volume and area are reported as 0",
            "Note".yellow(),
            summary.open_envelopes()
        );
    }
    println!("  {}: {}", "Report".cyan(), summary.report_path.display());
}
