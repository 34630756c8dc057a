//! envelope: batch alpha-shape envelopes for point-cloud files.
//!
//! Every `.txt` cloud in a directory gets an envelope mesh next to it and a
//! row in a CSV report with its volume, area, footprint and accuracy.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=cloud_envelope=info` - Per-file summaries
//! - `RUST_LOG=cloud_envelope=debug` - Stage details
//! - `RUST_LOG=cloud_envelope::timing=debug` - Stage timing
//!
//! Without `RUST_LOG`, `-v` enables debug and `-vv` trace output; `-q`
//! keeps only errors.
//!
//! # Example
//!
//! ```bash
//! # Process ./scans with alpha 0.5, reproducible sampling
//! envelope run scans --alpha 0.5 --seed 7
//!
//! # Start from a config file
//! envelope init-config envelope.toml
//! envelope run --config envelope.toml --parallel
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{ConfigOverrides, init, process, run};

/// envelope - Alpha-shape envelopes, volumes and footprints of point clouds.
#[derive(Parser)]
#[command(name = "envelope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Only report errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every point cloud in a directory and append to the report
    Run {
        /// Directory to scan (overrides the config file)
        directory: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Process a single point cloud
    Process {
        /// Input point cloud
        input: PathBuf,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Do not append a row to the report
        #[arg(long)]
        no_report: bool,
    },

    /// Write a config file with every option at its default
    InitConfig {
        /// Destination
        #[arg(default_value = "envelope.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Initialize the tracing subscriber from `RUST_LOG` or the verbosity flags.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "info",
            (false, 1) => "cloud_envelope=debug,envelope_cli=debug,info",
            (false, _) => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    // Install miette's panic hook for better error display
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Run {
            directory,
            overrides,
        } => run::run(directory.as_deref(), overrides, &cli),
        Commands::Process {
            input,
            overrides,
            no_report,
        } => process::run(input, overrides, *no_report, &cli),
        Commands::InitConfig { path, force } => init::run(path, *force, &cli),
    };

    if let Err(e) = &result {
        if let Some(env_err) = e.downcast_ref::<cloud_envelope::EnvelopeError>() {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            eprintln!("  {}: {}", "Code".cyan(), env_err.code());
            eprintln!(
                "  {}: {}",
                "Suggestion".green(),
                env_err.recovery_suggestion()
            );
            if let Some(location) = env_err.location() {
                eprintln!("  {}: {}", "Location".yellow(), location);
            }
        } else {
            eprintln!("{}: {}", "Error".red().bold(), e);
            for cause in e.chain().skip(1) {
                eprintln!("  {}: {}", "Caused by".yellow(), cause);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
