//! Subcommands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use cloud_envelope::EnvelopeConfig;

pub mod init;
pub mod process;
pub mod run;

/// Settings shared by `run` and `process`. Each flag overrides the config
/// file, which overrides the defaults.
#[derive(Args, Debug, Default)]
pub struct ConfigOverrides {
    /// TOML config file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Alpha radius, in input units
    #[arg(long, short)]
    pub alpha: Option<f64>,

    /// Fraction of points kept for reconstruction, in (0, 1]
    #[arg(long)]
    pub sampling_ratio: Option<f64>,

    /// Report file name, inside the input directory
    #[arg(long, short)]
    pub output: Option<String>,

    /// Seed for reproducible down-sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Largest hole, in edges, the repair may fill
    #[arg(long)]
    pub max_hole_edges: Option<usize>,

    /// Write preview files (sampled cloud, footprint) for a viewer
    #[arg(long)]
    pub plot: bool,

    /// Process files concurrently
    #[arg(long)]
    pub parallel: bool,
}

impl ConfigOverrides {
    /// Build the effective configuration.
    pub fn resolve(&self, directory: Option<&Path>) -> Result<EnvelopeConfig> {
        let mut config = match &self.config {
            Some(path) => EnvelopeConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => EnvelopeConfig::default(),
        };

        if let Some(dir) = directory {
            config.directory = dir.to_path_buf();
        }
        if let Some(alpha) = self.alpha {
            config.alpha = alpha;
        }
        if let Some(ratio) = self.sampling_ratio {
            config.sampling_ratio = ratio;
        }
        if let Some(name) = &self.output {
            config.output_file_name = name.clone();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(max_edges) = self.max_hole_edges {
            config.max_hole_edges = max_edges;
        }
        config.plot_results |= self.plot;
        config.parallel |= self.parallel;

        Ok(config)
    }
}
