//! envelope init-config command - write the default configuration.

use std::path::Path;

use anyhow::{Context, Result, bail};
use cloud_envelope::EnvelopeConfig;
use serde::Serialize;

use crate::{Cli, output};

#[derive(Serialize)]
struct InitResult {
    path: String,
    overwritten: bool,
}

pub fn run(path: &Path, force: bool, cli: &Cli) -> Result<()> {
    let exists = path.exists();
    if exists && !force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }

    let toml = EnvelopeConfig::default().to_toml()?;
    std::fs::write(path, toml)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    output::success(
        &format!("Wrote default configuration to {}", path.display()),
        cli.format,
        cli.quiet,
    );
    output::print(
        &InitResult {
            path: path.display().to_string(),
            overwritten: exists,
        },
        cli.format,
        cli.quiet,
    );
    Ok(())
}
