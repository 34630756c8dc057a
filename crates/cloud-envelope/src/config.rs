//! Batch configuration.
//!
//! Settings are read once, validated, and passed by reference into the
//! pipeline. Every field has a default, so a config file only needs the
//! values it changes.
//!
//! # Example TOML
//!
//! ```toml
//! directory = "scans"
//! alpha = 0.5
//! sampling_ratio = 0.2
//! output_file_name = "envelopes.csv"
//! plot_results = true
//! seed = 42
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::repair::RepairParams;

/// Settings for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Directory scanned for input clouds.
    pub directory: PathBuf,

    /// Alpha radius for the envelope and the footprint.
    pub alpha: f64,

    /// Fraction of points kept for reconstruction, in (0, 1].
    pub sampling_ratio: f64,

    /// Report file name, relative to `directory`.
    pub output_file_name: String,

    /// Write preview files (sampled cloud, footprint) next to each envelope.
    pub plot_results: bool,

    /// Seed for down-sampling. Random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Largest boundary loop, in edges, the repair will fill.
    pub max_hole_edges: usize,

    /// Input file extensions, matched case-insensitively.
    pub extensions: Vec<String>,

    /// Process files concurrently.
    pub parallel: bool,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            alpha: 0.3,
            sampling_ratio: 0.1,
            output_file_name: "results.csv".to_string(),
            plot_results: false,
            seed: None,
            max_hole_edges: 100,
            extensions: vec!["txt".to_string()],
            parallel: false,
        }
    }
}

impl EnvelopeConfig {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> EnvelopeResult<Self> {
        toml::from_str(toml_str).map_err(|e| EnvelopeError::ConfigParse {
            path: None,
            details: e.to_string(),
        })
    }

    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> EnvelopeResult<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| EnvelopeError::io_read(path, e))?;
        toml::from_str(&contents).map_err(|e| EnvelopeError::ConfigParse {
            path: Some(path.to_path_buf()),
            details: e.to_string(),
        })
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> EnvelopeResult<String> {
        toml::to_string_pretty(self).map_err(|e| EnvelopeError::ConfigParse {
            path: None,
            details: e.to_string(),
        })
    }

    /// Reject settings no file could be processed with.
    pub fn validate(&self) -> EnvelopeResult<()> {
        if !self.directory.is_dir() {
            return Err(EnvelopeError::invalid_config(format!(
                "directory {} does not exist or is not a directory",
                self.directory.display()
            )));
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(EnvelopeError::invalid_config(format!(
                "alpha must be a finite positive length, got {}",
                self.alpha
            )));
        }
        if !(self.sampling_ratio > 0.0 && self.sampling_ratio <= 1.0) {
            return Err(EnvelopeError::invalid_config(format!(
                "sampling_ratio must be in (0, 1], got {}",
                self.sampling_ratio
            )));
        }
        if self.output_file_name.trim().is_empty() {
            return Err(EnvelopeError::invalid_config("output_file_name is empty"));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(EnvelopeError::invalid_config(
                "extensions must name at least one file extension",
            ));
        }
        Ok(())
    }

    /// Where the CSV report goes.
    pub fn report_path(&self) -> PathBuf {
        self.directory.join(&self.output_file_name)
    }

    /// Repair parameters derived from this configuration.
    pub fn repair_params(&self) -> RepairParams {
        RepairParams::with_max_hole_edges(self.max_hole_edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EnvelopeConfig::default();
        assert_eq!(config.alpha, 0.3);
        assert_eq!(config.sampling_ratio, 0.1);
        assert_eq!(config.output_file_name, "results.csv");
        assert!(!config.plot_results);
        assert_eq!(config.report_path(), PathBuf::from("./results.csv"));
        assert_eq!(config.repair_params().max_hole_edges, 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EnvelopeConfig::from_toml("alpha = 0.5\nseed = 7\n").unwrap();
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.sampling_ratio, 0.1);
        assert_eq!(config.extensions, vec!["txt".to_string()]);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EnvelopeConfig {
            alpha: 1.25,
            plot_results: true,
            seed: Some(3),
            extensions: vec!["txt".into(), "xyz".into()],
            ..Default::default()
        };
        let text = config.to_toml().unwrap();
        assert_eq!(EnvelopeConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_bad_toml() {
        let err = EnvelopeConfig::from_toml("alpha = \"wide\"").unwrap_err();
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("envelope.toml");
        std::fs::write(&path, "sampling_ratio = 0.25\n").unwrap();
        let config = EnvelopeConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.sampling_ratio, 0.25);

        let missing = dir.path().join("missing.toml");
        let err = EnvelopeConfig::from_toml_file(&missing).unwrap_err();
        assert_eq!(err.path(), Some(missing.as_path()));
    }

    #[test]
    fn test_validate() {
        let dir = TempDir::new().unwrap();
        let valid = EnvelopeConfig {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let cases = [
            EnvelopeConfig {
                directory: dir.path().join("missing"),
                ..valid.clone()
            },
            EnvelopeConfig {
                alpha: 0.0,
                ..valid.clone()
            },
            EnvelopeConfig {
                sampling_ratio: 1.5,
                ..valid.clone()
            },
            EnvelopeConfig {
                output_file_name: " ".into(),
                ..valid.clone()
            },
            EnvelopeConfig {
                extensions: vec![],
                ..valid.clone()
            },
        ];
        for config in cases {
            let err = config.validate().unwrap_err();
            assert!(err.is_batch_fatal());
        }
    }
}
