//! Error types for envelope processing with rich diagnostics.
//!
//! Every error carries:
//! - A machine-readable code for programmatic handling
//! - The file and line involved, when there is one
//! - A recovery suggestion for the operator
//! - Terminal rendering via miette
//!
//! # Error Codes
//!
//! Codes use the format `ENV-XXXX`:
//! - `ENV-1xxx`: I/O errors (reading clouds, writing meshes and reports)
//! - `ENV-2xxx`: Input errors (malformed or empty point files)
//! - `ENV-3xxx`: Parameter and configuration errors
//!
//! Geometric outcomes such as an empty alpha shape or a failed hole fill are
//! not errors. They are reported through [`crate::RepairOutcome`] and the
//! metrics, so a batch keeps going.
//!
//! # Example
//!
//! ```rust,ignore
//! use cloud_envelope::EnvelopeError;
//!
//! let err = EnvelopeError::parse_error("scan.txt", 12, "expected 6 columns, found 4");
//! println!("{}: {}", err.code(), err.recovery_suggestion()); // ENV-2001: ...
//! ```

use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for envelope operations.
pub type EnvelopeResult<T> = Result<T, EnvelopeError>;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // I/O errors (1xxx)
    /// ENV-1001: Failed to read a file or directory
    IoRead = 1001,
    /// ENV-1002: Failed to write a file
    IoWrite = 1002,

    // Input errors (2xxx)
    /// ENV-2001: Malformed point row
    ParseError = 2001,
    /// ENV-2002: Point file holds no points
    EmptyCloud = 2002,

    // Parameter errors (3xxx)
    /// ENV-3001: Out-of-range numeric parameter
    InvalidParameter = 3001,
    /// ENV-3002: Configuration rejected at startup
    InvalidConfig = 3002,
    /// ENV-3003: Configuration file could not be parsed
    ConfigParse = 3003,
}

impl ErrorCode {
    /// Returns the code as a string in the format `ENV-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::IoRead => "ENV-1001",
            ErrorCode::IoWrite => "ENV-1002",
            ErrorCode::ParseError => "ENV-2001",
            ErrorCode::EmptyCloud => "ENV-2002",
            ErrorCode::InvalidParameter => "ENV-3001",
            ErrorCode::InvalidConfig => "ENV-3002",
            ErrorCode::ConfigParse => "ENV-3003",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions shown next to an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the file system.
    CheckPath { checks: Vec<String> },
    /// Fix the offending input rows.
    FixInput { description: String },
    /// Change one or more parameters.
    AdjustParameters { parameters: Vec<(String, String)> },
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckPath { checks } => {
                write!(f, "Check the path for: {}", checks.join(", "))
            }
            RecoverySuggestion::FixInput { description } => write!(f, "{}", description),
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
        }
    }
}

/// Where in the input an error happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub path: PathBuf,
    pub line: Option<usize>,
}

impl std::fmt::Display for FileLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path.display(), line),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Errors that can occur while building envelopes.
#[derive(Debug, Error, Diagnostic)]
pub enum EnvelopeError {
    /// Error reading from a file or directory.
    #[error("failed to read {path}")]
    #[diagnostic(
        code(envelope::io::read),
        help("Check that the path exists and is readable. Try: ls -la {}", path.display())
    )]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}")]
    #[diagnostic(
        code(envelope::io::write),
        help("Check that the directory exists and is writable")
    )]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed point row.
    #[error("failed to parse {path} at line {line}: {details}")]
    #[diagnostic(
        code(envelope::input::parse),
        help("Each row needs at least 6 numeric columns: x y z r g b (colors in 0-255)")
    )]
    ParseError {
        path: PathBuf,
        line: usize,
        details: String,
    },

    /// The point file parsed but held no points.
    #[error("point cloud {path} contains no points")]
    #[diagnostic(
        code(envelope::input::empty),
        help("Remove the file from the input directory or re-export the scan")
    )]
    EmptyCloud { path: PathBuf },

    /// A numeric parameter is out of range.
    #[error("invalid {name} = {value}: {details}")]
    #[diagnostic(code(envelope::param::invalid))]
    InvalidParameter {
        name: &'static str,
        value: f64,
        details: String,
    },

    /// The configuration was rejected before any file was processed.
    #[error("invalid configuration: {details}")]
    #[diagnostic(
        code(envelope::config::invalid),
        help("Fix the configuration file or the command-line overrides and rerun")
    )]
    InvalidConfig { details: String },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("failed to parse configuration{}: {details}", path.as_ref().map(|p| format!(" {}", p.display())).unwrap_or_default())]
    #[diagnostic(
        code(envelope::config::parse),
        help("Run `envelope init-config` to write a file with every option and its default")
    )]
    ConfigParse {
        path: Option<PathBuf>,
        details: String,
    },
}

impl EnvelopeError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            EnvelopeError::IoRead { .. } => ErrorCode::IoRead,
            EnvelopeError::IoWrite { .. } => ErrorCode::IoWrite,
            EnvelopeError::ParseError { .. } => ErrorCode::ParseError,
            EnvelopeError::EmptyCloud { .. } => ErrorCode::EmptyCloud,
            EnvelopeError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            EnvelopeError::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            EnvelopeError::ConfigParse { .. } => ErrorCode::ConfigParse,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            EnvelopeError::IoRead { .. } => RecoverySuggestion::CheckPath {
                checks: vec!["path exists".into(), "read permissions".into()],
            },
            EnvelopeError::IoWrite { .. } => RecoverySuggestion::CheckPath {
                checks: vec!["directory exists".into(), "write permissions".into()],
            },
            EnvelopeError::ParseError { line, .. } => RecoverySuggestion::FixInput {
                description: format!(
                    "Fix or remove line {} so it has 6 numeric columns (x y z r g b)",
                    line
                ),
            },
            EnvelopeError::EmptyCloud { .. } => RecoverySuggestion::FixInput {
                description: "Provide a file with at least one point row".into(),
            },
            EnvelopeError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![((*name).into(), parameter_hint(name).into())],
            },
            EnvelopeError::InvalidConfig { .. } | EnvelopeError::ConfigParse { .. } => {
                RecoverySuggestion::AdjustParameters {
                    parameters: vec![
                        ("directory".into(), "an existing directory".into()),
                        ("alpha".into(), "a positive number".into()),
                        ("sampling_ratio".into(), "a value in (0, 1]".into()),
                    ],
                }
            }
        }
    }

    /// Returns the file (and line) involved, if any.
    pub fn location(&self) -> Option<FileLocation> {
        match self {
            EnvelopeError::ParseError { path, line, .. } => Some(FileLocation {
                path: path.clone(),
                line: Some(*line),
            }),
            EnvelopeError::IoRead { path, .. }
            | EnvelopeError::IoWrite { path, .. }
            | EnvelopeError::EmptyCloud { path } => Some(FileLocation {
                path: path.clone(),
                line: None,
            }),
            EnvelopeError::ConfigParse {
                path: Some(path), ..
            } => Some(FileLocation {
                path: path.clone(),
                line: None,
            }),
            _ => None,
        }
    }

    /// Returns the file involved, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            EnvelopeError::IoRead { path, .. }
            | EnvelopeError::IoWrite { path, .. }
            | EnvelopeError::ParseError { path, .. }
            | EnvelopeError::EmptyCloud { path } => Some(path),
            EnvelopeError::ConfigParse { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// Create an IoRead error.
    pub fn io_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnvelopeError::IoRead {
            path: path.into(),
            source,
        }
    }

    /// Create an IoWrite error.
    pub fn io_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnvelopeError::IoWrite {
            path: path.into(),
            source,
        }
    }

    /// Create a ParseError for a 1-based line number.
    pub fn parse_error(path: impl Into<PathBuf>, line: usize, details: impl Into<String>) -> Self {
        EnvelopeError::ParseError {
            path: path.into(),
            line,
            details: details.into(),
        }
    }

    /// Create an EmptyCloud error.
    pub fn empty_cloud(path: &Path) -> Self {
        EnvelopeError::EmptyCloud {
            path: path.to_path_buf(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: &'static str, value: f64, details: impl Into<String>) -> Self {
        EnvelopeError::InvalidParameter {
            name,
            value,
            details: details.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(details: impl Into<String>) -> Self {
        EnvelopeError::InvalidConfig {
            details: details.into(),
        }
    }

    /// True for errors that abort a whole batch rather than a single file.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidConfig | ErrorCode::ConfigParse
        )
    }
}

fn parameter_hint(name: &str) -> &'static str {
    match name {
        "alpha" => "a positive length in input units",
        "sampling_ratio" => "a value in (0, 1]",
        _ => "a finite positive value",
    }
}
