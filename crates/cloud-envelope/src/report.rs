//! CSV results report.
//!
//! One row per processed file, appended as the file finishes. The header is
//! written when the report is empty, so several runs can share one report.
//!
//! ```text
//! date,filename,alpha,Envelope volume [m3],Envelope area [m2],projected_area [m2],Enveloppe accuracy,Number of envelopes
//! 2026-03-14 09:26:53,scans/tree_01.txt,0.3,12.48,41.9,7.31,98.7,1
//! ```

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::debug;

use crate::error::{EnvelopeError, EnvelopeResult};
use crate::io::format_alpha;
use crate::pipeline::EnvelopeMetrics;

/// Report header. Column names are kept byte-for-byte so existing reports
/// can be appended to.
pub const HEADER: &str = "date,filename,alpha,Envelope volume [m3],Envelope area [m2],projected_area [m2],Enveloppe accuracy,Number of envelopes";

/// Timestamp format of the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One report row before it is stamped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultsRow {
    /// Input path, as found under the scanned directory.
    pub filename: String,
    pub alpha: f64,
    pub metrics: EnvelopeMetrics,
}

impl ResultsRow {
    /// Render the row, without trailing newline.
    pub fn to_csv_line(&self, date: &str) -> String {
        let m = &self.metrics;
        format!(
            "{},{},{},{},{},{},{},{}",
            escape_csv(date),
            escape_csv(&self.filename),
            format_alpha(self.alpha),
            m.volume,
            m.area,
            m.projected_area,
            m.accuracy,
            m.envelope_count
        )
    }
}

/// Appends rows to a CSV report.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    /// Check that the report can be written, creating it if needed.
    ///
    /// Nothing is written to an existing report.
    pub fn open(path: impl Into<PathBuf>) -> EnvelopeResult<Self> {
        let path = path.into();
        open_append(&path)?;
        debug!(target: "cloud_envelope::report", path = %path.display(), "Report ready");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row stamped with the current local time.
    ///
    /// The header and row go out in a single write so an interrupted run
    /// never leaves half a row behind.
    pub fn append(&self, row: &ResultsRow) -> EnvelopeResult<()> {
        let mut file = open_append(&self.path)?;
        let is_empty = file
            .metadata()
            .map_err(|e| EnvelopeError::io_write(&self.path, e))?
            .len()
            == 0;

        let date = Local::now().format(DATE_FORMAT).to_string();
        let mut text = String::new();
        if is_empty {
            text.push_str(HEADER);
            text.push('\n');
        }
        text.push_str(&row.to_csv_line(&date));
        text.push('\n');

        file.write_all(text.as_bytes())
            .map_err(|e| EnvelopeError::io_write(&self.path, e))?;

        debug!(
            target: "cloud_envelope::report",
            path = %self.path.display(),
            filename = %row.filename,
            header = is_empty,
            "Appended report row"
        );
        Ok(())
    }
}

fn open_append(path: &Path) -> EnvelopeResult<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EnvelopeError::io_write(path, e))
}

/// Quote a field containing a separator, quote or newline.
fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    fn row(name: &str) -> ResultsRow {
        ResultsRow {
            filename: name.to_string(),
            alpha: 0.3,
            metrics: EnvelopeMetrics {
                volume: 1.5,
                area: 7.25,
                projected_area: 0.5,
                accuracy: 99.0,
                envelope_count: 2,
            },
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        let writer = ReportWriter::open(&path).unwrap();
        writer.append(&row("a.txt")).unwrap();
        writer.append(&row("b.txt")).unwrap();

        // A second writer on the same report keeps appending.
        ReportWriter::open(&path).unwrap().append(&row("c.txt")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], HEADER);
        assert_eq!(text.matches("date,").count(), 1);

        for (line, name) in lines[1..].iter().zip(["a.txt", "b.txt", "c.txt"]) {
            let fields: Vec<&str> = line.split(',').collect();
            assert_eq!(fields.len(), 8);
            assert!(NaiveDateTime::parse_from_str(fields[0], DATE_FORMAT).is_ok());
            assert_eq!(&fields[1..], &[name, "0.3", "1.5", "7.25", "0.5", "99", "2"]);
        }
    }

    #[test]
    fn test_open_does_not_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        ReportWriter::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_open_fails_on_missing_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("results.csv");
        let err = ReportWriter::open(&path).unwrap_err();
        assert_eq!(err.path(), Some(path.as_path()));
    }

    #[test]
    fn test_filename_quoting() {
        let line = row("scan, part \"b\".txt").to_csv_line("2026-01-01 00:00:00");
        assert!(line.starts_with("2026-01-01 00:00:00,\"scan, part \"\"b\"\".txt\",0.3,"));
    }

    #[test]
    fn test_alpha_matches_mesh_file_names() {
        let mut whole = row("a.txt");
        whole.alpha = 1.0;
        let line = whole.to_csv_line("2026-01-01 00:00:00");
        let fields: Vec<&str> = line.split(',').collect();
        assert_eq!(fields[2], "1.0");
        assert_eq!(fields[2], format_alpha(1.0));
    }

    #[test]
    fn test_row_serializes_to_json() {
        let value = serde_json::to_value(row("scans/a.txt")).unwrap();
        assert_eq!(value["filename"], "scans/a.txt");
        assert_eq!(value["alpha"], 0.3);
        assert_eq!(value["metrics"]["volume"], 1.5);
        assert_eq!(value["metrics"]["envelope_count"], 2);
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("simple"), "simple");
        assert_eq!(escape_csv("with,comma"), "\"with,comma\"");
        assert_eq!(escape_csv("with\"quote"), "\"with\"\"quote\"");
    }
}
