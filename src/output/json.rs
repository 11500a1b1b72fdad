//! JSON output for run reports and container listings.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "input": "/media/backup",
//!   "sessions": [
//!     {
//!       "session": "session001",
//!       "status": "built",
//!       "output": "/media/backup/session001.ctx",
//!       "format": "packed",
//!       "entries": 2,
//!       "bytes": 4128,
//!       "sha256": "9f86d0..."
//!     },
//!     {
//!       "session": "session002",
//!       "status": "failed",
//!       "kind": "unresolved_entry",
//!       "message": "entry #1 references 'c.dat', which is not present in the backup folder"
//!     }
//!   ],
//!   "summary": {
//!     "sessions": 2,
//!     "built": 1,
//!     "failed": 1,
//!     "exit_code": 3,
//!     "exit_code_name": "CT003"
//!   }
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::container::Inspection;
use crate::error::ExitCode;
use crate::pipeline::{RunReport, SessionOutcome};

/// Run totals in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Sessions reported, complete or not
    pub sessions: usize,
    /// Containers written
    pub built: usize,
    /// Sessions reported and skipped
    pub failed: usize,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "CT003")
    pub exit_code_name: String,
}

impl JsonSummary {
    #[must_use]
    pub fn from_report(report: &RunReport) -> Self {
        let exit_code = report.exit_code();
        Self {
            sessions: report.sessions.len(),
            built: report.built_count(),
            failed: report.failed_count(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Complete JSON output for `build` and `scan`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput<'a> {
    pub input: &'a Path,
    pub sessions: &'a [SessionOutcome],
    pub summary: JsonSummary,
}

impl<'a> JsonOutput<'a> {
    #[must_use]
    pub fn new(report: &'a RunReport) -> Self {
        Self {
            input: &report.input,
            sessions: &report.sessions,
            summary: JsonSummary::from_report(report),
        }
    }

    /// Compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write JSON to a writer, followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        let json = if pretty {
            self.to_json_pretty()?
        } else {
            self.to_json()?
        };
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// JSON output for `inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonInspection<'a> {
    pub path: PathBuf,
    #[serde(flatten)]
    pub inspection: &'a Inspection,
    pub exit_code: i32,
}

impl<'a> JsonInspection<'a> {
    #[must_use]
    pub fn new(path: &Path, inspection: &'a Inspection) -> Self {
        Self {
            path: path.to_path_buf(),
            inspection,
            exit_code: ExitCode::Success.as_i32(),
        }
    }

    /// Write pretty JSON to a writer, followed by a newline.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        let json = serde_json::to_string_pretty(self)?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
