//! Structured error handling and exit codes.
//!
//! Session-level failures are typed ([`SessionError`]) so the pipeline can
//! report them per session and keep going. Run-level failures (bad input
//! directory, unusable output path) travel as [`anyhow::Error`] up to `main`.

use std::io;
use std::path::PathBuf;

use serde::Serialize;

/// Exit codes for the ctxbuild application.
///
/// - 0: Success (every located session was assembled)
/// - 1: General error (run-level failure, nothing processed)
/// - 2: No sessions (the directory held nothing to assemble)
/// - 3: Session failures (at least one session failed, others may have succeeded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: all sessions were built.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No sessions: the input directory contained no descriptor or payload files.
    NoSessions = 2,
    /// Session failures: one or more sessions were reported and skipped.
    SessionFailures = 3,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CT000",
            Self::GeneralError => "CT001",
            Self::NoSessions => "CT002",
            Self::SessionFailures => "CT003",
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CT001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
        }
    }
}

/// Serializable classification of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingDescriptor,
    DuplicateDescriptor,
    MissingPayload,
    UnresolvedEntry,
    MalformedDescriptor,
    PayloadReadFailure,
    IntegrityMismatch,
    WriteFailure,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::MissingDescriptor => "missing descriptor",
            Self::DuplicateDescriptor => "duplicate descriptor",
            Self::MissingPayload => "missing payload",
            Self::UnresolvedEntry => "unresolved entry",
            Self::MalformedDescriptor => "malformed descriptor",
            Self::PayloadReadFailure => "payload read failure",
            Self::IntegrityMismatch => "integrity mismatch",
            Self::WriteFailure => "write failure",
        };
        f.write_str(name)
    }
}

/// A failure scoped to a single session.
///
/// Any of these aborts assembly of the session it occurred in and nothing
/// else.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Payload files were found but no descriptor names them.
    #[error("no descriptor found for '{0}'")]
    MissingDescriptor(String),

    /// More than one descriptor maps to the same session key.
    #[error("multiple descriptors for session '{key}': {}", display_paths(.paths))]
    DuplicateDescriptor { key: String, paths: Vec<PathBuf> },

    /// The session has nothing to pack.
    #[error("session '{0}' has no payload files")]
    MissingPayload(String),

    /// A declared entry does not exist in the session's file set.
    #[error("entry #{order} references '{file}', which is not present in the backup folder")]
    UnresolvedEntry { order: u32, file: String },

    /// The descriptor could not be parsed or is missing required fields.
    #[error("malformed descriptor {path}: {reason}")]
    MalformedDescriptor { path: PathBuf, reason: String },

    /// A payload could not be read in full.
    #[error("failed to read {path}: {reason}")]
    PayloadReadFailure { path: PathBuf, reason: String },

    /// The assembled container does not match its declared layout.
    #[error("container integrity check failed: {0}")]
    IntegrityMismatch(String),

    /// The container could not be persisted.
    #[error("failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    /// Classification used in reports.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDescriptor(_) => ErrorKind::MissingDescriptor,
            Self::DuplicateDescriptor { .. } => ErrorKind::DuplicateDescriptor,
            Self::MissingPayload(_) => ErrorKind::MissingPayload,
            Self::UnresolvedEntry { .. } => ErrorKind::UnresolvedEntry,
            Self::MalformedDescriptor { .. } => ErrorKind::MalformedDescriptor,
            Self::PayloadReadFailure { .. } => ErrorKind::PayloadReadFailure,
            Self::IntegrityMismatch(_) => ErrorKind::IntegrityMismatch,
            Self::WriteFailure { .. } => ErrorKind::WriteFailure,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn read_failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::PayloadReadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
