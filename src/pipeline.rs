//! Session pipeline: locate → parse → resolve → read → build → write.
//!
//! Every session passes through the stages once, in order. A failure at any
//! stage ends that session with a [`SessionError`] recorded in the
//! [`RunReport`]; the other sessions are unaffected. Only problems with the
//! run as a whole (unreadable input folder, ambiguous output path) are
//! returned as errors.
//!
//! # Example
//!
//! ```no_run
//! use ctxbuild::pipeline::{OutputTarget, Pipeline, PipelineOptions};
//! use std::path::Path;
//!
//! let pipeline = Pipeline::new(PipelineOptions::default());
//! let target = OutputTarget::Directory("/media/recovered".into());
//! let report = pipeline.build(Path::new("/media/backup"), &target).unwrap();
//! println!("{} built, {} failed", report.built_count(), report.failed_count());
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::container::{Container, ContainerEntry, ContainerFormat, ContainerSession};
use crate::descriptor::{ParseOptions, Session};
use crate::error::{ErrorKind, ExitCode, SessionError};
use crate::locator::{naming, IncompleteSession, Located, Locator, SessionFiles};
use crate::payload::PayloadReader;
use crate::writer::{write_container, WritePolicy};

/// Extension of generated containers.
pub const CTX_EXTENSION: &str = "ctx";

/// Settings for one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub format: ContainerFormat,
    pub overwrite: bool,
    pub max_entry_size: Option<u64>,
    pub implicit_descriptors: bool,
    /// Restrict the run to these session ids (empty means all).
    pub sessions: Vec<String>,
}

/// Where containers are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// One `<session id>.ctx` per session inside this folder.
    Directory(PathBuf),
    /// Exactly this file; only valid for a single session.
    File(PathBuf),
}

impl OutputTarget {
    /// Interpret a user-supplied output path: a `.ctx` path is a file,
    /// anything else a folder.
    #[must_use]
    pub fn from_path(path: PathBuf) -> Self {
        let is_ctx = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CTX_EXTENSION));
        if is_ctx && !path.is_dir() {
            Self::File(path)
        } else {
            Self::Directory(path)
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.join(format!("{session_id}.{CTX_EXTENSION}")),
            Self::File(path) => path.clone(),
        }
    }
}

/// Outcome of a single session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// Scanned and resolvable; nothing written.
    Ready {
        descriptor: PathBuf,
        entries: usize,
        payload_bytes: u64,
    },
    /// Container written.
    Built {
        output: PathBuf,
        format: ContainerFormat,
        entries: usize,
        bytes: u64,
        sha256: String,
    },
    /// Reported and skipped.
    Failed { kind: ErrorKind, message: String },
}

/// A session's name and what happened to it.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session: String,
    #[serde(flatten)]
    pub status: SessionStatus,
}

impl SessionOutcome {
    fn failed(session: impl Into<String>, error: &SessionError) -> Self {
        Self {
            session: session.into(),
            status: SessionStatus::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.status, SessionStatus::Failed { .. })
    }
}

/// Everything a run did, one outcome per session, ordered by session key.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub sessions: Vec<SessionOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_failure()).count()
    }

    #[must_use]
    pub fn built_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| matches!(s.status, SessionStatus::Built { .. }))
            .count()
    }

    /// Process exit code for this report.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        if self.sessions.is_empty() {
            ExitCode::NoSessions
        } else if self.failed_count() > 0 {
            ExitCode::SessionFailures
        } else {
            ExitCode::Success
        }
    }
}

/// Drives sessions through the stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    reader: PayloadReader,
    filter: HashSet<String>,
}

impl Pipeline {
    #[must_use]
    pub fn new(options: PipelineOptions) -> Self {
        let filter = options
            .sessions
            .iter()
            .map(|s| naming::normalize_key(s))
            .collect();
        Self {
            reader: PayloadReader::new(options.max_entry_size),
            options,
            filter,
        }
    }

    /// Locate, assemble and write every session under `input`.
    pub fn build(&self, input: &Path, target: &OutputTarget) -> Result<RunReport> {
        let located = self.locate(input)?;

        if let OutputTarget::File(path) = target {
            let selected = located.sessions.len();
            if selected > 1 {
                bail!(
                    "{} sessions found but output {} names a single file; pass a folder or select one with --session",
                    selected,
                    path.display()
                );
            }
        }

        self.run(input, located, |session, files, located| {
            self.assemble(session, files, located, target)
        })
    }

    /// Locate and resolve every session under `input` without reading
    /// payloads or writing anything.
    pub fn scan(&self, input: &Path) -> Result<RunReport> {
        let located = self.locate(input)?;
        self.run(input, located, |session, files, located| {
            let resolved = session.resolve(located, files)?;
            Ok(SessionStatus::Ready {
                descriptor: session.descriptor_path.clone(),
                entries: resolved.len(),
                payload_bytes: resolved.iter().map(|r| r.file.size).sum(),
            })
        })
    }

    fn locate(&self, input: &Path) -> Result<Located> {
        let mut located = Locator::new(input)
            .locate()
            .with_context(|| format!("Cannot scan backup folder {}", input.display()))?;

        if !self.filter.is_empty() {
            located.sessions.retain(|s| self.filter.contains(&s.key));
            located.incomplete.retain(|s| self.filter.contains(&s.key));
            for wanted in &self.options.sessions {
                let key = naming::normalize_key(wanted);
                let known = located.sessions.iter().any(|s| s.key == key)
                    || located.incomplete.iter().any(|s| s.key == key);
                if !known {
                    log::warn!("No session named '{}' in {}", wanted, input.display());
                }
            }
        }
        Ok(located)
    }

    /// Shared driver: parse each session, hand it to `stage`, collect outcomes.
    fn run<F>(&self, input: &Path, located: Located, stage: F) -> Result<RunReport>
    where
        F: Fn(&Session, &SessionFiles, &Located) -> Result<SessionStatus, SessionError>,
    {
        let parse_options = ParseOptions {
            implicit: self.options.implicit_descriptors,
        };
        let mut outcomes = Vec::new();
        let mut referenced = HashSet::new();

        for files in &located.sessions {
            let session = match Session::from_file(&files.descriptor, parse_options) {
                Ok(session) => session,
                Err(err) => {
                    log::warn!("Skipping session '{}': {}", files.key, err);
                    outcomes.push(SessionOutcome::failed(&files.key, &err));
                    continue;
                }
            };
            referenced.extend(session.entries.iter().map(|e| naming::normalize_key(&e.file)));

            match stage(&session, files, &located) {
                Ok(status) => {
                    if let SessionStatus::Built { output, .. } = &status {
                        log::info!("Built '{}' -> {}", session.id, output.display());
                    }
                    outcomes.push(SessionOutcome {
                        session: session.id.clone(),
                        status,
                    });
                }
                Err(err) => {
                    log::warn!("Skipping session '{}': {}", session.id, err);
                    outcomes.push(SessionOutcome::failed(&session.id, &err));
                }
            }
        }

        let orphans = if self.filter.is_empty() {
            located.orphans(&referenced)
        } else {
            Vec::new()
        };
        for IncompleteSession { key, error } in located.incomplete.iter().chain(orphans.iter()) {
            log::warn!("Skipping incomplete session '{}': {}", key, error);
            outcomes.push(SessionOutcome::failed(key, error));
        }

        outcomes.sort_by_key(|o| naming::normalize_key(&o.session));
        log::debug!(
            "Processed {} session(s) from {}",
            outcomes.len(),
            input.display()
        );

        Ok(RunReport {
            input: input.to_path_buf(),
            sessions: outcomes,
        })
    }

    fn assemble(
        &self,
        session: &Session,
        files: &SessionFiles,
        located: &Located,
        target: &OutputTarget,
    ) -> Result<SessionStatus, SessionError> {
        let resolved = session.resolve(located, files)?;

        let mut entries = Vec::with_capacity(resolved.len());
        for item in &resolved {
            entries.push(ContainerEntry {
                tag: item.entry.tag.clone(),
                member_name: item.entry.member_name().to_string(),
                bytes: self.reader.read(&item.file.path)?,
            });
        }

        let input = ContainerSession {
            id: session.id.clone(),
            descriptor: session.descriptor.clone(),
            entries,
        };
        let container = Container::build(&input, self.options.format)?;

        let output = target.path_for(&session.id);
        let bytes = write_container(
            &container.bytes,
            &output,
            WritePolicy {
                overwrite: self.options.overwrite,
            },
        )?;

        Ok(SessionStatus::Built {
            output,
            format: container.format,
            entries: container.entry_count,
            bytes,
            sha256: container.sha256_hex(),
        })
    }
}
