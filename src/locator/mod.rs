//! File locator: groups the files of a backup folder into sessions.
//!
//! A session is one `.xml` descriptor plus the `.dat`/`.txt` payloads that go
//! with it. Payloads are attached to the descriptor whose key is the longest
//! match of their own stem (see [`naming::claims`]); payloads that match no
//! descriptor go to a shared pool any descriptor may reference by name.
//!
//! Only the top level of the folder is scanned, in file-name order, so two
//! scans of the same folder always agree.
//!
//! # Example
//!
//! ```no_run
//! use ctxbuild::locator::Locator;
//! use std::path::Path;
//!
//! let located = Locator::new(Path::new("/media/backup")).locate().unwrap();
//! for session in &located.sessions {
//!     println!("{}: {} payload(s)", session.key, session.payloads.len());
//! }
//! for incomplete in &located.incomplete {
//!     eprintln!("{}: {}", incomplete.key, incomplete.error);
//! }
//! ```

pub mod naming;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::SessionError;
use naming::FileRole;

/// Errors that prevent the folder from being scanned at all.
#[derive(thiserror::Error, Debug)]
pub enum LocateError {
    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The directory could not be listed.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Kind of payload file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    Data,
    Text,
}

/// A `.dat` or `.txt` file discovered in the folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Normalized stem, used for claiming
    pub key: String,
    /// Normalized file name, used for entry resolution
    pub name_key: String,
    pub kind: PayloadKind,
    /// Size reported by the directory scan
    pub size: u64,
}

/// A complete candidate session: exactly one descriptor and the payloads it
/// claims by name.
#[derive(Debug, Clone)]
pub struct SessionFiles {
    /// Normalized session key
    pub key: String,
    /// The session's `.xml` descriptor
    pub descriptor: PathBuf,
    /// Payload files claimed by this session, in file-name order
    pub payloads: Vec<PayloadFile>,
}

/// A group of files that cannot be assembled.
#[derive(Debug)]
pub struct IncompleteSession {
    pub key: String,
    pub error: SessionError,
}

/// Result of scanning a backup folder.
#[derive(Debug, Default)]
pub struct Located {
    /// Sessions ready for parsing, ordered by key
    pub sessions: Vec<SessionFiles>,
    /// Groups reported but not assembled
    pub incomplete: Vec<IncompleteSession>,
    /// Payloads no descriptor claims by name
    pub shared: Vec<PayloadFile>,
}

impl Located {
    /// Find a payload by file name: the session's own payloads first, then
    /// the shared pool.
    #[must_use]
    pub fn resolve<'a>(&'a self, session: &'a SessionFiles, file: &str) -> Option<&'a PayloadFile> {
        let wanted = naming::normalize_key(file);
        session
            .payloads
            .iter()
            .chain(self.shared.iter())
            .find(|p| p.name_key == wanted)
    }

    /// Shared payloads whose name is not in `referenced`, grouped by key and
    /// reported as [`SessionError::MissingDescriptor`].
    #[must_use]
    pub fn orphans(&self, referenced: &HashSet<String>) -> Vec<IncompleteSession> {
        let mut groups: BTreeMap<&str, usize> = BTreeMap::new();
        for payload in &self.shared {
            if !referenced.contains(&payload.name_key) {
                *groups.entry(payload.key.as_str()).or_default() += 1;
            }
        }
        groups
            .into_keys()
            .map(|key| IncompleteSession {
                key: key.to_string(),
                error: SessionError::MissingDescriptor(key.to_string()),
            })
            .collect()
    }

    /// Whether the folder held no descriptor or payload files at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.incomplete.is_empty() && self.shared.is_empty()
    }
}

/// Scans one backup folder.
#[derive(Debug)]
pub struct Locator {
    root: PathBuf,
}

impl Locator {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Scan the folder and group its files into sessions.
    ///
    /// Unreadable individual entries are logged and skipped; only a failure to
    /// list the folder itself is an error.
    pub fn locate(&self) -> Result<Located, LocateError> {
        self.check_root()?;

        let mut descriptors: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut payloads = Vec::new();

        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) if err.depth() == 0 => {
                    return Err(LocateError::Io {
                        path: self.root.clone(),
                        source: err.into(),
                    });
                }
                Err(err) => {
                    log::warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_file() {
                log::trace!("Skipping non-file {}", path.display());
                continue;
            }

            let (Some(role), Some(key)) = (FileRole::from_path(path), naming::session_key(path))
            else {
                log::debug!("Ignoring unrelated file {}", path.display());
                continue;
            };

            match role {
                FileRole::Descriptor => {
                    descriptors.entry(key).or_default().push(path.to_path_buf());
                }
                FileRole::Data | FileRole::Text => {
                    let size = match fs::metadata(path) {
                        Ok(meta) => meta.len(),
                        Err(err) => {
                            log::warn!("Cannot stat {}: {}", path.display(), err);
                            continue;
                        }
                    };
                    let kind = if role == FileRole::Data {
                        PayloadKind::Data
                    } else {
                        PayloadKind::Text
                    };
                    payloads.push(PayloadFile {
                        path: path.to_path_buf(),
                        name_key: naming::name_key(path).unwrap_or_else(|| key.clone()),
                        key,
                        kind,
                        size,
                    });
                }
            }
        }

        let located = group(descriptors, payloads);
        log::debug!(
            "Located {} session(s), {} incomplete, {} shared payload(s) in {}",
            located.sessions.len(),
            located.incomplete.len(),
            located.shared.len(),
            self.root.display()
        );
        Ok(located)
    }

    fn check_root(&self) -> Result<(), LocateError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(LocateError::NotADirectory(self.root.clone())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(LocateError::NotFound(self.root.clone()))
            }
            Err(source) => Err(LocateError::Io {
                path: self.root.clone(),
                source,
            }),
        }
    }
}

/// Attach payloads to descriptors and decide which sessions are complete.
fn group(descriptors: BTreeMap<String, Vec<PathBuf>>, payloads: Vec<PayloadFile>) -> Located {
    let mut claimed: BTreeMap<&str, Vec<PayloadFile>> = BTreeMap::new();
    let mut shared = Vec::new();

    for payload in payloads {
        let owner = descriptors
            .keys()
            .filter(|key| naming::claims(key, &payload.key))
            .max_by_key(|key| key.len());
        match owner {
            Some(key) => claimed.entry(key.as_str()).or_default().push(payload),
            None => shared.push(payload),
        }
    }

    let mut sessions = Vec::new();
    let mut incomplete = Vec::new();

    for (key, paths) in &descriptors {
        let own = claimed.remove(key.as_str()).unwrap_or_default();
        let mut paths = paths.clone();

        if paths.len() > 1 {
            incomplete.push(IncompleteSession {
                key: key.clone(),
                error: SessionError::DuplicateDescriptor {
                    key: key.clone(),
                    paths,
                },
            });
            continue;
        }

        if own.is_empty() && shared.is_empty() {
            incomplete.push(IncompleteSession {
                key: key.clone(),
                error: SessionError::MissingPayload(key.clone()),
            });
            continue;
        }

        sessions.push(SessionFiles {
            key: key.clone(),
            descriptor: paths.remove(0),
            payloads: own,
        });
    }

    Located {
        sessions,
        incomplete,
        shared,
    }
}
