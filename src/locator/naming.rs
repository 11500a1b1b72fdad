//! File naming conventions of a CyberTracker backup folder.
//!
//! Session keys are derived from file stems. Keys are compared in NFC form and
//! lower-cased: backups copied off macOS volumes arrive with NFD names, and the
//! device itself does not preserve case consistently (`Sightings.DAT` vs
//! `sightings.dat`).
//!
//! ```
//! use ctxbuild::locator::naming::{claims, normalize_key};
//!
//! assert_eq!(normalize_key("Cafe\u{0301}_01"), normalize_key("café_01"));
//! assert!(claims("survey", "survey_2"));
//! assert!(!claims("survey", "surveyor"));
//! ```

use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Characters that may separate a session key from a payload suffix.
pub const KEY_SEPARATORS: [char; 4] = ['_', '-', '.', ' '];

/// Role of a file inside the backup folder, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    /// `.xml` session descriptor
    Descriptor,
    /// `.dat` payload
    Data,
    /// `.txt` payload (optional metadata)
    Text,
}

impl FileRole {
    /// Classify a path by its extension, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(Self::Descriptor),
            "dat" => Some(Self::Data),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// NFC-normalize and lower-case a name for comparison.
#[must_use]
pub fn normalize_key(s: &str) -> String {
    s.nfc().collect::<String>().to_lowercase()
}

/// Session key of a file: its normalized stem.
#[must_use]
pub fn session_key(path: &Path) -> Option<String> {
    path.file_stem().map(|s| normalize_key(&s.to_string_lossy()))
}

/// Normalized full file name, used when resolving descriptor entries.
#[must_use]
pub fn name_key(path: &Path) -> Option<String> {
    path.file_name().map(|s| normalize_key(&s.to_string_lossy()))
}

/// Whether a session keyed `session` owns a payload keyed `payload`.
///
/// Both arguments must already be normalized.
#[must_use]
pub fn claims(session: &str, payload: &str) -> bool {
    match payload.strip_prefix(session) {
        Some("") => true,
        Some(rest) => rest.starts_with(KEY_SEPARATORS),
        None => false,
    }
}

/// Whether `name` is a bare file name with no directory components.
#[must_use]
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
