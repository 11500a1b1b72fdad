//! Payload reader: loads an entry's source file in full.
//!
//! The file handle lives only for the duration of [`PayloadReader::read`], and
//! a read that comes back shorter than the size the filesystem reported is
//! treated as a failure rather than packed as-is.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bytesize::ByteSize;

use crate::error::SessionError;

/// Reads payload files, optionally capping their size.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadReader {
    max_entry_size: Option<u64>,
}

impl PayloadReader {
    /// Create a reader. `max_entry_size` rejects larger files up front.
    #[must_use]
    pub fn new(max_entry_size: Option<u64>) -> Self {
        Self { max_entry_size }
    }

    /// Read `path` in full.
    ///
    /// # Errors
    ///
    /// [`SessionError::PayloadReadFailure`] if the file is missing, unreadable,
    /// over the size limit, or changes size while being read.
    pub fn read(&self, path: &Path) -> Result<Vec<u8>, SessionError> {
        let mut file = File::open(path).map_err(|e| SessionError::read_failure(path, describe(&e)))?;
        let expected = file
            .metadata()
            .map_err(|e| SessionError::read_failure(path, describe(&e)))?
            .len();

        if let Some(limit) = self.max_entry_size {
            if expected > limit {
                return Err(SessionError::read_failure(
                    path,
                    format!(
                        "size {} exceeds the entry limit of {}",
                        ByteSize(expected),
                        ByteSize(limit)
                    ),
                ));
            }
        }

        let capacity = usize::try_from(expected).map_err(|_| {
            SessionError::read_failure(path, format!("{expected} bytes do not fit in memory"))
        })?;
        let mut bytes = Vec::with_capacity(capacity);
        file.read_to_end(&mut bytes)
            .map_err(|e| SessionError::read_failure(path, describe(&e)))?;

        if bytes.len() as u64 != expected {
            return Err(SessionError::read_failure(
                path,
                format!(
                    "truncated read: expected {expected} bytes, got {}",
                    bytes.len()
                ),
            ));
        }

        log::trace!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(bytes)
    }
}

fn describe(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "file not found".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => err.to_string(),
    }
}
