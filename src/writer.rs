//! Writer: persists an assembled container.
//!
//! Bytes go to a temporary file next to the destination, which is then
//! renamed into place. The destination therefore either holds the complete
//! container or is left untouched; a failed write drops the temporary file
//! and with it the partial output.
//!
//! Without [`WritePolicy::overwrite`] the rename refuses to replace an existing
//! file, so two runs aimed at the same folder cannot clobber each other.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::SessionError;

/// What to do when the output already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WritePolicy {
    /// Replace an existing output file.
    pub overwrite: bool,
}

/// Write `bytes` to `path` atomically. Returns the number of bytes written.
///
/// # Errors
///
/// [`SessionError::WriteFailure`] if the destination exists (and overwriting
/// is off) or any filesystem step fails.
pub fn write_container(bytes: &[u8], path: &Path, policy: WritePolicy) -> Result<u64, SessionError> {
    let failure = |source: io::Error| SessionError::WriteFailure {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(failure)?;

    if !policy.overwrite && path.exists() {
        return Err(failure(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "output already exists (use --force to overwrite)",
        )));
    }

    let mut temp = tempfile::Builder::new()
        .prefix(".ctxbuild-")
        .suffix(".partial")
        .tempfile_in(&parent)
        .map_err(failure)?;

    temp.write_all(bytes).map_err(failure)?;
    temp.as_file().sync_all().map_err(failure)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(failure)?;
    }

    let persisted = if policy.overwrite {
        temp.persist(path)
    } else {
        temp.persist_noclobber(path)
    };
    // On error the PersistError still owns the temp file; dropping it deletes it.
    persisted.map_err(|e| failure(e.error))?;

    log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len() as u64)
}
