//! Filesystem operations module.
//!
//! This module provides the low-level operations the transfer engine needs:
//! - Creating the destination directory recursively
//! - Opening the destination file in truncate-create mode
//! - Removing a partially written or rejected file

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::TransferError;

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Returns `TransferError::LocalIo` if the parent exists but is not a
/// directory, or if creating it fails.
pub fn ensure_parent_dir_exists(path: &Path) -> Result<(), TransferError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Relative file name with no directory component
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(TransferError::local_io(
            parent,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "parent path exists but is not a directory",
            ),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %parent.display(), "creating destination directory");
            fs::create_dir_all(parent).map_err(|e| TransferError::local_io(parent, e))
        }
        Err(e) => Err(TransferError::local_io(parent, e)),
    }
}

/// Open the destination for writing, truncating any previous content.
pub fn create_destination(path: &Path) -> Result<File, TransferError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| TransferError::local_io(path, e))
}

/// Delete a file that must not survive a failed or cancelled session.
///
/// A file that is already gone counts as removed. Other failures are logged;
/// the caller is already on an error path and reports the original cause.
pub fn remove_partial_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed partial download");
            true
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove partial download");
            false
        }
    }
}
