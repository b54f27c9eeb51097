//! Transfer engine.
//!
//! Streams one remote asset into its destination file:
//! - opens the remote through a `RemoteSource`
//! - writes the body in fixed-size buffers, reporting progress after each
//! - polls the cancellation check once per buffer
//! - never leaves a partial file behind when it returns an error
//!
//! The engine computes no checksum; verification is a separate pass run by
//! the session controller.

use std::fs::File;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::Path;
use std::time::Instant;

use tracing::debug;

use crate::error::TransferError;
use crate::fs_ops;
use crate::model::{DownloadTarget, TransferProgress};
use crate::progress::ProgressCallback;
use crate::source::RemoteSource;

/// Transfer `target` from `source` to disk.
///
/// Returns the number of bytes written. On any error the destination file
/// has been closed and removed (or was never created).
///
/// # Arguments
/// * `buffer_size` - Size of each read/write, normally 8 KiB
/// * `progress_callback` - Invoked on this thread after every buffer write
/// * `is_cancelled` - Polled after every read, before the buffer is written
pub fn transfer(
    source: &dyn RemoteSource,
    target: &DownloadTarget,
    buffer_size: usize,
    progress_callback: Option<&dyn ProgressCallback>,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<u64, TransferError> {
    if is_cancelled() {
        return Err(TransferError::Cancelled);
    }

    let stream = source.open(&target.remote_url)?;
    let total_bytes = stream.content_length.unwrap_or(0);
    let path = target.destination_path.as_path();
    debug!(url = %target.remote_url, total_bytes, path = %path.display(), "streaming to disk");

    fs_ops::ensure_parent_dir_exists(path)?;
    let file = fs_ops::create_destination(path)?;

    let result = stream_to_file(
        stream.body,
        file,
        target,
        total_bytes,
        buffer_size.max(1),
        progress_callback,
        is_cancelled,
    );

    if let Err(e) = &result {
        debug!(error = %e, "transfer stopped, removing destination");
        fs_ops::remove_partial_file(path);
    }
    result
}

/// Copy the body into `file`. The file handle is dropped (closed) before
/// this returns, so the caller may delete or re-read it.
fn stream_to_file(
    mut body: Box<dyn Read + Send>,
    mut file: File,
    target: &DownloadTarget,
    total_bytes: u64,
    buffer_size: usize,
    progress_callback: Option<&dyn ProgressCallback>,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<u64, TransferError> {
    let path = target.destination_path.as_path();
    let mut buffer = vec![0u8; buffer_size];
    let mut written: u64 = 0;
    let start = Instant::now();

    loop {
        let read = body.read(&mut buffer);
        if is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(TransferError::Remote {
                    url: target.remote_url.clone(),
                    reason: format!("read error: {}", e),
                })
            }
        };

        file.write_all(&buffer[..n])
            .map_err(|e| TransferError::local_io(path, e))?;
        written += n as u64;

        if let Some(callback) = progress_callback {
            callback.on_progress(&TransferProgress::new(written, total_bytes, start.elapsed()));
        }
    }

    file.flush().map_err(|e| TransferError::local_io(path, e))?;
    file.sync_all().map_err(|e| TransferError::local_io(path, e))?;
    drop(file);

    check_declared_length(path, total_bytes, written)?;
    Ok(written)
}

fn check_declared_length(path: &Path, expected: u64, actual: u64) -> Result<(), TransferError> {
    if expected > 0 && expected != actual {
        return Err(TransferError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}
