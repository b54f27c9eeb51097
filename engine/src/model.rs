//! Core data model for download sessions.
//!
//! This module defines the plain data passed between the transfer engine,
//! the session controller and whoever consumes its events:
//! - DownloadTarget: what to fetch and where to store it
//! - TransferProgress: a point-in-time snapshot of one transfer
//! - SessionState: the controller's lifecycle state
//! - TransferOutcome / SessionReport: how a session ended

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::ChecksumValue;
use crate::error::ErrorKind;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Immutable description of a single download.
///
/// Once handed to the controller it is cloned into the worker and never
/// changed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTarget {
    /// Full URL of the remote asset
    pub remote_url: String,

    /// File the asset is written to
    pub destination_path: PathBuf,

    /// Name the installed file is expected to carry
    pub expected_file_name: String,
}

impl DownloadTarget {
    /// Build a target that stores `file_name` inside `directory`.
    pub fn new(
        remote_url: impl Into<String>,
        directory: impl AsRef<Path>,
        file_name: impl Into<String>,
    ) -> Self {
        let expected_file_name = file_name.into();
        DownloadTarget {
            remote_url: remote_url.into(),
            destination_path: directory.as_ref().join(&expected_file_name),
            expected_file_name,
        }
    }

    /// Directory the destination file lives in (if any).
    pub fn destination_dir(&self) -> Option<&Path> {
        self.destination_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Snapshot of a running transfer.
///
/// `total_bytes` is 0 when the remote did not declare a length; in that case
/// `fraction_complete` stays at 0 and only the byte count is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    /// Percentage in [0, 100]
    pub fraction_complete: f64,
    /// Average rate since the transfer started, in MB/s
    pub rate_mbps: f64,
}

impl TransferProgress {
    /// Compute a snapshot from raw counters.
    pub fn new(bytes_transferred: u64, total_bytes: u64, elapsed: Duration) -> Self {
        let fraction_complete = if total_bytes > 0 {
            (bytes_transferred as f64 / total_bytes as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let secs = elapsed.as_secs_f64();
        let rate_mbps = if secs > 0.0 {
            (bytes_transferred as f64 / BYTES_PER_MB) / secs
        } else {
            0.0
        };

        TransferProgress {
            bytes_transferred,
            total_bytes,
            fraction_complete,
            rate_mbps,
        }
    }

    /// True when the remote declared a length and a fraction is meaningful.
    pub fn is_determinate(&self) -> bool {
        self.total_bytes > 0
    }

    /// Human-readable "x MB of y MB | z MB/s" line.
    pub fn summary_line(&self) -> String {
        let done_mb = self.bytes_transferred as f64 / BYTES_PER_MB;
        if self.is_determinate() {
            let total_mb = self.total_bytes as f64 / BYTES_PER_MB;
            format!(
                "{:.1}MB of {:.1}MB | {:.2} MB/s",
                done_mb, total_mb, self.rate_mbps
            )
        } else {
            format!("{:.1}MB | {:.2} MB/s", done_mb, self.rate_mbps)
        }
    }
}

/// Lifecycle state of the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session; `start` is accepted
    Idle,
    /// Worker is streaming bytes
    Running,
    /// Cancellation requested, worker has not stopped yet
    Cancelling,
    /// Finished with a verified file on disk
    Completed,
    /// Finished without a file (error or cancel)
    Failed,
}

impl SessionState {
    /// Returns true if a worker may still be touching the destination.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::Cancelling)
    }

    /// Returns true if the session ended and awaits acknowledgement.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Running => write!(f, "Running"),
            SessionState::Cancelling => write!(f, "Cancelling"),
            SessionState::Completed => write!(f, "Completed"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferOutcome {
    Success {
        final_size_bytes: u64,
        checksum: ChecksumValue,
    },
    Failure {
        reason: ErrorKind,
        message: String,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }

    /// Cancellation is reported as a failure variant but is not an error
    /// to show the user.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Failure {
                reason: ErrorKind::Cancelled,
                ..
            }
        )
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            TransferOutcome::Success { .. } => None,
            TransferOutcome::Failure { reason, .. } => Some(*reason),
        }
    }
}

/// Everything the caller learns when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub target: DownloadTarget,
    pub outcome: TransferOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
