//! Error types for the download engine.
//!
//! `TransferError` describes why a single transfer stopped. It carries the
//! context (URL, path, underlying I/O error) needed for logging, and folds
//! into the flat `ErrorKind` taxonomy that callers match on.
//!
//! `SessionError` covers misuse of the session controller (starting twice,
//! acknowledging a session that is still running). It is never a transfer
//! outcome. `ConfigError` is returned while building configuration.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::SessionState;

/// Flat classification of a failed session, as surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Non-2xx status or connection/read failure on the remote side
    RemoteError,
    /// Filesystem create, write, read or delete failure
    LocalIoError,
    /// Declared and actual byte counts disagree
    SizeMismatch,
    /// The user asked for the session to stop
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::RemoteError => write!(f, "remote error"),
            ErrorKind::LocalIoError => write!(f, "local I/O error"),
            ErrorKind::SizeMismatch => write!(f, "size mismatch"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Reasons a transfer can stop before producing a complete file.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Connecting to or reading from the remote failed
    #[error("download from {url} failed: {reason}")]
    Remote { url: String, reason: String },

    /// The remote answered with a non-success status
    #[error("download from {url} failed with HTTP status {status}")]
    Status { url: String, status: u16 },

    /// Creating, writing, reading or removing a local file failed
    #[error("local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The remote declared one length and delivered another
    #[error("incomplete download of {}: expected {expected} bytes, got {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Cancellation was observed at a buffer boundary
    #[error("download cancelled")]
    Cancelled,
}

impl TransferError {
    /// Map this error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote { .. } | Self::Status { .. } => ErrorKind::RemoteError,
            Self::LocalIo { .. } => ErrorKind::LocalIoError,
            Self::SizeMismatch { .. } => ErrorKind::SizeMismatch,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }
}

/// Errors from driving the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start` was called while another session is not yet acknowledged
    #[error("a download session is already active (state: {state})")]
    AlreadyRunning { state: SessionState },

    /// `acknowledge` was called before the session reached a terminal state
    #[error("the download session has not finished yet (state: {state})")]
    NotTerminal { state: SessionState },

    #[error("failed to spawn the download worker thread")]
    WorkerSpawn,
}

/// Errors raised while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("buffer size must be greater than zero")]
    ZeroBufferSize,

    #[error("user agent must not be empty")]
    EmptyUserAgent,

    #[error("unknown checksum algorithm '{0}' (expected md5, sha256 or blake3)")]
    UnknownAlgorithm(String),

    #[error("no catalog entry named '{0}'")]
    UnknownGame(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
