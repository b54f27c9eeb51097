//! Download configuration.
//!
//! `DownloadConfig` gathers the knobs shared by every session: the
//! identifying headers sent to the release host, the buffer size used by the
//! transfer engine, the checksum algorithm used for verification and the
//! directory releases are installed into.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checksums::ChecksumAlgorithm;
use crate::error::ConfigError;

/// Size of each body read and file write (8 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Identifying `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Game-Downloader";

/// `Accept` header asking release hosts for the raw asset bytes.
pub const DEFAULT_ACCEPT: &str = "application/octet-stream";

/// Directory installed games are written to, relative to the working dir.
pub const DEFAULT_INSTALL_DIR: &str = "TargetGame";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub user_agent: String,
    pub accept: String,
    pub buffer_size: usize,
    pub checksum_algorithm: ChecksumAlgorithm,
    pub install_dir: PathBuf,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            checksum_algorithm: ChecksumAlgorithm::Md5,
            install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
        }
    }
}

impl DownloadConfig {
    /// Reject settings the transfer engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        Ok(())
    }
}
