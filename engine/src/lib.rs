//! # Launcher Engine - Release Download Library
//!
//! A headless download manager for a game launcher. It fetches a release
//! binary over HTTP, streams it to disk, reports progress, supports
//! cancellation and computes a checksum of the installed file.
//! Designed as the foundation for any front end (CLI, GUI, controller pad).
//!
//! ## Overview
//!
//! - One session at a time, run on a background thread
//! - Progress and results delivered as plain events, one channel per
//!   subscriber, to be drained on the caller's own thread
//! - Cooperative cancellation polled once per 8 KiB buffer
//! - No partial file is left behind after a failure or cancel
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{builtin_catalog, DownloadConfig, DownloadController, DownloadEvent};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DownloadConfig::default();
//! let game = &builtin_catalog()[0];
//! let target = game.target(&config.install_dir);
//!
//! let controller = DownloadController::with_http(config)?;
//! let events = controller.subscribe();
//! controller.start(target)?;
//!
//! for event in events.iter() {
//!     match event {
//!         DownloadEvent::Progress { progress, .. } => println!("{}", progress.summary_line()),
//!         DownloadEvent::Finished(report) => {
//!             println!("{:?}", report.outcome);
//!             break;
//!         }
//!         _ => {}
//!     }
//! }
//! controller.acknowledge()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (DownloadTarget, TransferProgress, states)
//! - **error**: Error types and the caller-facing ErrorKind taxonomy
//! - **config**: Download configuration and defaults
//! - **catalog**: Release asset URLs and the built-in game list
//! - **source**: Remote byte sources (blocking HTTP)
//! - **fs_ops**: Destination file handling
//! - **transfer**: The streaming transfer engine
//! - **progress**: Progress callback, cancellation flag, session events
//! - **checksums**: Checksum computation for verification
//! - **session**: The single-session download controller

pub mod model;
pub mod error;
pub mod config;
pub mod catalog;
pub mod source;
pub mod fs_ops;
pub mod transfer;
pub mod progress;
pub mod checksums;
pub mod session;

// Re-export main types and functions
pub use model::{DownloadTarget, SessionReport, SessionState, TransferOutcome, TransferProgress};
pub use error::{ConfigError, ErrorKind, SessionError, TransferError};
pub use config::DownloadConfig;
pub use catalog::{builtin_catalog, find_game, GameEntry, ReleaseAsset};
pub use source::{HttpSource, RemoteSource, RemoteStream};
pub use transfer::transfer;
pub use progress::{
    coalesce_progress, CancelFlag, ChannelProgress, DownloadEvent, EventBus, ProgressCallback,
};
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use session::DownloadController;
