//! Download session controller.
//!
//! `DownloadController` runs at most one download at a time:
//! - `start` checks the state, spawns a worker thread and returns at once
//! - the worker runs the transfer engine, then a checksum pass over the
//!   closed file, then records the terminal state
//! - every progress snapshot and the final report are published as
//!   `DownloadEvent`s; each `subscribe` call gets its own channel
//! - `cancel` raises the session's cancellation flag
//! - `acknowledge` returns a finished controller to `Idle`
//!
//! State machine:
//!
//! ```text
//! Idle -> Running -> Completed | Failed -> (acknowledge) -> Idle
//!         Running -> Cancelling -> Failed(Cancelled) -> (acknowledge) -> Idle
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checksums::{compute_file_checksum, ChecksumValue};
use crate::config::DownloadConfig;
use crate::error::{ConfigError, ErrorKind, SessionError, TransferError};
use crate::fs_ops;
use crate::model::{DownloadTarget, SessionReport, SessionState, TransferOutcome};
use crate::progress::{CancelFlag, ChannelProgress, DownloadEvent, EventBus};
use crate::source::{HttpSource, RemoteSource};
use crate::transfer;

struct SessionSlot {
    state: SessionState,
    session_id: Option<Uuid>,
    cancel: Option<CancelFlag>,
    worker: Option<JoinHandle<()>>,
}

impl SessionSlot {
    /// Raise the cancellation flag of a `Running` session.
    fn request_cancel(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        if let Some(flag) = &self.cancel {
            flag.cancel();
        }
        self.state = SessionState::Cancelling;
        true
    }
}

/// Single-session download controller.
///
/// All methods take `&self`; wrap the controller in an `Arc` to call
/// `cancel` from another thread (e.g. a signal handler).
pub struct DownloadController {
    source: Arc<dyn RemoteSource>,
    config: DownloadConfig,
    slot: Arc<Mutex<SessionSlot>>,
    events: EventBus,
}

impl DownloadController {
    /// Create a controller that fetches through `source`.
    pub fn new(source: Arc<dyn RemoteSource>, config: DownloadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(DownloadController {
            source,
            config,
            slot: Arc::new(Mutex::new(SessionSlot {
                state: SessionState::Idle,
                session_id: None,
                cancel: None,
                worker: None,
            })),
            events: EventBus::new(),
        })
    }

    /// Create a controller backed by a blocking HTTP client.
    pub fn with_http(config: DownloadConfig) -> Result<Self, ConfigError> {
        let source = HttpSource::new(&config)?;
        Self::new(Arc::new(source), config)
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.slot.lock().state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.slot.lock().session_id
    }

    /// New receiver for session events. Drain it on the thread that owns UI
    /// state.
    ///
    /// Every subscriber sees every event published after it subscribed;
    /// earlier events are not replayed, so subscribe before `start`. Dropping
    /// the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<DownloadEvent> {
        self.events.subscribe()
    }

    /// Start downloading `target` on a background thread.
    ///
    /// On `Ok` the session is `Running` and exactly one
    /// `DownloadEvent::Finished` will follow for it.
    ///
    /// # Errors
    /// Returns `SessionError::AlreadyRunning` unless the controller is `Idle`.
    /// A finished session must be acknowledged before a new one starts.
    /// Returns `SessionError::WorkerSpawn` if no worker thread could be
    /// created; the controller stays `Idle` and no event is published.
    pub fn start(&self, target: DownloadTarget) -> Result<Uuid, SessionError> {
        self.start_on(target, thread::Builder::new())
    }

    fn start_on(&self, target: DownloadTarget, builder: thread::Builder) -> Result<Uuid, SessionError> {
        let mut slot = self.slot.lock();
        if slot.state != SessionState::Idle {
            warn!(state = %slot.state, url = %target.remote_url, "download rejected, session already active");
            return Err(SessionError::AlreadyRunning { state: slot.state });
        }

        let session_id = Uuid::new_v4();
        let cancel = CancelFlag::new();
        let worker = SessionWorker {
            session_id,
            target,
            source: Arc::clone(&self.source),
            config: self.config.clone(),
            cancel: cancel.clone(),
            slot: Arc::clone(&self.slot),
            events: self.events.clone(),
        };

        // The worker needs the slot lock to finish, so it cannot overtake us.
        let handle = builder
            .name(format!("download-{}", session_id))
            .spawn(move || worker.run())
            .map_err(|e| {
                warn!(session = %session_id, error = %e, "failed to spawn download worker");
                SessionError::WorkerSpawn
            })?;

        slot.state = SessionState::Running;
        slot.session_id = Some(session_id);
        slot.cancel = Some(cancel);
        slot.worker = Some(handle);
        Ok(session_id)
    }

    /// Request cancellation of the running session.
    ///
    /// Idempotent: does nothing unless the state is `Running`.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if !slot.request_cancel() {
            debug!(state = %slot.state, "cancel ignored");
            return;
        }
        if let Some(id) = slot.session_id {
            info!(session = %id, "cancellation requested");
        }
    }

    /// Acknowledge a finished session and return to `Idle`.
    ///
    /// Joins the finished worker, so every event of the old session is
    /// already published when this returns. Returns the state that was
    /// acknowledged.
    ///
    /// # Errors
    /// Returns `SessionError::NotTerminal` while a session is still active.
    pub fn acknowledge(&self) -> Result<SessionState, SessionError> {
        let (previous, worker) = {
            let mut slot = self.slot.lock();
            if slot.state.is_active() {
                return Err(SessionError::NotTerminal { state: slot.state });
            }
            let previous = slot.state;
            slot.state = SessionState::Idle;
            slot.session_id = None;
            (previous, slot.worker.take())
        };

        if let Some(handle) = worker {
            if handle.join().is_err() {
                warn!("download worker panicked");
            }
        }
        Ok(previous)
    }
}

impl Drop for DownloadController {
    fn drop(&mut self) {
        // Stop a detached worker at its next buffer; never join here, the
        // remote may be stalled indefinitely.
        if let Some(flag) = &self.slot.lock().cancel {
            flag.cancel();
        }
    }
}

/// Everything the background thread owns for one session.
struct SessionWorker {
    session_id: Uuid,
    target: DownloadTarget,
    source: Arc<dyn RemoteSource>,
    config: DownloadConfig,
    cancel: CancelFlag,
    slot: Arc<Mutex<SessionSlot>>,
    events: EventBus,
}

impl SessionWorker {
    fn run(self) {
        let started_at = Utc::now();
        info!(
            session = %self.session_id,
            url = %self.target.remote_url,
            path = %self.target.destination_path.display(),
            "download started"
        );
        self.emit(DownloadEvent::Started {
            session_id: self.session_id,
            target: self.target.clone(),
        });

        let sink = ChannelProgress::new(self.session_id, self.events.clone());
        let cancel = self.cancel.clone();
        let result = transfer::transfer(
            self.source.as_ref(),
            &self.target,
            self.config.buffer_size,
            Some(&sink),
            &move || cancel.is_cancelled(),
        );

        let outcome = self.on_transfer_finished(result);
        self.finish(outcome, started_at);
    }

    /// Turn the engine's result into an outcome, running the checksum pass
    /// on success.
    fn on_transfer_finished(&self, result: Result<u64, TransferError>) -> TransferOutcome {
        match result.and_then(|size| self.verify(size)) {
            Ok((final_size_bytes, checksum)) => TransferOutcome::Success {
                final_size_bytes,
                checksum,
            },
            Err(e) => TransferOutcome::Failure {
                reason: e.kind(),
                message: e.to_string(),
            },
        }
    }

    /// Check the on-disk size and compute the checksum of the closed file.
    /// A file that fails verification is removed.
    fn verify(&self, written: u64) -> Result<(u64, ChecksumValue), TransferError> {
        let path = self.target.destination_path.as_path();
        let algorithm = self.config.checksum_algorithm;
        self.emit(DownloadEvent::Verifying {
            session_id: self.session_id,
            algorithm,
        });

        let result = std::fs::metadata(path)
            .map_err(|e| TransferError::local_io(path, e))
            .and_then(|metadata| {
                if metadata.len() != written {
                    return Err(TransferError::SizeMismatch {
                        path: path.to_path_buf(),
                        expected: written,
                        actual: metadata.len(),
                    });
                }
                compute_file_checksum(path, algorithm)
            });

        match result {
            Ok(checksum) => {
                debug!(session = %self.session_id, checksum = %checksum.to_string_with_algo(), "verification complete");
                Ok((written, checksum))
            }
            Err(e) => {
                fs_ops::remove_partial_file(path);
                Err(e)
            }
        }
    }

    fn finish(self, outcome: TransferOutcome, started_at: DateTime<Utc>) {
        let outcome = {
            let mut slot = self.slot.lock();

            // A cancel that lands during verification still wins.
            let outcome = if outcome.is_success() && self.cancel.is_cancelled() {
                fs_ops::remove_partial_file(&self.target.destination_path);
                TransferOutcome::Failure {
                    reason: ErrorKind::Cancelled,
                    message: TransferError::Cancelled.to_string(),
                }
            } else {
                outcome
            };

            slot.state = if outcome.is_success() {
                SessionState::Completed
            } else {
                SessionState::Failed
            };
            slot.cancel = None;
            outcome
        };

        match &outcome {
            TransferOutcome::Success {
                final_size_bytes,
                checksum,
            } => info!(
                session = %self.session_id,
                bytes = final_size_bytes,
                checksum = %checksum.to_string_with_algo(),
                "download completed"
            ),
            TransferOutcome::Failure {
                reason: ErrorKind::Cancelled,
                ..
            } => info!(session = %self.session_id, "download cancelled"),
            TransferOutcome::Failure { reason, message } => {
                warn!(session = %self.session_id, %reason, %message, "download failed")
            }
        }

        self.emit(DownloadEvent::Finished(SessionReport {
            session_id: self.session_id,
            target: self.target.clone(),
            outcome,
            started_at,
            finished_at: Utc::now(),
        }));
    }

    fn emit(&self, event: DownloadEvent) {
        self.events.publish(event);
    }
}
