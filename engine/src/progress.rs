//! Progress reporting and event hand-off.
//!
//! The transfer engine reports progress through the `ProgressCallback`
//! trait, synchronously on its own thread. The session controller plugs in
//! `ChannelProgress`, which turns every callback into a `DownloadEvent`
//! published on an `EventBus`. Each subscriber drains its own channel on its
//! own thread, which is the only place UI state is touched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::ChecksumAlgorithm;
use crate::model::{DownloadTarget, SessionReport, TransferProgress};

/// Receives progress snapshots from a running transfer.
///
/// Called on the engine's thread after every buffer write. Implementations
/// must not block on UI work.
pub trait ProgressCallback: Send {
    fn on_progress(&self, progress: &TransferProgress);
}

impl<F> ProgressCallback for F
where
    F: Fn(&TransferProgress) + Send,
{
    fn on_progress(&self, progress: &TransferProgress) {
        self(progress)
    }
}

/// Shared cancellation flag.
///
/// The controller only ever sets it; the engine only ever reads it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Plain data events delivered to the caller's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DownloadEvent {
    Started {
        session_id: Uuid,
        target: DownloadTarget,
    },
    Progress {
        session_id: Uuid,
        progress: TransferProgress,
    },
    /// Transfer finished; the checksum pass is running
    Verifying {
        session_id: Uuid,
        algorithm: ChecksumAlgorithm,
    },
    Finished(SessionReport),
}

impl DownloadEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            DownloadEvent::Started { session_id, .. }
            | DownloadEvent::Progress { session_id, .. }
            | DownloadEvent::Verifying { session_id, .. } => *session_id,
            DownloadEvent::Finished(report) => report.session_id,
        }
    }
}

/// Fan-out of events to every live subscriber.
///
/// Each subscriber gets its own channel and a copy of every event published
/// after it subscribed; nothing is replayed. A subscriber whose receiver was
/// dropped is pruned on the next publish, and with no subscribers an event
/// is discarded.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<DownloadEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<DownloadEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, event: DownloadEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of subscribers still connected as of the last publish.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// A ProgressCallback that publishes snapshots on the event bus.
pub struct ChannelProgress {
    session_id: Uuid,
    events: EventBus,
}

impl ChannelProgress {
    pub fn new(session_id: Uuid, events: EventBus) -> Self {
        ChannelProgress { session_id, events }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_progress(&self, progress: &TransferProgress) {
        self.events.publish(DownloadEvent::Progress {
            session_id: self.session_id,
            progress: *progress,
        });
    }
}

/// Collapse runs of consecutive progress events to the most recent one.
///
/// Non-progress events are kept in order, so a burst drained from the
/// channel renders as "latest progress wins".
pub fn coalesce_progress<I>(events: I) -> Vec<DownloadEvent>
where
    I: IntoIterator<Item = DownloadEvent>,
{
    let mut out: Vec<DownloadEvent> = Vec::new();
    for event in events {
        let replace_last = matches!(
            (out.last(), &event),
            (
                Some(DownloadEvent::Progress { session_id: prev, .. }),
                DownloadEvent::Progress { session_id, .. }
            ) if prev == session_id
        );
        if replace_last {
            out.pop();
        }
        out.push(event);
    }
    out
}
