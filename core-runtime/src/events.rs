//! # Sync Status Channel
//!
//! Publishes coarse-grained synchronization status to observers.
//!
//! ## Overview
//!
//! - **SyncStatus**: the states a sync pass moves through
//! - **StatusChannel**: `tokio::sync::broadcast` fan-out plus an explicit
//!   `last_status` slot, so a late observer sees the current state at once
//! - **StatusStream**: a subscriber that yields the retained status first,
//!   then every later publication
//!
//! ```text
//! ┌──────────────┐  publish   ┌───────────────┐  subscribe  ┌──────────┐
//! │ Coordinator  ├───────────>│ StatusChannel ├────────────>│ Observer │
//! └──────────────┘            │  last_status  │             └──────────┘
//!                             └───────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{StatusChannel, SyncStatus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let channel = StatusChannel::new(16);
//! channel.publish(SyncStatus::Started);
//!
//! let mut stream = channel.subscribe();
//! assert_eq!(stream.recv().await.unwrap(), SyncStatus::Started);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the observer missed `n` updates. Non-fatal;
//!   [`StatusChannel::latest`] always has the current state.
//! - **`RecvError::Closed`**: the channel was dropped, treat as shutdown.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, Receiver};

/// Default number of buffered status updates per observer.
pub const DEFAULT_STATUS_BUFFER_SIZE: usize = 32;

/// States a synchronization pass reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    Started,
    SyncingSubscriptions,
    DownloadingEpisodeActions,
    UploadingEpisodeActions,
    /// First sync only: announcing already-played episodes.
    UploadingPlayedState,
    Succeeded,
    Failed {
        /// Human-readable cause
        message: String,
    },
}

impl SyncStatus {
    pub fn description(&self) -> &str {
        match self {
            SyncStatus::Started => "Sync started",
            SyncStatus::SyncingSubscriptions => "Synchronizing subscriptions",
            SyncStatus::DownloadingEpisodeActions => "Downloading episode changes",
            SyncStatus::UploadingEpisodeActions => "Uploading episode changes",
            SyncStatus::UploadingPlayedState => "Uploading played status",
            SyncStatus::Succeeded => "Sync completed successfully",
            SyncStatus::Failed { .. } => "Sync failed",
        }
    }

    /// True once a pass has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Succeeded | SyncStatus::Failed { .. })
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            SyncStatus::Failed { .. } => EventSeverity::Error,
            SyncStatus::Succeeded | SyncStatus::Started => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Broadcast channel that retains the most recent status.
///
/// Cloning is cheap; clones share the sender and the retained slot.
#[derive(Clone)]
pub struct StatusChannel {
    sender: broadcast::Sender<SyncStatus>,
    last_status: Arc<RwLock<Option<SyncStatus>>>,
}

impl StatusChannel {
    /// Creates a channel buffering up to `capacity` updates per observer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            last_status: Arc::new(RwLock::new(None)),
        }
    }

    /// Records `status` as current and fans it out.
    ///
    /// Returns the number of observers reached. Having none is not an error;
    /// the status is still retained.
    pub fn publish(&self, status: SyncStatus) -> usize {
        // Send under the write lock: a concurrent subscriber gets the new
        // value either replayed or received, never both.
        let mut last = self.last_status.write();
        *last = Some(status.clone());
        self.sender.send(status).unwrap_or(0)
    }

    /// The most recently published status, if any.
    pub fn latest(&self) -> Option<SyncStatus> {
        self.last_status.read().clone()
    }

    /// Forget the retained status. Observers see nothing until the next publish.
    pub fn reset(&self) {
        *self.last_status.write() = None;
    }

    /// Creates an observer that receives the current status first.
    pub fn subscribe(&self) -> StatusStream {
        let last = self.last_status.read();
        StatusStream {
            pending: last.clone(),
            receiver: self.sender.subscribe(),
            filter: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for StatusChannel {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_BUFFER_SIZE)
    }
}

impl fmt::Debug for StatusChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusChannel")
            .field("latest", &self.latest())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type StatusFilter = Box<dyn Fn(&SyncStatus) -> bool + Send + Sync>;

/// Observer side of a [`StatusChannel`].
pub struct StatusStream {
    pending: Option<SyncStatus>,
    receiver: Receiver<SyncStatus>,
    filter: Option<StatusFilter>,
}

impl StatusStream {
    /// Only yield statuses matching `predicate`, including the replayed one.
    ///
    /// ```rust
    /// use core_runtime::events::{StatusChannel, SyncStatus};
    ///
    /// let channel = StatusChannel::default();
    /// let terminal = channel.subscribe().filter(SyncStatus::is_terminal);
    /// ```
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SyncStatus) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, status: &SyncStatus) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(status))
    }

    /// Next status passing the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if this observer fell behind by `n` updates,
    /// `RecvError::Closed` when every sender is gone.
    pub async fn recv(&mut self) -> Result<SyncStatus, RecvError> {
        if let Some(status) = self.pending.take() {
            if self.accepts(&status) {
                return Ok(status);
            }
        }

        loop {
            let status = self.receiver.recv().await?;
            if self.accepts(&status) {
                return Ok(status);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<SyncStatus, RecvError>> {
        if let Some(status) = self.pending.take() {
            if self.accepts(&status) {
                return Some(Ok(status));
            }
        }

        loop {
            match self.receiver.try_recv() {
                Ok(status) => {
                    if self.accepts(&status) {
                        return Some(Ok(status));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for StatusStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusStream")
            .field("pending", &self.pending)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
