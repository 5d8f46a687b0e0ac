//! User-visible Notifications

use async_trait::async_trait;

use crate::error::Result;

/// Surface for the actionable "sync keeps failing" notification.
///
/// - **Android**: NotificationManager channel
/// - **Desktop**: tray balloon or log line
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Raise or replace the sync failure notification.
    async fn show_sync_error(&self, title: &str, description: &str) -> Result<()>;

    /// Dismiss the sync failure notification if it is showing.
    async fn clear_sync_error(&self) -> Result<()>;
}
