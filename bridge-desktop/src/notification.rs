//! Desktop notification sink

use async_trait::async_trait;
use bridge_traits::{error::Result, notification::NotificationSink};
use std::sync::Mutex;
use tracing::{info, warn};

/// Notification sink that writes to the log and remembers the active message.
///
/// Desktop shells without a tray integration poll
/// [`active_error`](Self::active_error) to render a banner.
#[derive(Default)]
pub struct LogNotificationSink {
    active: Mutex<Option<(String, String)>>,
}

impl LogNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Title and description of the notification currently showing.
    pub fn active_error(&self) -> Option<(String, String)> {
        self.active.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn show_sync_error(&self, title: &str, description: &str) -> Result<()> {
        warn!(title = title, description = description, "Sync error notification");
        if let Ok(mut active) = self.active.lock() {
            *active = Some((title.to_string(), description.to_string()));
        }
        Ok(())
    }

    async fn clear_sync_error(&self) -> Result<()> {
        if let Ok(mut active) = self.active.lock() {
            if active.take().is_some() {
                info!("Sync error notification cleared");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_show_and_clear() {
        let sink = LogNotificationSink::new();
        assert!(sink.active_error().is_none());

        sink.show_sync_error("Synchronization failed", "HTTP 401")
            .await
            .unwrap();
        assert_eq!(
            sink.active_error(),
            Some(("Synchronization failed".to_string(), "HTTP 401".to_string()))
        );

        sink.clear_sync_error().await.unwrap();
        assert!(sink.active_error().is_none());
    }
}
