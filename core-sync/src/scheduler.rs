//! Sync triggers and enqueue-and-sync operations.
//!
//! Every trigger converges on one unique job ([`SYNC_WORK_ID`]) enqueued
//! with [`ExistingWorkPolicy::Replace`], so a burst of triggers inside the
//! initial delay collapses into a single pass. Business events (feed
//! subscribed, episode played, ...) enqueue their change and trigger a sync
//! under the upload lock, inline when it is free and on a spawned task
//! otherwise.

use bridge_traits::{
    background::{BackgroundExecutor, ExistingWorkPolicy, TaskConstraints, TaskId, WorkRequest},
    library::FeedItem,
    time::{Clock, SystemClock},
};
use core_runtime::events::{StatusChannel, SyncStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::{
    coordinator::SyncConfig,
    lock::UploadLock,
    model::{EpisodeAction, EpisodeActionKind},
    provider::ProviderKind,
    queue::SynchronizationQueue,
    settings::SynchronizationSettings,
    Result,
};

/// Unique work id every sync trigger enqueues under.
pub const SYNC_WORK_ID: &str = "podsync.sync";

#[derive(Clone)]
pub struct SyncScheduler {
    executor: Arc<dyn BackgroundExecutor>,
    settings: Arc<SynchronizationSettings>,
    queue: Arc<SynchronizationQueue>,
    status: StatusChannel,
    upload_lock: UploadLock,
    config: SyncConfig,
    clock: Arc<dyn Clock>,
}

impl SyncScheduler {
    pub fn new(
        executor: Arc<dyn BackgroundExecutor>,
        settings: Arc<SynchronizationSettings>,
        queue: Arc<SynchronizationQueue>,
        status: StatusChannel,
        upload_lock: UploadLock,
        config: SyncConfig,
    ) -> Self {
        Self {
            executor,
            settings,
            queue,
            status,
            upload_lock,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Trigger a pass after the configured initial delay.
    ///
    /// Returns `None` when no provider is active.
    pub async fn sync(&self) -> Result<Option<TaskId>> {
        self.trigger(self.config.initial_delay).await
    }

    /// Trigger a pass without the initial delay.
    pub async fn sync_immediately(&self) -> Result<Option<TaskId>> {
        self.trigger(Duration::ZERO).await
    }

    /// Reset both watermarks so the next pass is a first sync, and trigger
    /// it immediately.
    pub async fn full_sync(&self) -> Result<bool> {
        if !self.is_active().await? {
            return Ok(false);
        }

        let this = self.clone();
        self.upload_lock
            .execute_locked("full_sync", move || async move {
                this.settings.reset_timestamps().await?;
                this.sync_immediately().await?;
                Ok(())
            })
            .await?;
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn trigger(&self, delay: Duration) -> Result<Option<TaskId>> {
        if !self.is_active().await? {
            debug!("No active sync provider, not scheduling");
            return Ok(None);
        }

        let constraints = if self.settings.allow_metered_refresh().await? {
            TaskConstraints::connected()
        } else {
            TaskConstraints::unmetered()
        };
        let request = WorkRequest::new(SYNC_WORK_ID)
            .with_initial_delay(delay)
            .with_constraints(constraints)
            .with_backoff(self.config.backoff_policy());

        let task_id = self
            .executor
            .enqueue_unique_work(request, ExistingWorkPolicy::Replace)
            .await?;
        self.status.publish(SyncStatus::Started);
        debug!(%task_id, "Sync scheduled");
        Ok(Some(task_id))
    }

    /// Queue a subscription for upload and trigger a sync.
    ///
    /// Returns `false` when no provider is active and nothing was queued.
    pub async fn enqueue_feed_added(&self, feed_url: &str) -> Result<bool> {
        let feed_url = feed_url.to_string();
        self.enqueue_and_sync("enqueue_feed_added", move |queue| async move {
            queue.enqueue_feed_added(&feed_url).await.map(|_| ())
        })
        .await
    }

    pub async fn enqueue_feed_removed(&self, feed_url: &str) -> Result<bool> {
        let feed_url = feed_url.to_string();
        self.enqueue_and_sync("enqueue_feed_removed", move |queue| async move {
            queue.enqueue_feed_removed(&feed_url).await.map(|_| ())
        })
        .await
    }

    pub async fn enqueue_episode_action(&self, action: EpisodeAction) -> Result<bool> {
        self.enqueue_and_sync("enqueue_episode_action", move |queue| async move {
            queue.enqueue_episode_action(&action).await
        })
        .await
    }

    /// Report a finished or interrupted listening session of `item`.
    ///
    /// Skipped when the item has no media, the session start is unknown, or
    /// an unfinished session did not advance past its start.
    pub async fn enqueue_episode_played(&self, item: &FeedItem, completed: bool) -> Result<bool> {
        let Some(action) = self.played_action(item, completed) else {
            debug!(item_id = item.id, "Nothing to report for episode");
            return Ok(false);
        };
        self.enqueue_episode_action(action).await
    }

    fn played_action(&self, item: &FeedItem, completed: bool) -> Option<EpisodeAction> {
        let media = item.media.as_ref()?;
        let start_ms = media.played_start_ms?;
        if !completed && start_ms >= media.position_ms {
            return None;
        }

        let duration_ms = media.duration_ms.unwrap_or(0);
        let position_ms = if completed { duration_ms } else { media.position_ms };

        let action = EpisodeAction::builder_for_item(item, EpisodeActionKind::Play)?
            .timestamp(self.clock.now())
            .started(start_ms / 1000)
            .position(position_ms / 1000)
            .total(duration_ms / 1000)
            .build();
        Some(action)
    }

    /// Drop every pending change.
    pub async fn clear_queue(&self) -> Result<()> {
        let queue = self.queue.clone();
        self.upload_lock
            .execute_locked("clear_queue", move || async move { queue.clear_queue().await })
            .await?;
        Ok(())
    }

    /// Select and connect `kind`.
    pub async fn connect(&self, kind: ProviderKind) -> Result<()> {
        let settings = self.settings.clone();
        self.upload_lock
            .execute_locked("connect", move || async move { settings.connect(kind).await })
            .await?;
        Ok(())
    }

    /// Disconnect the provider, dropping pending changes and watermarks.
    /// The selection is kept.
    pub async fn disconnect(&self) -> Result<()> {
        let settings = self.settings.clone();
        let queue = self.queue.clone();
        self.upload_lock
            .execute_locked("disconnect", move || async move {
                settings.disconnect().await?;
                queue.clear_queue().await?;
                settings.reset_timestamps().await
            })
            .await?;
        info!("Sync provider disconnected, pending changes dropped");
        Ok(())
    }

    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    pub fn upload_lock(&self) -> &UploadLock {
        &self.upload_lock
    }

    async fn is_active(&self) -> Result<bool> {
        self.settings.has_active_provider().await
    }

    async fn enqueue_and_sync<F, Fut>(&self, label: &'static str, enqueue: F) -> Result<bool>
    where
        F: FnOnce(Arc<SynchronizationQueue>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if !self.is_active().await? {
            debug!(task = label, "No active sync provider, change not queued");
            return Ok(false);
        }

        let this = self.clone();
        self.upload_lock
            .execute_locked(label, move || async move {
                enqueue(this.queue.clone()).await?;
                this.sync().await?;
                Ok(())
            })
            .await?;
        Ok(true)
    }
}
