//! # Sync Coordinator
//!
//! Runs one synchronization pass against the active provider.
//!
//! ## Overview
//!
//! A pass is invoked by the background executor through
//! [`SyncCoordinator::run_pass`] and maps its result onto a
//! [`WorkOutcome`] so the executor can retry with backoff.
//!
//! ## Workflow
//!
//! 1. Record the attempt, build the provider and log in
//! 2. **Subscription phase**: fetch the remote delta since the watermark,
//!    apply it to the library unless a queued local change says otherwise,
//!    seed the queue from local subscriptions on first sync, upload the
//!    queued diff under the upload lock and commit the new watermark
//! 3. **Episode-action phase**: fetch remote actions since the watermark,
//!    resolve them against queued local actions, apply the remote winners
//!    in one bulk update, announce the played history on first sync, upload
//!    the queued actions under the upload lock and commit the new watermark
//! 4. Log out, clear the failure notification and report success
//!
//! Each phase commits its own watermark, so a failure or cancellation in
//! the episode-action phase keeps the subscription phase's progress.
//!
//! A cancelled pass publishes no terminal status. The latest status stays at
//! the interrupted phase until the replacement run publishes `Started`.
//!
//! Feed URLs are compared by canonical form only. Remote additions are
//! subscribed with the server's URL, remote removals unsubscribe the
//! library's own URL, and uploads carry URLs as they were queued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//! use bridge_traits::background::WorkContext;
//!
//! # async fn example(coordinator: SyncCoordinator) {
//! let outcome = coordinator.run_pass(WorkContext::new("podsync.sync", 0)).await;
//! println!("pass finished: {:?}", outcome);
//! # }
//! ```

use bridge_traits::{
    background::{BackoffPolicy, WorkContext, WorkOutcome},
    library::{FeedItem, PodcastLibrary},
    notification::NotificationSink,
    time::{Clock, SystemClock},
    BridgeError,
};
use core_runtime::events::{StatusChannel, SyncStatus};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    conflict_resolver::ConflictResolver,
    lock::UploadLock,
    model::{EpisodeAction, EpisodeActionKind},
    normalize::{contains_url, find_url, unique_urls, valid_guid},
    provider::{ProviderFactory, ProviderKind, SyncProvider},
    queue::SynchronizationQueue,
    settings::SynchronizationSettings,
    Result, SyncError,
};

/// Title of the sustained-failure notification.
pub const SYNC_ERROR_TITLE: &str = "Synchronization failed";

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Delay applied before every triggered pass so bursts of events
    /// collapse into one run
    pub initial_delay: Duration,

    /// First retry delay after a synchronization failure
    pub backoff_seed: Duration,

    /// Cap for the doubling retry delay
    pub backoff_max: Duration,

    /// A position this close to the end marks the episode played
    pub almost_ended_tolerance: Duration,

    /// Bound for every individual provider call
    pub request_timeout: Duration,

    /// Raise the failure notification on every n-th consecutive failure
    pub notify_every: u32,

    pub notifications_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            backoff_seed: Duration::from_secs(10 * 60),
            backoff_max: Duration::from_secs(5 * 60 * 60),
            almost_ended_tolerance: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            notify_every: 3,
            notifications_enabled: true,
        }
    }
}

impl SyncConfig {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff(mut self, seed: Duration, max: Duration) -> Self {
        self.backoff_seed = seed;
        self.backoff_max = max;
        self
    }

    pub fn with_almost_ended_tolerance(mut self, tolerance: Duration) -> Self {
        self.almost_ended_tolerance = tolerance;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_notify_every(mut self, every: u32) -> Self {
        self.notify_every = every;
        self
    }

    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    /// # Errors
    ///
    /// Returns `SyncError::Config` for zero timeouts, an inverted backoff
    /// range or a zero notification cadence.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request_timeout must be positive".into()));
        }
        if self.backoff_seed.is_zero() {
            return Err(SyncError::Config("backoff_seed must be positive".into()));
        }
        if self.backoff_max < self.backoff_seed {
            return Err(SyncError::Config(format!(
                "backoff_max ({:?}) is below backoff_seed ({:?})",
                self.backoff_max, self.backoff_seed
            )));
        }
        if self.notify_every == 0 {
            return Err(SyncError::Config("notify_every must be at least 1".into()));
        }
        Ok(())
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.backoff_seed, self.backoff_max)
    }

    /// `run_attempt` is zero-based, so with the default cadence the third,
    /// sixth, ... consecutive failure notifies.
    pub fn should_notify(&self, run_attempt: u32) -> bool {
        self.notifications_enabled
            && self.notify_every > 0
            && run_attempt % self.notify_every == self.notify_every - 1
    }
}

/// True when `position_ms` is within `tolerance` of the end.
pub fn is_almost_ended(position_ms: u64, duration_ms: u64, tolerance: Duration) -> bool {
    let tolerance_ms = u64::try_from(tolerance.as_millis()).unwrap_or(u64::MAX);
    duration_ms > 0 && position_ms >= duration_ms.saturating_sub(tolerance_ms)
}

/// Sync coordinator for one pass at a time
pub struct SyncCoordinator {
    config: SyncConfig,
    settings: Arc<SynchronizationSettings>,
    queue: Arc<SynchronizationQueue>,
    library: Arc<dyn PodcastLibrary>,
    providers: Arc<dyn ProviderFactory>,
    status: StatusChannel,
    upload_lock: UploadLock,
    notifications: Option<Arc<dyn NotificationSink>>,
    clock: Arc<dyn Clock>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        settings: Arc<SynchronizationSettings>,
        queue: Arc<SynchronizationQueue>,
        library: Arc<dyn PodcastLibrary>,
        providers: Arc<dyn ProviderFactory>,
        status: StatusChannel,
        upload_lock: UploadLock,
    ) -> Self {
        Self {
            config,
            settings,
            queue,
            library,
            providers,
            status,
            upload_lock,
            notifications: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifications(mut self, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        self.notifications = sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass and classify its result for the executor.
    #[instrument(skip(self, ctx), fields(attempt = ctx.run_attempt))]
    pub async fn run_pass(&self, ctx: WorkContext) -> WorkOutcome {
        let kind = match self.active_provider().await {
            Ok(Some(kind)) => kind,
            Ok(None) => {
                debug!("No active sync provider, skipping pass");
                return WorkOutcome::Success;
            }
            Err(e) => return self.handle_local_failure(e).await,
        };

        match self.sync(kind, &ctx).await {
            Ok(()) => {
                // Record before publishing so observers of the terminal
                // status read settled state.
                if let Err(e) = self.settings.set_last_sync_attempt_success(true).await {
                    warn!(error = %e, "Failed to record sync success");
                }
                self.status.publish(SyncStatus::Succeeded);
                info!(provider = %kind, "Synchronization finished");
                WorkOutcome::Success
            }
            Err(SyncError::Cancelled) => {
                info!("Synchronization pass cancelled");
                WorkOutcome::Retry
            }
            Err(e) if e.is_sync_failure() => self.handle_sync_failure(e, ctx.run_attempt).await,
            Err(e) => self.handle_local_failure(e).await,
        }
    }

    async fn active_provider(&self) -> Result<Option<ProviderKind>> {
        if !self.settings.has_active_provider().await? {
            return Ok(None);
        }
        self.settings.selected_provider().await
    }

    async fn sync(&self, kind: ProviderKind, ctx: &WorkContext) -> Result<()> {
        self.settings.update_last_sync_attempt().await?;

        let provider = self.providers.create(kind).await?;
        self.call(provider.login()).await?;

        self.status.publish(SyncStatus::SyncingSubscriptions);
        self.sync_subscriptions(provider.as_ref()).await?;
        check_cancelled(ctx)?;

        self.status.publish(SyncStatus::DownloadingEpisodeActions);
        self.sync_episode_actions(provider.as_ref(), ctx).await?;

        self.call(provider.logout()).await?;

        if let Some(sink) = &self.notifications {
            if let Err(e) = sink.clear_sync_error().await {
                warn!(error = %e, "Failed to clear sync error notification");
            }
        }
        Ok(())
    }

    #[instrument(skip(self, provider))]
    async fn sync_subscriptions(&self, provider: &dyn SyncProvider) -> Result<()> {
        let last_sync = self.settings.last_subscription_sync_timestamp().await?;
        let local = self
            .library
            .subscription_urls()
            .await
            .map_err(library_error)?;

        let changes = self.call(provider.get_subscription_changes(last_sync)).await?;
        let remote_added = unique_urls(&changes.added);
        let remote_removed = unique_urls(&changes.removed);
        debug!(
            since = last_sync,
            added = remote_added.len(),
            removed = remote_removed.len(),
            "Fetched subscription changes"
        );

        let queued = self.queue.snapshot().await?;

        for url in &remote_added {
            if contains_url(&local, url) || contains_url(&queued.removed_feeds, url) {
                continue;
            }
            info!(feed_url = %url, "Subscribing to remotely added feed");
            self.library.subscribe(url).await.map_err(library_error)?;
        }

        for url in &remote_removed {
            if contains_url(&queued.added_feeds, url) {
                continue;
            }
            let Some(local_url) = find_url(&local, url) else {
                continue;
            };
            info!(feed_url = %local_url, "Unsubscribing from remotely removed feed");
            self.library
                .unsubscribe(local_url)
                .await
                .map_err(library_error)?;
        }

        let _guard = self.upload_lock.acquire().await;

        if last_sync == 0 {
            // Feeds the server reported either way are already settled.
            let seed: Vec<String> = local
                .iter()
                .filter(|url| {
                    !contains_url(&remote_added, url) && !contains_url(&remote_removed, url)
                })
                .cloned()
                .collect();
            let seeded = self.queue.seed_feeds_added(&seed).await?;
            info!(seeded, "First sync: queued local subscriptions for upload");
        }

        let snapshot = self.queue.snapshot().await?;
        let had_feed_changes = snapshot.has_feed_changes();
        let added = snapshot.added_feeds;
        let removed: Vec<String> = snapshot
            .removed_feeds
            .into_iter()
            .filter(|url| !contains_url(&remote_removed, url))
            .collect();

        let watermark = if !added.is_empty() || !removed.is_empty() {
            info!(
                added = added.len(),
                removed = removed.len(),
                "Uploading subscription changes"
            );
            let response = self
                .call(provider.upload_subscription_changes(&added, &removed))
                .await?;
            for (sent, rewritten) in &response.updated_urls {
                debug!(sent = %sent, rewritten = %rewritten, "Server rewrote feed URL");
            }
            self.queue.clear_feed_queues().await?;
            response.timestamp
        } else {
            if had_feed_changes {
                // Every queued removal is already known to the server.
                self.queue.clear_feed_queues().await?;
            }
            changes.timestamp
        };

        self.settings
            .set_last_subscription_sync_timestamp(watermark)
            .await?;
        debug!(watermark, "Subscription phase committed");
        Ok(())
    }

    #[instrument(skip(self, provider, ctx))]
    async fn sync_episode_actions(&self, provider: &dyn SyncProvider, ctx: &WorkContext) -> Result<()> {
        let last_sync = self.settings.last_episode_action_sync_timestamp().await?;

        let changes = self.call(provider.get_episode_action_changes(last_sync)).await?;
        let fetched = changes.actions.len();
        let remote: Vec<EpisodeAction> = changes
            .actions
            .into_iter()
            .filter(EpisodeAction::is_well_formed)
            .collect();
        if remote.len() < fetched {
            debug!(dropped = fetched - remote.len(), "Ignoring unusable remote episode actions");
        }

        let queued = self.queue.queued_episode_actions().await?;
        let resolution = ConflictResolver::resolve(&remote, &queued);
        let overrides: Vec<&EpisodeAction> = resolution.remote_overrides().collect();
        debug!(
            since = last_sync,
            fetched,
            applied = overrides.len(),
            "Resolved episode actions"
        );
        self.apply_remote_actions(&overrides).await?;

        check_cancelled(ctx)?;
        self.status.publish(SyncStatus::UploadingEpisodeActions);

        let _guard = self.upload_lock.acquire().await;

        let mut actions = self.queue.queued_episode_actions().await?;
        if last_sync == 0 {
            self.status.publish(SyncStatus::UploadingPlayedState);
            let played = self.played_state_actions().await?;
            info!(count = played.len(), "First sync: announcing played episodes");
            actions.extend(played);
        }

        let watermark = if actions.is_empty() {
            changes.timestamp
        } else {
            info!(count = actions.len(), "Uploading episode actions");
            let response = self.call(provider.upload_episode_actions(&actions)).await?;
            self.queue.clear_episode_action_queue().await?;
            response.timestamp
        };

        self.settings
            .set_last_episode_action_sync_timestamp(watermark)
            .await?;
        debug!(watermark, "Episode-action phase committed");
        Ok(())
    }

    /// Apply winning remote actions with one bulk library update.
    async fn apply_remote_actions(&self, actions: &[&EpisodeAction]) -> Result<()> {
        let mut updated: Vec<FeedItem> = Vec::new();
        let mut finished: Vec<i64> = Vec::new();

        for action in actions {
            let found = self
                .library
                .find_item(valid_guid(action.guid.as_deref()), &action.episode)
                .await
                .map_err(library_error)?;
            let Some(mut item) = found else {
                info!(episode = %action.episode, "Remote action for unknown episode, skipping");
                continue;
            };

            match action.action {
                EpisodeActionKind::New => {
                    item.played = false;
                    if let Some(media) = item.media.as_mut() {
                        media.position_ms = 0;
                    }
                    finished.retain(|id| *id != item.id);
                }
                EpisodeActionKind::Play => {
                    let (Some(media), Some(position)) = (item.media.as_mut(), action.position) else {
                        debug!(episode = %action.episode, "Play action without position or media");
                        continue;
                    };
                    media.position_ms = position.saturating_mul(1000);
                    let duration_ms = media
                        .duration_ms
                        .or_else(|| action.total.map(|total| total.saturating_mul(1000)));
                    if let Some(duration_ms) = duration_ms {
                        if is_almost_ended(
                            media.position_ms,
                            duration_ms,
                            self.config.almost_ended_tolerance,
                        ) {
                            item.played = true;
                            if !finished.contains(&item.id) {
                                finished.push(item.id);
                            }
                        }
                    }
                }
                _ => continue,
            }

            match updated.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => *existing = item,
                None => updated.push(item),
            }
        }

        if !updated.is_empty() {
            self.library
                .update_items(&updated)
                .await
                .map_err(library_error)?;
        }
        if !finished.is_empty() {
            self.library
                .remove_from_play_queue(&finished)
                .await
                .map_err(library_error)?;
        }
        Ok(())
    }

    /// `PLAY` at full duration for every played episode with media.
    ///
    /// Episodes without a known duration are skipped: a zero-length play
    /// would not mark them played anywhere else.
    async fn played_state_actions(&self) -> Result<Vec<EpisodeAction>> {
        let played = self.library.played_items().await.map_err(library_error)?;
        let now = self.clock.now();

        let actions: Vec<EpisodeAction> = played
            .iter()
            .filter_map(|item| {
                let duration = item.media.as_ref()?.duration_ms? / 1000;
                if duration == 0 {
                    return None;
                }
                EpisodeAction::builder_for_item(item, EpisodeActionKind::Play).map(|builder| {
                    builder
                        .timestamp(now)
                        .started(duration)
                        .position(duration)
                        .total(duration)
                        .build()
                })
            })
            .collect();
        if actions.len() < played.len() {
            debug!(
                skipped = played.len() - actions.len(),
                "Played episodes without media or duration are not announced"
            );
        }
        Ok(actions)
    }

    async fn handle_sync_failure(&self, error: SyncError, run_attempt: u32) -> WorkOutcome {
        let message = error.to_string();
        error!(error = %message, attempt = run_attempt, "Synchronization failed");

        if let Err(e) = self.settings.set_last_sync_attempt_success(false).await {
            warn!(error = %e, "Failed to record sync failure");
        }

        if self.config.should_notify(run_attempt) {
            if let Some(sink) = &self.notifications {
                if let Err(e) = sink.show_sync_error(SYNC_ERROR_TITLE, &message).await {
                    warn!(error = %e, "Failed to show sync error notification");
                }
            }
        }

        self.status.publish(SyncStatus::Failed { message });
        WorkOutcome::Retry
    }

    async fn handle_local_failure(&self, error: SyncError) -> WorkOutcome {
        let message = error.to_string();
        error!(error = %message, "Synchronization pass aborted");

        if let Err(e) = self.settings.set_last_sync_attempt_success(false).await {
            warn!(error = %e, "Failed to record sync failure");
        }
        self.status.publish(SyncStatus::Failed { message });
        WorkOutcome::Failure
    }

    async fn call<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.request_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(self.config.request_timeout.as_secs())),
        }
    }
}

fn check_cancelled(ctx: &WorkContext) -> Result<()> {
    if ctx.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

fn library_error(error: BridgeError) -> SyncError {
    SyncError::Library(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(5));
        assert_eq!(config.backoff_seed, Duration::from_secs(600));
        assert_eq!(config.almost_ended_tolerance, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.notify_every, 3);
        assert!(config.notifications_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let zero_timeout = SyncConfig::default().with_request_timeout(Duration::ZERO);
        assert!(matches!(zero_timeout.validate(), Err(SyncError::Config(_))));

        let inverted = SyncConfig::default()
            .with_backoff(Duration::from_secs(60), Duration::from_secs(10));
        assert!(matches!(inverted.validate(), Err(SyncError::Config(_))));

        let never = SyncConfig::default().with_notify_every(0);
        assert!(never.validate().is_err());
    }

    #[test]
    fn test_notification_cadence() {
        let config = SyncConfig::default();
        let notified: Vec<u32> = (0..9).filter(|n| config.should_notify(*n)).collect();
        assert_eq!(notified, vec![2, 5, 8]);

        let disabled = SyncConfig::default().with_notifications(false);
        assert!(!disabled.should_notify(2));

        let every = SyncConfig::default().with_notify_every(1);
        assert!(every.should_notify(0));
    }

    #[test]
    fn test_almost_ended() {
        let tolerance = Duration::from_secs(30);
        assert!(is_almost_ended(3_580_000, 3_600_000, tolerance));
        assert!(is_almost_ended(3_570_000, 3_600_000, tolerance));
        assert!(!is_almost_ended(3_569_999, 3_600_000, tolerance));
        assert!(!is_almost_ended(10_000, 0, tolerance));
        assert!(is_almost_ended(1_000, 20_000, tolerance));
    }

    #[test]
    fn test_backoff_policy_from_config() {
        let policy = SyncConfig::default().backoff_policy();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(600));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1200));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(5 * 3600));
    }
}
