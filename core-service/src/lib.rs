//! Sync service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, settings,
//! secure storage, background execution, the podcast library) into the sync
//! engine and selects the remote backend from the stored provider key.
//! Desktop apps typically enable the `desktop-shims` feature, which fills in
//! the capabilities `bridge-desktop` provides.
//!
//! ```ignore
//! use core_service::{bootstrap_desktop, GpodnetCredentials};
//!
//! let service = bootstrap_desktop("/path/to/podsync.db", library).await?;
//! service
//!     .connect_gpodnet(GpodnetCredentials::new("alice", "laptop", password))
//!     .await?;
//! service.enqueue_feed_added("https://example.com/feed.xml").await?;
//! ```

pub mod credentials;
pub mod error;
pub mod providers;

pub use credentials::{CredentialStore, GpodnetCredentials, NextcloudCredentials};
pub use error::{Result, ServiceError};
pub use providers::DefaultProviderFactory;

use std::sync::Arc;

use bridge_traits::{BackgroundExecutor, FeedItem, WorkContext, WorkHandler};
use core_runtime::config::CoreConfig;
use core_runtime::events::{StatusChannel, StatusStream};
use core_sync::repository::open_pool;
use core_sync::{
    EpisodeAction, ProviderKind, SqliteQueueRepository, SyncConfig, SyncCoordinator, SyncError,
    SyncProvider, SyncScheduler, SyncSettingsSnapshot, SynchronizationQueue,
    SynchronizationSettings, UploadLock, SYNC_WORK_ID,
};
use futures::FutureExt;
use tracing::{info, instrument, warn};

#[cfg(feature = "desktop-shims")]
use bridge_traits::{PodcastLibrary, SettingsStore};
#[cfg(feature = "desktop-shims")]
use std::path::Path;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct SyncService {
    settings: Arc<SynchronizationSettings>,
    queue: Arc<SynchronizationQueue>,
    scheduler: SyncScheduler,
    credentials: CredentialStore,
    providers: Arc<DefaultProviderFactory>,
    status: StatusChannel,
    config: SyncConfig,
}

impl SyncService {
    /// Build the service with the default [`SyncConfig`].
    pub async fn new(core: CoreConfig) -> Result<Self> {
        Self::with_sync_config(core, SyncConfig::default()).await
    }

    /// Open the queue database, wire the engine and register the pass
    /// handler with the background executor.
    #[instrument(skip_all, fields(database = %core.database_path.display()))]
    pub async fn with_sync_config(core: CoreConfig, config: SyncConfig) -> Result<Self> {
        core.validate()?;
        config.validate()?;

        let pool = open_pool(&core.database_path).await?;
        let repository = SqliteQueueRepository::new(pool);
        repository.initialize().await?;
        let queue = Arc::new(SynchronizationQueue::new(Arc::new(repository)));

        let settings = Arc::new(SynchronizationSettings::new(
            core.settings_store.clone(),
            core.clock.clone(),
        ));
        let credentials = CredentialStore::new(core.settings_store.clone(), core.secure_store.clone());
        let providers = Arc::new(DefaultProviderFactory::new(
            core.http_client.clone(),
            credentials.clone(),
        ));
        let status = StatusChannel::default();
        let upload_lock = UploadLock::new();

        let coordinator = Arc::new(
            SyncCoordinator::new(
                config.clone(),
                settings.clone(),
                queue.clone(),
                core.library.clone(),
                providers.clone(),
                status.clone(),
                upload_lock.clone(),
            )
            .with_notifications(core.notification_sink.clone())
            .with_clock(core.clock.clone()),
        );
        let handler: WorkHandler = Arc::new(move |ctx: WorkContext| {
            let coordinator = coordinator.clone();
            async move { coordinator.run_pass(ctx).await }.boxed()
        });
        core.background_executor
            .register_handler(SYNC_WORK_ID, handler)
            .await?;

        let scheduler = SyncScheduler::new(
            core.background_executor.clone(),
            settings.clone(),
            queue.clone(),
            status.clone(),
            upload_lock,
            config.clone(),
        )
        .with_clock(core.clock.clone());

        info!("Sync service ready");
        Ok(Self {
            settings,
            queue,
            scheduler,
            credentials,
            providers,
            status,
            config,
        })
    }

    /// Verify the account, store it and start a first sync against it.
    ///
    /// Connecting always drops pending changes and watermarks left over from
    /// a previous account.
    #[instrument(skip_all)]
    pub async fn connect_gpodnet(&self, credentials: GpodnetCredentials) -> Result<()> {
        let provider = self.providers.gpodnet(&credentials)?;
        self.verify(&provider).await?;
        self.credentials.save_gpodnet(&credentials).await?;
        self.switch_to(ProviderKind::GpodderNet).await
    }

    #[instrument(skip_all)]
    pub async fn connect_nextcloud(&self, credentials: NextcloudCredentials) -> Result<()> {
        let provider = self.providers.nextcloud(&credentials)?;
        self.verify(&provider).await?;
        self.credentials.save_nextcloud(&credentials).await?;
        self.switch_to(ProviderKind::NextcloudGpodder).await
    }

    /// Disconnect, drop pending changes and forget the provider password.
    pub async fn disconnect(&self) -> Result<()> {
        let selected = self.settings.selected_provider().await?;
        self.scheduler.disconnect().await?;
        if let Some(kind) = selected {
            self.credentials.forget_password(kind).await?;
        }
        Ok(())
    }

    async fn verify(&self, provider: &dyn SyncProvider) -> Result<()> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, provider.login()).await {
            Ok(result) => result?,
            Err(_) => return Err(SyncError::Timeout(timeout.as_secs()).into()),
        }
        if let Ok(Err(e)) = tokio::time::timeout(timeout, provider.logout()).await {
            warn!(error = %e, "Logout after credential check failed");
        }
        Ok(())
    }

    async fn switch_to(&self, kind: ProviderKind) -> Result<()> {
        self.scheduler.disconnect().await?;
        self.scheduler.connect(kind).await?;
        self.scheduler.sync_immediately().await?;
        info!(provider = %kind, "Sync provider ready");
        Ok(())
    }

    pub async fn sync(&self) -> Result<bool> {
        Ok(self.scheduler.sync().await?.is_some())
    }

    pub async fn sync_immediately(&self) -> Result<bool> {
        Ok(self.scheduler.sync_immediately().await?.is_some())
    }

    pub async fn full_sync(&self) -> Result<bool> {
        Ok(self.scheduler.full_sync().await?)
    }

    pub async fn enqueue_feed_added(&self, feed_url: &str) -> Result<bool> {
        Ok(self.scheduler.enqueue_feed_added(feed_url).await?)
    }

    pub async fn enqueue_feed_removed(&self, feed_url: &str) -> Result<bool> {
        Ok(self.scheduler.enqueue_feed_removed(feed_url).await?)
    }

    pub async fn enqueue_episode_action(&self, action: EpisodeAction) -> Result<bool> {
        Ok(self.scheduler.enqueue_episode_action(action).await?)
    }

    pub async fn enqueue_episode_played(&self, item: &FeedItem, completed: bool) -> Result<bool> {
        Ok(self.scheduler.enqueue_episode_played(item, completed).await?)
    }

    pub async fn clear_queue(&self) -> Result<()> {
        Ok(self.scheduler.clear_queue().await?)
    }

    pub async fn set_allow_metered_refresh(&self, allow: bool) -> Result<()> {
        Ok(self.settings.set_allow_metered_refresh(allow).await?)
    }

    pub async fn settings_snapshot(&self) -> Result<SyncSettingsSnapshot> {
        Ok(self.settings.snapshot().await?)
    }

    /// Observe pass progress. The latest status is replayed first.
    pub fn subscribe_status(&self) -> StatusStream {
        self.status.subscribe()
    }

    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    pub fn queue(&self) -> &Arc<SynchronizationQueue> {
        &self.queue
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }
}

/// Settings store for desktop hosts, next to the queue database.
#[cfg(feature = "desktop-shims")]
pub async fn open_desktop_settings(database_path: &Path) -> Result<Arc<dyn SettingsStore>> {
    let path = core_runtime::config::settings_path_for(database_path);
    let store = bridge_desktop::SqliteSettingsStore::new(path).await?;
    Ok(Arc::new(store))
}

/// Convenience bootstrapper for desktop hosts.
///
/// Every capability except the library comes from `bridge-desktop`.
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(
    database_path: impl AsRef<Path>,
    library: Arc<dyn PodcastLibrary>,
) -> Result<SyncService> {
    let database_path = database_path.as_ref();
    let settings_store = open_desktop_settings(database_path).await?;
    let core = CoreConfig::builder()
        .database_path(database_path)
        .library(library)
        .settings_store(settings_store)
        .build()?;
    SyncService::new(core).await
}
