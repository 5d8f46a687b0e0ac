//! Remote sync provider abstraction.
//!
//! Each backend (gpodder.net, Nextcloud gpoddersync) implements
//! [`SyncProvider`]; the stored [`ProviderKind`] key selects which one a pass
//! talks to.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{EpisodeAction, EpisodeActionChanges, SubscriptionChanges, UploadChangesResponse};

/// Remote sync provider capability set.
///
/// Every call fails with a synchronization-failure [`SyncError`](crate::SyncError)
/// (`Provider`, `Authentication`, `Network`, `Protocol`) carrying a
/// human-readable cause.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn login(&self) -> Result<()>;

    async fn logout(&self) -> Result<()>;

    /// Subscription delta since watermark `since` (0 = everything).
    async fn get_subscription_changes(&self, since: i64) -> Result<SubscriptionChanges>;

    async fn upload_subscription_changes(
        &self,
        added: &[String],
        removed: &[String],
    ) -> Result<UploadChangesResponse>;

    /// Episode actions since watermark `since` (0 = everything).
    async fn get_episode_action_changes(&self, since: i64) -> Result<EpisodeActionChanges>;

    async fn upload_episode_actions(
        &self,
        actions: &[EpisodeAction],
    ) -> Result<UploadChangesResponse>;
}

/// Supported provider backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    GpodderNet,
    NextcloudGpodder,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::GpodderNet, ProviderKind::NextcloudGpodder];

    /// Key persisted in settings.
    pub fn key(&self) -> &'static str {
        match self {
            ProviderKind::GpodderNet => "GPODDER_NET",
            ProviderKind::NextcloudGpodder => "NEXTCLOUD_GPODDER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::GpodderNet => "GPodder.net",
            ProviderKind::NextcloudGpodder => "Nextcloud",
        }
    }

    /// `None` for unknown keys, which mean "no provider selected".
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Builds the provider for a kind from stored credentials.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self, kind: ProviderKind) -> Result<Arc<dyn SyncProvider>>;
}
