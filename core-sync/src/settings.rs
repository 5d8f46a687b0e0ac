//! Synchronization settings.
//!
//! Typed accessors over the host [`SettingsStore`] for the provider
//! selection, the two watermarks and last-attempt metadata.

use bridge_traits::storage::SettingsStore;
use bridge_traits::time::Clock;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::provider::ProviderKind;

pub const KEY_SELECTED_PROVIDER: &str = "sync.selected_provider";
pub const KEY_PROVIDER_CONNECTED: &str = "sync.provider_connected";
pub const KEY_LAST_SUBSCRIPTION_SYNC: &str = "sync.last_subscription_sync_timestamp";
pub const KEY_LAST_EPISODE_ACTION_SYNC: &str = "sync.last_episode_action_sync_timestamp";
pub const KEY_LAST_SYNC_ATTEMPT: &str = "sync.last_sync_attempt_timestamp";
pub const KEY_LAST_SYNC_ATTEMPT_SUCCESS: &str = "sync.last_sync_attempt_success";
pub const KEY_ALLOW_METERED_REFRESH: &str = "sync.allow_metered_refresh";

/// Full record of the persisted sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettingsSnapshot {
    pub selected_provider: Option<ProviderKind>,
    pub provider_connected: bool,
    pub last_subscription_sync: i64,
    pub last_episode_action_sync: i64,
    pub last_sync_attempt: Option<DateTime<Utc>>,
    pub last_sync_successful: bool,
    pub allow_metered_refresh: bool,
}

pub struct SynchronizationSettings {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
}

impl SynchronizationSettings {
    pub fn new(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    /// `None` when unset or when the stored key is not a known provider.
    pub async fn selected_provider(&self) -> Result<Option<ProviderKind>> {
        let key = self
            .store
            .get_string(KEY_SELECTED_PROVIDER)
            .await
            .map_err(settings_error)?;
        Ok(key.as_deref().and_then(ProviderKind::from_key))
    }

    pub async fn is_provider_connected(&self) -> Result<bool> {
        self.get_bool(KEY_PROVIDER_CONNECTED, false).await
    }

    /// A pass or an enqueue only does work when this holds.
    pub async fn has_active_provider(&self) -> Result<bool> {
        Ok(self.selected_provider().await?.is_some() && self.is_provider_connected().await?)
    }

    pub async fn select_provider(&self, kind: Option<ProviderKind>) -> Result<()> {
        match kind {
            Some(kind) => self
                .store
                .set_string(KEY_SELECTED_PROVIDER, kind.key())
                .await
                .map_err(settings_error)?,
            None => self
                .store
                .delete(KEY_SELECTED_PROVIDER)
                .await
                .map_err(settings_error)?,
        }
        debug!(provider = ?kind, "Selected sync provider");
        Ok(())
    }

    /// Select `kind` and mark it connected in one transaction.
    pub async fn connect(&self, kind: ProviderKind) -> Result<()> {
        let mut tx = self.store.begin_transaction().await.map_err(settings_error)?;
        tx.set_string(KEY_SELECTED_PROVIDER, kind.key())
            .await
            .map_err(settings_error)?;
        tx.set_bool(KEY_PROVIDER_CONNECTED, true)
            .await
            .map_err(settings_error)?;
        tx.commit().await.map_err(settings_error)?;

        info!(provider = %kind, "Sync provider connected");
        Ok(())
    }

    /// Clears the connected flag and keeps the selection.
    pub async fn disconnect(&self) -> Result<()> {
        self.store
            .set_bool(KEY_PROVIDER_CONNECTED, false)
            .await
            .map_err(settings_error)?;
        info!("Sync provider disconnected");
        Ok(())
    }

    pub async fn last_subscription_sync_timestamp(&self) -> Result<i64> {
        self.get_i64(KEY_LAST_SUBSCRIPTION_SYNC).await
    }

    pub async fn set_last_subscription_sync_timestamp(&self, timestamp: i64) -> Result<()> {
        self.set_i64(KEY_LAST_SUBSCRIPTION_SYNC, timestamp).await
    }

    pub async fn last_episode_action_sync_timestamp(&self) -> Result<i64> {
        self.get_i64(KEY_LAST_EPISODE_ACTION_SYNC).await
    }

    pub async fn set_last_episode_action_sync_timestamp(&self, timestamp: i64) -> Result<()> {
        self.set_i64(KEY_LAST_EPISODE_ACTION_SYNC, timestamp).await
    }

    /// Stamp the current time as the last attempt.
    pub async fn update_last_sync_attempt(&self) -> Result<()> {
        self.set_i64(KEY_LAST_SYNC_ATTEMPT, self.clock.unix_timestamp())
            .await
    }

    pub async fn last_sync_attempt(&self) -> Result<Option<DateTime<Utc>>> {
        let seconds = self.get_i64(KEY_LAST_SYNC_ATTEMPT).await?;
        if seconds <= 0 {
            return Ok(None);
        }
        Ok(Utc.timestamp_opt(seconds, 0).single())
    }

    pub async fn set_last_sync_attempt_success(&self, success: bool) -> Result<()> {
        self.store
            .set_bool(KEY_LAST_SYNC_ATTEMPT_SUCCESS, success)
            .await
            .map_err(settings_error)
    }

    pub async fn is_last_sync_successful(&self) -> Result<bool> {
        self.get_bool(KEY_LAST_SYNC_ATTEMPT_SUCCESS, false).await
    }

    /// Zero both watermarks and the last attempt so the next pass is a
    /// first sync.
    pub async fn reset_timestamps(&self) -> Result<()> {
        let mut tx = self.store.begin_transaction().await.map_err(settings_error)?;
        for key in [
            KEY_LAST_SUBSCRIPTION_SYNC,
            KEY_LAST_EPISODE_ACTION_SYNC,
            KEY_LAST_SYNC_ATTEMPT,
        ] {
            tx.set_i64(key, 0).await.map_err(settings_error)?;
        }
        tx.commit().await.map_err(settings_error)?;

        info!("Sync watermarks reset");
        Ok(())
    }

    pub async fn allow_metered_refresh(&self) -> Result<bool> {
        self.get_bool(KEY_ALLOW_METERED_REFRESH, false).await
    }

    pub async fn set_allow_metered_refresh(&self, allow: bool) -> Result<()> {
        self.store
            .set_bool(KEY_ALLOW_METERED_REFRESH, allow)
            .await
            .map_err(settings_error)
    }

    pub async fn snapshot(&self) -> Result<SyncSettingsSnapshot> {
        Ok(SyncSettingsSnapshot {
            selected_provider: self.selected_provider().await?,
            provider_connected: self.is_provider_connected().await?,
            last_subscription_sync: self.last_subscription_sync_timestamp().await?,
            last_episode_action_sync: self.last_episode_action_sync_timestamp().await?,
            last_sync_attempt: self.last_sync_attempt().await?,
            last_sync_successful: self.is_last_sync_successful().await?,
            allow_metered_refresh: self.allow_metered_refresh().await?,
        })
    }

    async fn get_i64(&self, key: &str) -> Result<i64> {
        Ok(self
            .store
            .get_i64(key)
            .await
            .map_err(settings_error)?
            .unwrap_or(0))
    }

    async fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.store.set_i64(key, value).await.map_err(settings_error)
    }

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .store
            .get_bool(key)
            .await
            .map_err(settings_error)?
            .unwrap_or(default))
    }
}

fn settings_error(error: bridge_traits::BridgeError) -> SyncError {
    SyncError::Settings(error.to_string())
}
