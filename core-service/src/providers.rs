//! Builds providers for the stored selection.

use async_trait::async_trait;
use bridge_traits::HttpClient;
use core_sync::{ProviderFactory, ProviderKind, SyncError, SyncProvider};
use provider_gpodder::{GpodnetConfig, GpodnetProvider};
use provider_nextcloud::{NextcloudConfig, NextcloudProvider};
use std::sync::Arc;
use tracing::debug;

use crate::credentials::{CredentialStore, GpodnetCredentials, NextcloudCredentials};

/// Resolves a [`ProviderKind`] against the credential store.
pub struct DefaultProviderFactory {
    http_client: Arc<dyn HttpClient>,
    credentials: CredentialStore,
}

impl DefaultProviderFactory {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: CredentialStore) -> Self {
        Self {
            http_client,
            credentials,
        }
    }

    pub fn gpodnet(&self, credentials: &GpodnetCredentials) -> core_sync::Result<GpodnetProvider> {
        let mut config = GpodnetConfig::new(
            credentials.username.clone(),
            credentials.device_id.clone(),
            credentials.password.clone(),
        );
        if let Some(host) = &credentials.host {
            config = config.with_host(host.clone());
        }
        Ok(GpodnetProvider::new(self.http_client.clone(), config)?)
    }

    pub fn nextcloud(
        &self,
        credentials: &NextcloudCredentials,
    ) -> core_sync::Result<NextcloudProvider> {
        let config = NextcloudConfig::new(
            credentials.server_url.clone(),
            credentials.username.clone(),
            credentials.app_password.clone(),
        );
        Ok(NextcloudProvider::new(self.http_client.clone(), config)?)
    }
}

fn missing_credentials(kind: ProviderKind) -> SyncError {
    SyncError::Authentication(format!("No stored credentials for {}", kind))
}

fn credential_error(error: crate::ServiceError) -> SyncError {
    SyncError::Settings(error.to_string())
}

#[async_trait]
impl ProviderFactory for DefaultProviderFactory {
    async fn create(&self, kind: ProviderKind) -> core_sync::Result<Arc<dyn SyncProvider>> {
        debug!(provider = %kind, "Building sync provider");
        match kind {
            ProviderKind::GpodderNet => {
                let credentials = self
                    .credentials
                    .load_gpodnet()
                    .await
                    .map_err(credential_error)?
                    .ok_or_else(|| missing_credentials(kind))?;
                Ok(Arc::new(self.gpodnet(&credentials)?))
            }
            ProviderKind::NextcloudGpodder => {
                let credentials = self
                    .credentials
                    .load_nextcloud()
                    .await
                    .map_err(credential_error)?
                    .ok_or_else(|| missing_credentials(kind))?;
                Ok(Arc::new(self.nextcloud(&credentials)?))
            }
        }
    }
}
