//! Stored provider credentials.
//!
//! Account coordinates live in the settings store; passwords live in the
//! secure store and never touch settings.

use bridge_traits::{SecureStore, SettingsStore};
use core_runtime::logging::redact_if_sensitive;
use core_sync::ProviderKind;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};

pub const KEY_GPODNET_HOST: &str = "sync.gpodnet.host";
pub const KEY_GPODNET_USERNAME: &str = "sync.gpodnet.username";
pub const KEY_GPODNET_DEVICE_ID: &str = "sync.gpodnet.device_id";
pub const SECRET_GPODNET_PASSWORD: &str = "sync.gpodnet.password";

pub const KEY_NEXTCLOUD_SERVER: &str = "sync.nextcloud.server_url";
pub const KEY_NEXTCLOUD_USERNAME: &str = "sync.nextcloud.username";
pub const SECRET_NEXTCLOUD_APP_PASSWORD: &str = "sync.nextcloud.app_password";

#[derive(Clone, PartialEq, Eq)]
pub struct GpodnetCredentials {
    /// `None` means the public gpodder.net instance
    pub host: Option<String>,
    pub username: String,
    pub device_id: String,
    pub password: String,
}

impl GpodnetCredentials {
    pub fn new(
        username: impl Into<String>,
        device_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: None,
            username: username.into(),
            device_id: device_id.into(),
            password: password.into(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

impl fmt::Debug for GpodnetCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpodnetCredentials")
            .field("host", &self.host)
            .field("username", &redact_if_sensitive("username", &self.username))
            .field("device_id", &self.device_id)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NextcloudCredentials {
    pub server_url: String,
    pub username: String,
    pub app_password: String,
}

impl NextcloudCredentials {
    pub fn new(
        server_url: impl Into<String>,
        username: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            app_password: app_password.into(),
        }
    }
}

impl fmt::Debug for NextcloudCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextcloudCredentials")
            .field("server_url", &self.server_url)
            .field("username", &redact_if_sensitive("username", &self.username))
            .field("app_password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    settings: Arc<dyn SettingsStore>,
    secrets: Arc<dyn SecureStore>,
}

impl CredentialStore {
    pub fn new(settings: Arc<dyn SettingsStore>, secrets: Arc<dyn SecureStore>) -> Self {
        Self { settings, secrets }
    }

    pub async fn save_gpodnet(&self, credentials: &GpodnetCredentials) -> Result<()> {
        if credentials.username.trim().is_empty() || credentials.device_id.trim().is_empty() {
            return Err(ServiceError::InvalidCredentials(
                "gpodder.net needs a username and a device id".to_string(),
            ));
        }

        let mut tx = self.settings.begin_transaction().await?;
        match &credentials.host {
            Some(host) => tx.set_string(KEY_GPODNET_HOST, host).await?,
            None => tx.delete(KEY_GPODNET_HOST).await?,
        }
        tx.set_string(KEY_GPODNET_USERNAME, &credentials.username).await?;
        tx.set_string(KEY_GPODNET_DEVICE_ID, &credentials.device_id).await?;
        tx.commit().await?;

        self.secrets
            .set_secret(SECRET_GPODNET_PASSWORD, credentials.password.as_bytes())
            .await?;
        info!(
            username = %redact_if_sensitive("username", &credentials.username),
            "Stored gpodder.net credentials"
        );
        Ok(())
    }

    /// `None` unless username, device id and password are all present.
    pub async fn load_gpodnet(&self) -> Result<Option<GpodnetCredentials>> {
        let username = self.settings.get_string(KEY_GPODNET_USERNAME).await?;
        let device_id = self.settings.get_string(KEY_GPODNET_DEVICE_ID).await?;
        let password = self.secrets.get_secret_string(SECRET_GPODNET_PASSWORD).await?;

        let (Some(username), Some(device_id), Some(password)) = (username, device_id, password)
        else {
            debug!("gpodder.net credentials incomplete");
            return Ok(None);
        };

        Ok(Some(GpodnetCredentials {
            host: self.settings.get_string(KEY_GPODNET_HOST).await?,
            username,
            device_id,
            password,
        }))
    }

    pub async fn save_nextcloud(&self, credentials: &NextcloudCredentials) -> Result<()> {
        if credentials.server_url.trim().is_empty() || credentials.username.trim().is_empty() {
            return Err(ServiceError::InvalidCredentials(
                "Nextcloud needs a server URL and a username".to_string(),
            ));
        }

        let mut tx = self.settings.begin_transaction().await?;
        tx.set_string(KEY_NEXTCLOUD_SERVER, &credentials.server_url).await?;
        tx.set_string(KEY_NEXTCLOUD_USERNAME, &credentials.username).await?;
        tx.commit().await?;

        self.secrets
            .set_secret(
                SECRET_NEXTCLOUD_APP_PASSWORD,
                credentials.app_password.as_bytes(),
            )
            .await?;
        info!(server = %credentials.server_url, "Stored Nextcloud credentials");
        Ok(())
    }

    pub async fn load_nextcloud(&self) -> Result<Option<NextcloudCredentials>> {
        let server_url = self.settings.get_string(KEY_NEXTCLOUD_SERVER).await?;
        let username = self.settings.get_string(KEY_NEXTCLOUD_USERNAME).await?;
        let app_password = self
            .secrets
            .get_secret_string(SECRET_NEXTCLOUD_APP_PASSWORD)
            .await?;

        match (server_url, username, app_password) {
            (Some(server_url), Some(username), Some(app_password)) => {
                Ok(Some(NextcloudCredentials {
                    server_url,
                    username,
                    app_password,
                }))
            }
            _ => {
                debug!("Nextcloud credentials incomplete");
                Ok(None)
            }
        }
    }

    /// Forget the password for `kind`. Account coordinates stay so the
    /// user can log in again without retyping them.
    pub async fn forget_password(&self, kind: ProviderKind) -> Result<()> {
        let key = match kind {
            ProviderKind::GpodderNet => SECRET_GPODNET_PASSWORD,
            ProviderKind::NextcloudGpodder => SECRET_NEXTCLOUD_APP_PASSWORD,
        };
        self.secrets.delete_secret(key).await?;
        debug!(provider = %kind, "Forgot provider password");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::SqliteSettingsStore;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySecrets(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl SecureStore for MemorySecrets {
        async fn set_secret(&self, key: &str, value: &[u8]) -> bridge_traits::error::Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> bridge_traits::error::Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> bridge_traits::error::Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    async fn store() -> (CredentialStore, Arc<dyn SettingsStore>) {
        let settings: Arc<dyn SettingsStore> = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let store = CredentialStore::new(settings.clone(), Arc::new(MemorySecrets::default()));
        (store, settings)
    }

    #[tokio::test]
    async fn test_gpodnet_round_trip() {
        let (store, settings) = store().await;
        assert!(store.load_gpodnet().await.unwrap().is_none());

        let credentials =
            GpodnetCredentials::new("alice", "laptop", "secret").with_host("https://gpo.example.org");
        store.save_gpodnet(&credentials).await.unwrap();

        assert_eq!(store.load_gpodnet().await.unwrap(), Some(credentials));
        // The password stays out of settings
        for key in settings.list_keys().await.unwrap() {
            let value = settings.get_string(&key).await.unwrap().unwrap_or_default();
            assert_ne!(value, "secret");
        }
    }

    #[tokio::test]
    async fn test_default_host_is_unset() {
        let (store, _) = store().await;
        store
            .save_gpodnet(&GpodnetCredentials::new("alice", "laptop", "pw").with_host("gpo.example.org"))
            .await
            .unwrap();
        store
            .save_gpodnet(&GpodnetCredentials::new("alice", "laptop", "pw"))
            .await
            .unwrap();

        let loaded = store.load_gpodnet().await.unwrap().unwrap();
        assert_eq!(loaded.host, None);
    }

    #[tokio::test]
    async fn test_rejects_incomplete_credentials() {
        let (store, _) = store().await;
        let err = store
            .save_gpodnet(&GpodnetCredentials::new("alice", "", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials(_)));

        let err = store
            .save_nextcloud(&NextcloudCredentials::new(" ", "alice", "pw"))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_forget_password_keeps_account() {
        let (store, settings) = store().await;
        store
            .save_nextcloud(&NextcloudCredentials::new("https://cloud.example.com", "alice", "app"))
            .await
            .unwrap();
        assert!(store.load_nextcloud().await.unwrap().is_some());

        store
            .forget_password(ProviderKind::NextcloudGpodder)
            .await
            .unwrap();
        assert!(store.load_nextcloud().await.unwrap().is_none());
        assert_eq!(
            settings.get_string(KEY_NEXTCLOUD_USERNAME).await.unwrap(),
            Some("alice".to_string())
        );
    }

    #[test]
    fn test_debug_hides_passwords() {
        let rendered = format!("{:?}", NextcloudCredentials::new("https://c", "bob", "swordfish"));
        assert!(!rendered.contains("swordfish"));
        let rendered = format!("{:?}", GpodnetCredentials::new("bob", "pc", "swordfish"));
        assert!(!rendered.contains("swordfish"));
    }
}
