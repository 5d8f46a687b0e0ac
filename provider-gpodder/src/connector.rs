//! gpodder.net API connector
//!
//! Implements the `SyncProvider` trait for the gpodder.net API v2.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::logging::redact_if_sensitive;
use core_sync::{
    EpisodeAction, EpisodeActionChanges, ProviderKind, SubscriptionChanges, SyncProvider,
    UploadChangesResponse,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{GpodnetError, Result};
use crate::types::{
    EpisodeActionsResponse, SubscriptionChangesRequest, SubscriptionChangesResponse,
    UploadResponse,
};

/// Public gpodder.net instance
pub const DEFAULT_HOST: &str = "https://gpodder.net";

/// Account and device the provider syncs as.
#[derive(Clone)]
pub struct GpodnetConfig {
    pub host: String,
    pub username: String,
    pub device_id: String,
    pub password: String,
}

impl GpodnetConfig {
    pub fn new(
        username: impl Into<String>,
        device_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            username: username.into(),
            device_id: device_id.into(),
            password: password.into(),
        }
    }

    /// Use a self-hosted instance. A bare host name gets `https://`.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    fn base_url(&self) -> Result<String> {
        let host = self.host.trim();
        let host = if host.is_empty() { DEFAULT_HOST } else { host };
        let candidate = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let parsed = Url::parse(&candidate)
            .map_err(|e| GpodnetError::InvalidConfig(format!("host '{}': {}", host, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GpodnetError::InvalidConfig(format!(
                "host '{}' must use http or https",
                host
            )));
        }
        Ok(parsed.as_str().trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for GpodnetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpodnetConfig")
            .field("host", &self.host)
            .field("username", &redact_if_sensitive("username", &self.username))
            .field("device_id", &self.device_id)
            .field("password", &redact_if_sensitive("password", &self.password))
            .finish()
    }
}

/// gpodder.net connector
///
/// # Example
///
/// ```ignore
/// use provider_gpodder::{GpodnetConfig, GpodnetProvider};
/// use core_sync::SyncProvider;
///
/// let provider = GpodnetProvider::new(http_client, GpodnetConfig::new("alice", "laptop", pw))?;
/// provider.login().await?;
/// let actions = provider.get_episode_action_changes(0).await?;
/// ```
pub struct GpodnetProvider {
    http_client: Arc<dyn HttpClient>,
    config: GpodnetConfig,
    base_url: String,
}

impl GpodnetProvider {
    /// Fails when the host does not parse or the username or device id is
    /// empty.
    pub fn new(http_client: Arc<dyn HttpClient>, config: GpodnetConfig) -> Result<Self> {
        if config.username.trim().is_empty() {
            return Err(GpodnetError::InvalidConfig("username is empty".to_string()));
        }
        if config.device_id.trim().is_empty() {
            return Err(GpodnetError::InvalidConfig("device id is empty".to_string()));
        }
        let base_url = config.base_url()?;

        Ok(Self {
            http_client,
            config,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn user_segment(&self) -> String {
        urlencoding::encode(self.config.username.trim()).into_owned()
    }

    fn auth_url(&self, action: &str) -> String {
        format!("{}/api/2/auth/{}/{}.json", self.base_url, self.user_segment(), action)
    }

    fn subscriptions_url(&self) -> String {
        format!(
            "{}/api/2/subscriptions/{}/{}.json",
            self.base_url,
            self.user_segment(),
            urlencoding::encode(self.config.device_id.trim())
        )
    }

    fn episodes_url(&self) -> String {
        format!("{}/api/2/episodes/{}.json", self.base_url, self.user_segment())
    }

    /// Authenticate, send, and turn non-2xx answers into errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request
            .basic_auth(self.config.username.trim(), &self.config.password)
            .header("Accept", "application/json");

        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let body = String::from_utf8_lossy(&response.body);
        Err(GpodnetError::from_status(response.status, &body))
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| GpodnetError::ParseError(format!("Failed to parse {}: {}", what, e)))
    }

    #[instrument(skip(self))]
    async fn fetch_subscriptions(&self, since: i64) -> Result<SubscriptionChanges> {
        let url = format!("{}?since={}", self.subscriptions_url(), since);
        let response = self.send(HttpRequest::get(url)).await?;
        let changes: SubscriptionChangesResponse = Self::decode(&response, "subscription changes")?;

        debug!(
            added = changes.add.len(),
            removed = changes.remove.len(),
            timestamp = changes.timestamp,
            "Fetched subscription changes"
        );
        Ok(changes.into())
    }

    #[instrument(skip(self, added, removed), fields(added = added.len(), removed = removed.len()))]
    async fn push_subscriptions(
        &self,
        added: &[String],
        removed: &[String],
    ) -> Result<UploadChangesResponse> {
        let body = SubscriptionChangesRequest {
            add: added,
            remove: removed,
        };
        let request = HttpRequest::post(self.subscriptions_url()).json(&body)?;
        let response = self.send(request).await?;
        let upload: UploadResponse = Self::decode(&response, "subscription upload response")?;

        info!(timestamp = upload.timestamp, "Uploaded subscription changes");
        Ok(upload.into())
    }

    #[instrument(skip(self))]
    async fn fetch_episode_actions(&self, since: i64) -> Result<EpisodeActionChanges> {
        let url = format!("{}?since={}", self.episodes_url(), since);
        let response = self.send(HttpRequest::get(url)).await?;
        let changes: EpisodeActionsResponse = Self::decode(&response, "episode actions")?;

        let changes = EpisodeActionChanges::from(changes);
        debug!(
            count = changes.actions.len(),
            timestamp = changes.timestamp,
            "Fetched episode actions"
        );
        Ok(changes)
    }

    #[instrument(skip(self, actions), fields(count = actions.len()))]
    async fn push_episode_actions(&self, actions: &[EpisodeAction]) -> Result<UploadChangesResponse> {
        let request = HttpRequest::post(self.episodes_url()).json(&actions)?;
        let response = self.send(request).await?;
        let upload: UploadResponse = Self::decode(&response, "episode upload response")?;

        info!(timestamp = upload.timestamp, "Uploaded episode actions");
        Ok(upload.into())
    }
}

#[async_trait]
impl SyncProvider for GpodnetProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GpodderNet
    }

    #[instrument(skip(self), fields(host = %self.base_url))]
    async fn login(&self) -> core_sync::Result<()> {
        self.send(HttpRequest::post(self.auth_url("login"))).await?;
        debug!(
            username = %redact_if_sensitive("username", &self.config.username),
            "Logged in"
        );
        Ok(())
    }

    async fn logout(&self) -> core_sync::Result<()> {
        self.send(HttpRequest::post(self.auth_url("logout"))).await?;
        debug!("Logged out");
        Ok(())
    }

    async fn get_subscription_changes(&self, since: i64) -> core_sync::Result<SubscriptionChanges> {
        Ok(self.fetch_subscriptions(since).await?)
    }

    async fn upload_subscription_changes(
        &self,
        added: &[String],
        removed: &[String],
    ) -> core_sync::Result<UploadChangesResponse> {
        Ok(self.push_subscriptions(added, removed).await?)
    }

    async fn get_episode_action_changes(&self, since: i64) -> core_sync::Result<EpisodeActionChanges> {
        Ok(self.fetch_episode_actions(since).await?)
    }

    async fn upload_episode_actions(
        &self,
        actions: &[EpisodeAction],
    ) -> core_sync::Result<UploadChangesResponse> {
        Ok(self.push_episode_actions(actions).await?)
    }
}
