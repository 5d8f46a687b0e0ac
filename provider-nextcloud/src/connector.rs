//! Nextcloud gpoddersync connector

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_runtime::logging::{redact_if_sensitive, redact_url};
use core_sync::{
    EpisodeAction, EpisodeActionChanges, ProviderKind, SubscriptionChanges, SyncProvider,
    UploadChangesResponse,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use crate::error::{NextcloudError, Result};
use crate::types::{
    CreateResponse, EpisodeActionsResponse, SubscriptionChangeRequest, SubscriptionsResponse,
};

const APP_PATH: &str = "index.php/apps/gpoddersync";

#[derive(Clone)]
pub struct NextcloudConfig {
    /// Nextcloud root, possibly below a path prefix
    pub server_url: String,
    pub username: String,
    pub app_password: String,
}

impl NextcloudConfig {
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

    /// App root URL. Bare host names get `https://`.
    fn app_url(&self) -> Result<String> {
        let raw = self.server_url.trim();
        if raw.is_empty() {
            return Err(NextcloudError::InvalidConfig("server URL is empty".to_string()));
        }
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let parsed = Url::parse(&candidate)
            .map_err(|e| NextcloudError::InvalidConfig(format!("server URL '{}': {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NextcloudError::InvalidConfig(format!(
                "server URL '{}' must use http or https",
                raw
            )));
        }

        let mut root = parsed;
        root.set_query(None);
        root.set_fragment(None);
        Ok(format!("{}/{}", root.as_str().trim_end_matches('/'), APP_PATH))
    }
}

impl fmt::Debug for NextcloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextcloudConfig")
            .field("server_url", &redact_url(&self.server_url))
            .field("username", &redact_if_sensitive("username", &self.username))
            .field(
                "app_password",
                &redact_if_sensitive("app_password", &self.app_password),
            )
            .finish()
    }
}

pub struct NextcloudProvider {
    http_client: Arc<dyn HttpClient>,
    config: NextcloudConfig,
    app_url: String,
}

impl NextcloudProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, config: NextcloudConfig) -> Result<Self> {
        if config.username.trim().is_empty() {
            return Err(NextcloudError::InvalidConfig("username is empty".to_string()));
        }
        let app_url = config.app_url()?;

        Ok(Self {
            http_client,
            config,
            app_url,
        })
    }

    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/{}", self.app_url, route)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let request = request
            .basic_auth(self.config.username.trim(), &self.config.app_password)
            .header("Accept", "application/json")
            .header("OCS-APIRequest", "true");

        let response = self.http_client.execute(request).await?;
        if response.is_success() {
            return Ok(response);
        }

        let body = String::from_utf8_lossy(&response.body);
        Err(NextcloudError::from_status(
            response.status,
            &redact_url(&url),
            &body,
        ))
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| NextcloudError::ParseError(format!("Failed to parse {}: {}", what, e)))
    }

    #[instrument(skip(self))]
    async fn fetch_subscriptions(&self, since: i64) -> Result<SubscriptionChanges> {
        let url = format!("{}?since={}", self.endpoint("subscriptions"), since);
        let response = self.send(HttpRequest::get(url)).await?;
        let changes: SubscriptionsResponse = Self::decode(&response, "subscriptions")?;

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
        let body = SubscriptionChangeRequest {
            add: added,
            remove: removed,
        };
        let request = HttpRequest::post(self.endpoint("subscription_change/create")).json(&body)?;
        let response = self.send(request).await?;
        let created: CreateResponse = Self::decode(&response, "subscription change response")?;

        info!(timestamp = created.timestamp, "Uploaded subscription changes");
        Ok(created.into())
    }

    #[instrument(skip(self))]
    async fn fetch_episode_actions(&self, since: i64) -> Result<EpisodeActionChanges> {
        let url = format!("{}?since={}", self.endpoint("episode_action"), since);
        let response = self.send(HttpRequest::get(url)).await?;
        let changes: EpisodeActionsResponse = Self::decode(&response, "episode actions")?;

        let changes = EpisodeActionChanges::from(changes);
        debug!(count = changes.actions.len(), timestamp = changes.timestamp, "Fetched episode actions");
        Ok(changes)
    }

    #[instrument(skip(self, actions), fields(count = actions.len()))]
    async fn push_episode_actions(&self, actions: &[EpisodeAction]) -> Result<UploadChangesResponse> {
        let request = HttpRequest::post(self.endpoint("episode_action/create")).json(&actions)?;
        let response = self.send(request).await?;
        let created: CreateResponse = Self::decode(&response, "episode action response")?;

        info!(timestamp = created.timestamp, "Uploaded episode actions");
        Ok(created.into())
    }
}

#[async_trait]
impl SyncProvider for NextcloudProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::NextcloudGpodder
    }

    /// There is no session; check that the app answers an authenticated
    /// request with JSON.
    #[instrument(skip(self), fields(server = %redact_url(&self.config.server_url)))]
    async fn login(&self) -> core_sync::Result<()> {
        let url = format!("{}?since={}", self.endpoint("subscriptions"), 0);
        let response = self.send(HttpRequest::get(url)).await?;
        let _: SubscriptionsResponse = Self::decode(&response, "subscriptions")?;
        debug!("Nextcloud credentials accepted");
        Ok(())
    }

    async fn logout(&self) -> core_sync::Result<()> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::HttpMethod;
    use bridge_traits::BridgeError;
    use bytes::Bytes;
    use core_sync::{EpisodeActionKind, SyncError};
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> bridge_traits::error::Result<HttpResponse>;
            async fn is_connected(&self) -> bool;
        }
    }

    fn response(status: u16, body: &str) -> bridge_traits::error::Result<HttpResponse> {
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        })
    }

    fn provider(mock_http: MockHttpClient) -> NextcloudProvider {
        NextcloudProvider::new(
            Arc::new(mock_http),
            NextcloudConfig::new("https://cloud.example.com/", "alice", "app-pass"),
        )
        .unwrap()
    }

    #[test]
    fn test_app_url() {
        let http: Arc<dyn HttpClient> = Arc::new(MockHttpClient::new());

        let bare = NextcloudProvider::new(
            http.clone(),
            NextcloudConfig::new("cloud.example.com", "alice", "pw"),
        )
        .unwrap();
        assert_eq!(
            bare.app_url(),
            "https://cloud.example.com/index.php/apps/gpoddersync"
        );

        let prefixed = NextcloudProvider::new(
            http.clone(),
            NextcloudConfig::new("http://home.lan/nextcloud/", "alice", "pw"),
        )
        .unwrap();
        assert_eq!(
            prefixed.app_url(),
            "http://home.lan/nextcloud/index.php/apps/gpoddersync"
        );

        assert!(matches!(
            NextcloudProvider::new(http.clone(), NextcloudConfig::new("", "alice", "pw")),
            Err(NextcloudError::InvalidConfig(_))
        ));
        assert!(matches!(
            NextcloudProvider::new(http, NextcloudConfig::new("cloud.example.com", "", "pw")),
            Err(NextcloudError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_redacts_app_password() {
        let rendered = format!(
            "{:?}",
            NextcloudConfig::new("https://cloud.example.com", "alice", "s3cr3t")
        );
        assert!(!rendered.contains("s3cr3t"));
    }

    #[tokio::test]
    async fn test_login_checks_authenticated_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Get);
            assert_eq!(
                req.url,
                "https://cloud.example.com/index.php/apps/gpoddersync/subscriptions?since=0"
            );
            assert!(req.headers.contains_key("Authorization"));
            response(200, r#"{"add": [], "remove": [], "timestamp": 1}"#)
        });

        provider(mock_http).login().await.unwrap();
    }

    #[tokio::test]
    async fn test_login_html_answer_is_protocol_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(200, "<!DOCTYPE html><html>Login</html>"));

        let err = provider(mock_http).login().await.unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_logout_is_local() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(0);

        provider(mock_http).logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_subscription_changes() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert_eq!(req.method, HttpMethod::Post);
            assert_eq!(
                req.url,
                "https://cloud.example.com/index.php/apps/gpoddersync/subscription_change/create"
            );
            let body: serde_json::Value =
                serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
            assert_eq!(body["remove"][0], "https://old.example/feed");
            response(200, r#"{"timestamp": 1700000100}"#)
        });

        let upload = provider(mock_http)
            .upload_subscription_changes(&[], &["https://old.example/feed".to_string()])
            .await
            .unwrap();
        assert_eq!(upload.timestamp, 1_700_000_100);
    }

    #[tokio::test]
    async fn test_episode_action_round_trip_routes() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert!(req.url.ends_with("/episode_action?since=42"));
                response(
                    200,
                    r#"{"actions": [{"podcast": "p", "episode": "e", "action": "new"}], "timestamp": 50}"#,
                )
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert!(req.url.ends_with("/episode_action/create"));
                response(200, r#"{"timestamp": 51}"#)
            });

        let provider = provider(mock_http);
        let changes = provider.get_episode_action_changes(42).await.unwrap();
        assert_eq!(changes.actions[0].action, EpisodeActionKind::New);

        let upload = provider
            .upload_episode_actions(&changes.actions)
            .await
            .unwrap();
        assert_eq!(upload.timestamp, 51);
    }

    #[tokio::test]
    async fn test_missing_app_is_provider_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(404, "Not Found"));

        let err = provider(mock_http).get_subscription_changes(0).await.unwrap_err();
        assert!(matches!(err, SyncError::Provider(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_is_authentication_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| response(401, ""));

        let err = provider(mock_http).get_episode_action_changes(0).await.unwrap_err();
        assert!(matches!(err, SyncError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_network_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Network("no route to host".to_string())));

        let err = provider(mock_http).get_subscription_changes(0).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }
}
