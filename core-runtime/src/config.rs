//! # Core Configuration Module
//!
//! Collects the host capabilities the sync engine runs on.
//!
//! ## Overview
//!
//! [`CoreConfig`] is assembled with a builder that fails fast when a
//! required capability is missing, so a misconfigured host finds out at
//! startup rather than on the first sync pass.
//!
//! ## Required Dependencies
//!
//! - `PodcastLibrary` - Local subscriptions and episode state (always host-provided)
//! - `SettingsStore` - Selected provider, watermarks, last attempt
//! - `SecureStore` - Provider passwords
//! - `HttpClient` - Provider requests
//! - `BackgroundExecutor` - Unique deferred sync work
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Constraint checks for the background executor
//! - `NotificationSink` - Sustained-failure notification
//! - `Clock` - Defaults to the system clock
//!
//! With the `desktop-shims` feature, desktop defaults from `bridge-desktop`
//! are injected for the secure store, HTTP client, executor and notifications.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/podsync.db")
//!     .library(Arc::new(MyLibrary))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    BackgroundExecutor, Clock, HttpClient, NetworkMonitor, NotificationSink, PodcastLibrary,
    SecureStore, SettingsStore, SystemClock,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host capabilities and paths for the sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite database holding the synchronization queue
    pub database_path: PathBuf,

    pub library: Arc<dyn PodcastLibrary>,

    pub settings_store: Arc<dyn SettingsStore>,

    pub secure_store: Arc<dyn SecureStore>,

    pub http_client: Arc<dyn HttpClient>,

    pub background_executor: Arc<dyn BackgroundExecutor>,

    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub notification_sink: Option<Arc<dyn NotificationSink>>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("library", &"PodcastLibrary { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("secure_store", &"SecureStore { ... }")
            .field("http_client", &"HttpClient { ... }")
            .field("background_executor", &"BackgroundExecutor { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field(
                "notification_sink",
                &self
                    .notification_sink
                    .as_ref()
                    .map(|_| "NotificationSink { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates paths that the builder cannot check by type alone.
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Conventional settings database location next to the queue database.
    pub fn settings_path(&self) -> PathBuf {
        settings_path_for(&self.database_path)
    }
}

/// Settings database that sits next to `database_path`.
pub fn settings_path_for(database_path: &Path) -> PathBuf {
    database_path
        .parent()
        .map(|parent| parent.join("settings.db"))
        .unwrap_or_else(|| PathBuf::from("settings.db"))
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

fn library_missing_error() -> Error {
    capability_missing(
        "PodcastLibrary",
        "PodcastLibrary implementation is required; the host owns subscriptions and episode state. \
         Inject it with .library().",
    )
}

// Opening SQLite is async, so there is no synchronous desktop default here.
fn settings_store_missing_error() -> Error {
    capability_missing(
        "SettingsStore",
        "SettingsStore implementation is required for sync state. \
         Desktop: open bridge_desktop::SqliteSettingsStore at CoreConfig::settings_path(). \
         Mobile: inject platform-native settings (UserDefaults/DataStore).",
    )
}

#[cfg(not(feature = "desktop-shims"))]
mod defaults {
    use super::*;

    pub fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Err(capability_missing(
            "SecureStore",
            "SecureStore implementation is required for provider passwords. \
             Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
             Mobile: inject platform-native secure storage (Keychain/Keystore).",
        ))
    }

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Err(capability_missing(
            "HttpClient",
            "HttpClient implementation is required to reach sync providers. \
             Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient.",
        ))
    }

    pub fn background_executor(
        _network_monitor: Option<Arc<dyn NetworkMonitor>>,
    ) -> Result<Arc<dyn BackgroundExecutor>> {
        Err(capability_missing(
            "BackgroundExecutor",
            "BackgroundExecutor implementation is required to schedule sync work. \
             Desktop: enable the 'desktop-shims' feature to use the default TokioBackgroundExecutor. \
             Android: wrap WorkManager unique work.",
        ))
    }

    pub fn notification_sink() -> Option<Arc<dyn NotificationSink>> {
        None
    }
}

#[cfg(feature = "desktop-shims")]
mod defaults {
    use super::*;
    use bridge_desktop::{
        KeyringSecureStore, LogNotificationSink, ReqwestHttpClient, TokioBackgroundExecutor,
    };

    pub fn secure_store() -> Result<Arc<dyn SecureStore>> {
        Ok(Arc::new(KeyringSecureStore::new()))
    }

    pub fn http_client() -> Result<Arc<dyn HttpClient>> {
        Ok(Arc::new(ReqwestHttpClient::new()?))
    }

    pub fn background_executor(
        network_monitor: Option<Arc<dyn NetworkMonitor>>,
    ) -> Result<Arc<dyn BackgroundExecutor>> {
        Ok(Arc::new(TokioBackgroundExecutor::with_network_monitor(
            network_monitor,
        )))
    }

    pub fn notification_sink() -> Option<Arc<dyn NotificationSink>> {
        Some(Arc::new(LogNotificationSink::new()))
    }
}

/// Builder for [`CoreConfig`].
///
/// Call [`build()`](CoreConfigBuilder::build) once every required
/// capability is set; errors name the missing capability and how to provide it.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    library: Option<Arc<dyn PodcastLibrary>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    http_client: Option<Arc<dyn HttpClient>>,
    background_executor: Option<Arc<dyn BackgroundExecutor>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Sets the path of the queue database.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().database_path("/path/to/podsync.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn library(mut self, library: Arc<dyn PodcastLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    /// Sets the secure store used for provider passwords.
    ///
    /// Must provide platform-appropriate protection (Keychain, Keystore,
    /// Secret Service).
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn background_executor(mut self, executor: Arc<dyn BackgroundExecutor>) -> Self {
        self.background_executor = Some(executor);
        self
    }

    /// Sets the network monitor.
    ///
    /// The desktop default executor uses it to hold work until the
    /// requested network constraint is met.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the database path is missing or empty
    /// - [`Error::CapabilityMissing`] when a required capability has no
    ///   injected implementation and no platform default
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let library = self.library.ok_or_else(library_missing_error)?;

        let settings_store = self.settings_store.ok_or_else(settings_store_missing_error)?;

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => defaults::secure_store()?,
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => defaults::http_client()?,
        };

        let background_executor = match self.background_executor {
            Some(executor) => executor,
            None => defaults::background_executor(self.network_monitor.clone())?,
        };

        let config = CoreConfig {
            database_path,
            library,
            settings_store,
            secure_store,
            http_client,
            background_executor,
            network_monitor: self.network_monitor,
            notification_sink: self.notification_sink.or_else(defaults::notification_sink),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::background::{
        ExistingWorkPolicy, TaskId, TaskStatus, WorkHandler, WorkRequest,
    };
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::library::FeedItem;
    use bridge_traits::storage::SettingsTransaction;

    struct StubLibrary;

    #[async_trait]
    impl PodcastLibrary for StubLibrary {
        async fn subscription_urls(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn subscribe(&self, _feed_url: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn unsubscribe(&self, _feed_url: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn played_items(&self) -> BridgeResult<Vec<FeedItem>> {
            Ok(Vec::new())
        }

        async fn find_item(
            &self,
            _guid: Option<&str>,
            _episode_url: &str,
        ) -> BridgeResult<Option<FeedItem>> {
            Ok(None)
        }

        async fn update_items(&self, _items: &[FeedItem]) -> BridgeResult<()> {
            Ok(())
        }

        async fn remove_from_play_queue(&self, _item_ids: &[i64]) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct StubSecureStore;

    #[async_trait]
    impl SecureStore for StubSecureStore {
        async fn set_secret(&self, _key: &str, _value: &[u8]) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_secret(&self, _key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn delete_secret(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct StubSettingsStore;

    #[async_trait]
    impl SettingsStore for StubSettingsStore {
        async fn set_string(&self, _key: &str, _value: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_string(&self, _key: &str) -> BridgeResult<Option<String>> {
            Ok(None)
        }

        async fn set_bool(&self, _key: &str, _value: bool) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_bool(&self, _key: &str) -> BridgeResult<Option<bool>> {
            Ok(None)
        }

        async fn set_i64(&self, _key: &str, _value: i64) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_i64(&self, _key: &str) -> BridgeResult<Option<i64>> {
            Ok(None)
        }

        async fn delete(&self, _key: &str) -> BridgeResult<()> {
            Ok(())
        }

        async fn has_key(&self, _key: &str) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn begin_transaction(&self) -> BridgeResult<Box<dyn SettingsTransaction + Send>> {
            Err(bridge_traits::BridgeError::NotAvailable(
                "transactions".to_string(),
            ))
        }
    }

    struct StubHttpClient;

    #[async_trait]
    impl HttpClient for StubHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable("http".to_string()))
        }
    }

    struct StubExecutor;

    #[async_trait]
    impl BackgroundExecutor for StubExecutor {
        async fn register_handler(&self, _work_id: &str, _handler: WorkHandler) -> BridgeResult<()> {
            Ok(())
        }

        async fn enqueue_unique_work(
            &self,
            request: WorkRequest,
            _policy: ExistingWorkPolicy,
        ) -> BridgeResult<TaskId> {
            Ok(TaskId(request.work_id))
        }

        async fn cancel_task(&self, _task_id: &TaskId) -> BridgeResult<()> {
            Ok(())
        }

        async fn get_task_status(&self, _task_id: &TaskId) -> BridgeResult<TaskStatus> {
            Ok(TaskStatus::Scheduled)
        }
    }

    fn complete_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .database_path("/tmp/podsync-test/podsync.db")
            .library(Arc::new(StubLibrary))
            .settings_store(Arc::new(StubSettingsStore))
            .secure_store(Arc::new(StubSecureStore))
            .http_client(Arc::new(StubHttpClient))
            .background_executor(Arc::new(StubExecutor))
    }

    #[test]
    fn test_builder_with_all_required_fields() {
        let config = complete_builder().build().unwrap();

        assert_eq!(
            config.database_path,
            PathBuf::from("/tmp/podsync-test/podsync.db")
        );
        assert!(config.network_monitor.is_none());
        assert_eq!(
            config.settings_path(),
            PathBuf::from("/tmp/podsync-test/settings.db")
        );
    }

    #[test]
    fn test_builder_requires_database_path() {
        let result = CoreConfig::builder()
            .library(Arc::new(StubLibrary))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("Database path is required")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_requires_library() {
        let result = CoreConfig::builder()
            .database_path("/tmp/podsync.db")
            .build();

        match result {
            Err(e) => assert_eq!(e.missing_capability(), Some("PodcastLibrary")),
            Ok(_) => panic!("expected missing library"),
        }
    }

    #[test]
    fn test_validate_rejects_empty_database_path() {
        let result = complete_builder().database_path("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_executor_without_shims() {
        let result = CoreConfig::builder()
            .database_path("/tmp/podsync.db")
            .library(Arc::new(StubLibrary))
            .settings_store(Arc::new(StubSettingsStore))
            .secure_store(Arc::new(StubSecureStore))
            .http_client(Arc::new(StubHttpClient))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "BackgroundExecutor");
                assert!(message.contains("desktop-shims"));
            }
            other => panic!("expected missing executor, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_requires_settings_store() {
        let result = CoreConfig::builder()
            .database_path("/tmp/podsync.db")
            .library(Arc::new(StubLibrary))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "SettingsStore");
                assert!(message.contains("settings_path"));
            }
            other => panic!("expected missing settings store, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder()
            .database_path("/tmp/podsync-test/podsync.db")
            .library(Arc::new(StubLibrary))
            .settings_store(Arc::new(StubSettingsStore))
            .build()
            .unwrap();

        assert!(config.notification_sink.is_some());
        assert!(config.background_executor.is_available().await);
    }

    #[test]
    fn test_config_is_cloneable() {
        let config = complete_builder().build().unwrap();
        let cloned = config.clone();
        assert_eq!(config.database_path, cloned.database_path);
        assert!(format!("{:?}", cloned).contains("CoreConfig"));
    }
}
