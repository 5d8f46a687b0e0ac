//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `NetworkMonitor` using a TCP reachability probe
//! - `BackgroundExecutor` using Tokio tasks with unique-work semantics
//! - `NotificationSink` writing to the log
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteSettingsStore, TokioBackgroundExecutor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let settings = SqliteSettingsStore::new("podsync/settings.db".into()).await?;
//!     let executor = TokioBackgroundExecutor::new();
//!     Ok(())
//! }
//! ```

mod background;
mod http;
mod network;
mod notification;
mod settings;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use background::TokioBackgroundExecutor;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use notification::LogNotificationSink;
pub use settings::SqliteSettingsStore;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
