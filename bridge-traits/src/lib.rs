//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the podcast sync engine and
//! platform-specific implementations. Each trait represents a capability the
//! engine requires but that must be implemented differently per platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP used by the sync providers
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity and metered network detection
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Provider passwords and app tokens
//! - [`SettingsStore`](storage::SettingsStore) - Key-value preferences and sync watermarks
//! - [`PodcastLibrary`](library::PodcastLibrary) - Local subscriptions and episode state
//!
//! ### Platform Integration
//! - [`BackgroundExecutor`](background::BackgroundExecutor) - Unique deferred work with constraints and backoff
//! - [`NotificationSink`](notification::NotificationSink) - Sustained-failure notification
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | Android  | TBD                 | 📋 Planned |
//! | iOS      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations convert their native errors and keep messages actionable.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across Tokio
//! tasks behind `Arc`.

pub mod background;
pub mod error;
pub mod http;
pub mod library;
pub mod network;
pub mod notification;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{
    BackgroundExecutor, BackoffPolicy, ExistingWorkPolicy, NetworkRequirement, TaskConstraints,
    TaskId, TaskStatus, WorkContext, WorkHandler, WorkOutcome, WorkRequest,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use library::{FeedItem, FeedMedia, PodcastLibrary};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use notification::NotificationSink;
pub use storage::{SecureStore, SettingsStore, SettingsTransaction};
pub use time::{Clock, LogLevel, ManualClock, SystemClock};
