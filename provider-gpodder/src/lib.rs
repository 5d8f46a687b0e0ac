//! # gpodder.net Provider
//!
//! Implements the `SyncProvider` trait against the gpodder.net API v2.
//!
//! ## Overview
//!
//! Subscriptions are tracked per device, episode actions per user. Both
//! channels are incremental: every response carries a server timestamp that
//! the caller stores and passes back as `since` on the next pass.
//!
//! ## Authentication
//!
//! Every request carries HTTP basic auth. `login` establishes a server
//! session, `logout` ends it; neither is required for the other calls to
//! succeed.
//!
//! ## Usage
//!
//! ```ignore
//! use provider_gpodder::{GpodnetConfig, GpodnetProvider};
//!
//! let config = GpodnetConfig::new("alice", "laptop", password);
//! let provider = GpodnetProvider::new(http_client, config)?;
//! let changes = provider.get_subscription_changes(0).await?;
//! ```

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GpodnetConfig, GpodnetProvider, DEFAULT_HOST};
pub use error::{GpodnetError, Result};
