//! # Nextcloud Provider
//!
//! Implements `SyncProvider` for the Nextcloud gpoddersync app.
//!
//! ## Overview
//!
//! gpoddersync speaks a subset of the gpodder.net API under
//! `{server}/index.php/apps/gpoddersync/`. There are no devices and no
//! server sessions: every request is authenticated with the account name
//! and an app password.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{NextcloudConfig, NextcloudProvider};
pub use error::{NextcloudError, Result};
