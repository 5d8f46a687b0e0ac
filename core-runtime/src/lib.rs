//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the sync engine crates:
//! - Logging and tracing setup
//! - Capability configuration ([`CoreConfig`](config::CoreConfig))
//! - Sticky sync status channel
//!
//! Nothing here knows about providers or queues; it only wires host
//! capabilities together and gives observers a way to follow a pass.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
