//! Error types for the Nextcloud provider

use bridge_traits::BridgeError;
use core_sync::SyncError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NextcloudError {
    /// Credentials rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// 404 on an app route
    #[error("gpoddersync app not reachable at {0}")]
    AppNotInstalled(String),

    #[error("Nextcloud API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, NextcloudError>;

impl NextcloudError {
    pub fn from_status(status_code: u16, url: &str, body: &str) -> Self {
        match status_code {
            401 | 403 => NextcloudError::AuthenticationFailed(format!(
                "server answered {}",
                status_code
            )),
            404 => NextcloudError::AppNotInstalled(url.to_string()),
            _ => NextcloudError::ApiError {
                status_code,
                message: body.trim().chars().take(200).collect(),
            },
        }
    }
}

impl From<NextcloudError> for SyncError {
    fn from(error: NextcloudError) -> Self {
        match error {
            NextcloudError::AuthenticationFailed(msg) => SyncError::Authentication(msg),
            e @ (NextcloudError::AppNotInstalled(_) | NextcloudError::ApiError { .. }) => {
                SyncError::Provider(e.to_string())
            }
            NextcloudError::ParseError(msg) => SyncError::Protocol(msg),
            NextcloudError::NetworkError(msg) => SyncError::Network(msg),
            NextcloudError::InvalidConfig(msg) => SyncError::Config(msg),
            NextcloudError::Bridge(BridgeError::Serialization(msg)) => SyncError::Protocol(msg),
            NextcloudError::Bridge(e) => SyncError::from(e),
        }
    }
}
