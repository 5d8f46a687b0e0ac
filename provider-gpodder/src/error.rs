//! Error types for the gpodder.net provider

use bridge_traits::BridgeError;
use core_sync::SyncError;
use thiserror::Error;

/// gpodder.net provider errors
#[derive(Error, Debug)]
pub enum GpodnetError {
    /// Credentials rejected (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Any other non-2xx answer
    #[error("gpodder.net API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Response body did not decode
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    /// Host, username or device id unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for gpodder.net operations
pub type Result<T> = std::result::Result<T, GpodnetError>;

impl GpodnetError {
    /// Classify a non-2xx status.
    pub fn from_status(status_code: u16, body: &str) -> Self {
        let message = summarize_body(body);
        match status_code {
            401 | 403 => GpodnetError::AuthenticationFailed(format!(
                "server answered {}: {}",
                status_code, message
            )),
            _ => GpodnetError::ApiError {
                status_code,
                message,
            },
        }
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no details".to_string();
    }
    trimmed.chars().take(200).collect()
}

impl From<GpodnetError> for SyncError {
    fn from(error: GpodnetError) -> Self {
        match error {
            GpodnetError::AuthenticationFailed(msg) => SyncError::Authentication(msg),
            e @ GpodnetError::ApiError { .. } => SyncError::Provider(e.to_string()),
            GpodnetError::ParseError(msg) => SyncError::Protocol(msg),
            GpodnetError::NetworkError(msg) => SyncError::Network(msg),
            GpodnetError::InvalidConfig(msg) => SyncError::Config(msg),
            GpodnetError::Bridge(BridgeError::Serialization(msg)) => SyncError::Protocol(msg),
            GpodnetError::Bridge(e) => SyncError::from(e),
        }
    }
}
