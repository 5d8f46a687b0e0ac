use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Provider call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Library error: {0}")]
    Library(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No sync provider configured")]
    NoProvider,

    #[error("Invalid episode action: {0}")]
    InvalidAction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Remote-side failures: the pass is retried with backoff and, when
    /// they persist, surfaced to the user.
    pub fn is_sync_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Provider(_)
                | SyncError::Authentication(_)
                | SyncError::Network(_)
                | SyncError::Protocol(_)
                | SyncError::Timeout(_)
        )
    }
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Network(msg) => SyncError::Network(msg),
            BridgeError::Timeout(after) => SyncError::Timeout(after.as_secs()),
            BridgeError::Cancelled => SyncError::Cancelled,
            BridgeError::Serialization(msg) => SyncError::Serialization(msg),
            BridgeError::DatabaseError(msg) => SyncError::Database(msg),
            other => SyncError::Provider(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        SyncError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sync_failure_classification() {
        assert!(SyncError::Authentication("401".into()).is_sync_failure());
        assert!(SyncError::Timeout(60).is_sync_failure());
        assert!(SyncError::Protocol("bad json".into()).is_sync_failure());
        assert!(!SyncError::Database("locked".into()).is_sync_failure());
        assert!(!SyncError::Cancelled.is_sync_failure());
        assert!(!SyncError::NoProvider.is_sync_failure());
    }

    #[test]
    fn test_bridge_error_conversion() {
        let err: SyncError = BridgeError::Timeout(Duration::from_secs(30)).into();
        assert!(matches!(err, SyncError::Timeout(30)));

        let err: SyncError = BridgeError::Network("connection reset".into()).into();
        assert!(err.is_sync_failure());
    }
}
