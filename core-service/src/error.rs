use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

impl ServiceError {
    /// True when the provider rejected the stored or submitted credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ServiceError::Sync(core_sync::SyncError::Authentication(_))
                | ServiceError::InvalidCredentials(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
