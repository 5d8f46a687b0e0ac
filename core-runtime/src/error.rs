use bridge_traits::BridgeError;
use thiserror::Error;

/// Startup errors for the runtime layer.
#[derive(Error, Debug)]
pub enum Error {
    /// A path or filter the host supplied is unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host capability was neither injected nor defaulted
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging error: {0}")]
    Logging(String),

    /// A default bridge failed to initialize
    #[error("Bridge initialization failed: {0}")]
    Bridge(#[from] BridgeError),
}

impl Error {
    /// Name of the missing capability, for hosts that map it to setup UI.
    pub fn missing_capability(&self) -> Option<&str> {
        match self {
            Error::CapabilityMissing { capability, .. } => Some(capability),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
