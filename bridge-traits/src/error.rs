use thiserror::Error;

/// Failures raised by host capabilities before a provider sees a response.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The capability could not be constructed on this host.
    #[error("Host capability unavailable: {0}")]
    NotAvailable(String),

    #[error("Host operation failed: {0}")]
    OperationFailed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network unreachable: {0}")]
    Network(String),
}

impl BridgeError {
    /// Timeouts and connection failures; another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Timeout(_) | BridgeError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
