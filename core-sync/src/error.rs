use bridge_traits::playlist::{ErrorClass, ProviderError, ProviderKind};
use core_store::StoreError;
use thiserror::Error;

/// How the schedulers react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Bad input such as a mapping below the interval floor; never retried
    Validation,
    /// Rate limit, timeout or network failure; retried with backoff
    Transient,
    /// Credentials rejected; stops the provider for the rest of the tick
    Auth,
    /// Missing track or playlist, permission denied; skipped and blacklisted
    Permanent,
    /// Record store failure; aborts the current mapping or item only
    Internal,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{provider} request failed: {source}")]
    Provider {
        provider: ProviderKind,
        #[source]
        source: ProviderError,
    },

    #[error("{provider} credentials rejected: {message}")]
    Auth {
        provider: ProviderKind,
        message: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Attribute an adapter failure to `provider`, splitting out auth failures.
    pub fn provider(provider: ProviderKind, source: ProviderError) -> Self {
        match source.class() {
            ErrorClass::Auth => SyncError::Auth {
                provider,
                message: source.to_string(),
            },
            _ => SyncError::Provider { provider, source },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Validation(_) => FailureKind::Validation,
            SyncError::Store(StoreError::InvalidInput { .. }) => FailureKind::Validation,
            SyncError::Store(_) | SyncError::Internal(_) => FailureKind::Internal,
            SyncError::Auth { .. } => FailureKind::Auth,
            SyncError::Provider { source, .. } => match source.class() {
                ErrorClass::Transient => FailureKind::Transient,
                ErrorClass::Permanent => FailureKind::Permanent,
                ErrorClass::Auth => FailureKind::Auth,
            },
        }
    }

    /// Wait requested by the provider, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            SyncError::Provider { source, .. } => source.retry_after_secs(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
