use bridge_traits::ProviderKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No stored credentials for {0}; connect the account first")]
    TokenNotFound(ProviderKind),

    #[error("{provider} rejected the refresh token: {reason}")]
    RefreshRejected {
        provider: ProviderKind,
        reason: String,
    },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token storage error: {0}")]
    Storage(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("OAuth configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether the same operation may succeed later without user action.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::RefreshFailed(_) | AuthError::Storage(_))
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
