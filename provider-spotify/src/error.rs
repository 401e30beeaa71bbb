//! Error types for the Spotify provider

use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use bridge_traits::playlist::ProviderError;
use core_auth::AuthError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotifyError {
    /// Non-success status from the Web API
    #[error("Spotify API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Spotify rate limit exceeded: {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Spotify request timed out after {0}ms")]
    Timeout(u64),

    #[error("Failed to parse Spotify response: {0}")]
    Parse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

/// `{"error": {"status": 404, "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl SpotifyError {
    /// Classify a non-success response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let message = serde_json::from_slice::<ErrorEnvelope>(&response.body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());

        if response.status == 429 {
            return SpotifyError::RateLimited {
                retry_after_secs: response.retry_after_secs(),
                message,
            };
        }

        SpotifyError::Api {
            status: response.status,
            message,
        }
    }
}

impl From<SpotifyError> for ProviderError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Api { status, message } => match status {
                401 => ProviderError::Unauthorized(message),
                403 => ProviderError::PermissionDenied(message),
                404 => ProviderError::NotFound(message),
                _ => ProviderError::Unknown {
                    status: Some(status),
                    message,
                },
            },
            SpotifyError::RateLimited {
                retry_after_secs,
                message,
            } => ProviderError::RateLimited {
                retry_after_secs,
                message,
            },
            SpotifyError::Timeout(ms) => ProviderError::Timeout(ms),
            SpotifyError::Parse(message) => ProviderError::Unknown {
                status: None,
                message,
            },
            SpotifyError::Auth(err) if err.is_transient() => ProviderError::Network(err.to_string()),
            SpotifyError::Auth(err) => ProviderError::Unauthorized(err.to_string()),
            SpotifyError::Bridge(err) => ProviderError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::playlist::{ErrorClass, ProviderKind};

    #[test]
    fn test_from_response_reads_error_message() {
        let response = HttpResponse::new(
            404,
            r#"{"error": {"status": 404, "message": "Non existing id"}}"#,
        );

        let error: ProviderError = SpotifyError::from_response(&response).into();
        assert_eq!(error, ProviderError::NotFound("Non existing id".into()));
        assert_eq!(error.class(), ErrorClass::Permanent);
    }

    #[test]
    fn test_rate_limit_keeps_retry_after() {
        let response = HttpResponse::new(429, "").with_header("Retry-After", "7");

        let error: ProviderError = SpotifyError::from_response(&response).into();
        assert_eq!(error.retry_after_secs(), Some(7));
        assert_eq!(error.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_auth_error_mapping() {
        let rejected = SpotifyError::Auth(AuthError::RefreshRejected {
            provider: ProviderKind::Spotify,
            reason: "invalid_grant".into(),
        });
        assert_eq!(ProviderError::from(rejected).class(), ErrorClass::Auth);

        let unreachable = SpotifyError::Auth(AuthError::RefreshFailed("connect".into()));
        assert_eq!(ProviderError::from(unreachable).class(), ErrorClass::Transient);
    }

    #[test]
    fn test_server_error_is_transient() {
        let error: ProviderError = SpotifyError::Api {
            status: 502,
            message: "Bad gateway".into(),
        }
        .into();
        assert_eq!(error.class(), ErrorClass::Transient);
    }
}
