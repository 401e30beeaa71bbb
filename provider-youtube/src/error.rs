//! Error types for the YouTube provider

use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use bridge_traits::playlist::ProviderError;
use core_auth::AuthError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum YouTubeError {
    /// Non-success status from the Data API
    #[error("YouTube API error (status {status}, reason {reason:?}): {message}")]
    Api {
        status: u16,
        reason: Option<String>,
        message: String,
    },

    #[error("YouTube rate limit exceeded: {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },

    /// Refused locally because the daily budget is spent
    #[error("YouTube daily quota exhausted, resets in {retry_after_secs}s")]
    QuotaExhausted { retry_after_secs: u64 },

    #[error("YouTube request timed out after {0}ms")]
    Timeout(u64),

    #[error("Failed to parse YouTube response: {0}")]
    Parse(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, YouTubeError>;

/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "quotaExceeded"}]}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// 403 reasons that mean "slow down" rather than "forbidden".
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

pub(crate) const QUOTA_EXCEEDED: &str = "quotaExceeded";

impl YouTubeError {
    /// Classify a non-success response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let (message, reason) = match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
            Ok(envelope) => (
                envelope.error.message,
                envelope
                    .error
                    .errors
                    .into_iter()
                    .find_map(|detail| detail.reason),
            ),
            Err(_) => (String::from_utf8_lossy(&response.body).into_owned(), None),
        };

        let throttled = response.status == 429
            || (response.status == 403
                && reason
                    .as_deref()
                    .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r)));

        if throttled {
            return YouTubeError::RateLimited {
                retry_after_secs: response.retry_after_secs(),
                message,
            };
        }

        YouTubeError::Api {
            status: response.status,
            reason,
            message,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, YouTubeError::Api { status: 403, reason: Some(r), .. } if r == QUOTA_EXCEEDED)
    }
}

impl From<YouTubeError> for ProviderError {
    fn from(error: YouTubeError) -> Self {
        match error {
            YouTubeError::Api {
                status, message, ..
            } => match status {
                401 => ProviderError::Unauthorized(message),
                403 => ProviderError::PermissionDenied(message),
                404 => ProviderError::NotFound(message),
                _ => ProviderError::Unknown {
                    status: Some(status),
                    message,
                },
            },
            YouTubeError::RateLimited {
                retry_after_secs,
                message,
            } => ProviderError::RateLimited {
                retry_after_secs,
                message,
            },
            YouTubeError::QuotaExhausted { retry_after_secs } => ProviderError::RateLimited {
                retry_after_secs: Some(retry_after_secs),
                message: "daily quota exhausted".to_string(),
            },
            YouTubeError::Timeout(ms) => ProviderError::Timeout(ms),
            YouTubeError::Parse(message) => ProviderError::Unknown {
                status: None,
                message,
            },
            YouTubeError::Auth(err) if err.is_transient() => ProviderError::Network(err.to_string()),
            YouTubeError::Auth(err) => ProviderError::Unauthorized(err.to_string()),
            YouTubeError::Bridge(err) => ProviderError::from(err),
        }
    }
}
