use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use bridge_traits::ProviderKind;

/// OAuth 2.0 token set for one provider.
///
/// # Security
///
/// Tokens are never logged. The `Debug` implementation redacts them.
///
/// # Examples
///
/// ```
/// use core_auth::OAuthTokens;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let tokens = OAuthTokens::new("BQD...", "AQC...", 3600, now)
///     .with_scopes(vec!["playlist-modify-private".to_string()]);
///
/// assert!(!tokens.expires_within(Duration::seconds(30), now));
/// assert!(tokens.expires_within(Duration::seconds(30), now + Duration::seconds(3580)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens
    pub refresh_token: String,
    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
    /// Granted scopes
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// Create a token set expiring `expires_in` seconds after `issued_at`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: issued_at + Duration::seconds(expires_in),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// True when the access token is expired or will be within `buffer`.
    pub fn expires_within(&self, buffer: Duration, now: DateTime<Utc>) -> bool {
        now + buffer >= self.expires_at
    }

    /// Scopes as stored: space separated, the OAuth wire format.
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn parse_scopes(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Result of a successful refresh-token grant.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider rotated the refresh token
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub scope: Option<String>,
}

impl TokenGrant {
    /// Fold the grant into the previous token set.
    pub fn apply_to(self, previous: &OAuthTokens, now: DateTime<Utc>) -> OAuthTokens {
        let scopes = match self.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => OAuthTokens::parse_scopes(scope),
            _ => previous.scopes.clone(),
        };

        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .unwrap_or_else(|| previous.refresh_token.clone()),
            expires_at: now + Duration::seconds(self.expires_in),
            scopes,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("rotated_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .finish()
    }
}
