//! # Authentication Module
//!
//! OAuth token storage and refresh for the streaming services the sync
//! engine talks to.
//!
//! ## Overview
//!
//! - [`TokenRepository`] persists one token set per provider in the
//!   `oauth_tokens` collection.
//! - [`OAuthClient`] runs the refresh-token grant against each provider's
//!   token endpoint.
//! - [`TokenStore`] combines both and hands adapters a token that is valid
//!   for at least the refresh buffer, via [`AccessTokenSource`].

pub mod error;
pub mod oauth;
pub mod repository;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use oauth::{OAuthClient, OAuthConfig, TokenRefresher};
pub use repository::{SqliteTokenRepository, TokenRepository};
pub use token_store::{AccessTokenSource, TokenStore};
pub use types::{OAuthTokens, ProviderKind, TokenGrant};
