//! # Token Repository
//!
//! Persistence of the `oauth_tokens` collection: one row per provider,
//! overwritten on every refresh.

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, ProviderKind};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{FromRow, SqlitePool};

/// Repository trait for OAuth token persistence
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Tokens for a provider, if the account has been connected
    async fn get(&self, provider: ProviderKind) -> Result<Option<OAuthTokens>>;

    /// Insert or replace the provider's tokens
    async fn upsert(&self, provider: ProviderKind, tokens: &OAuthTokens) -> Result<()>;

    /// Remove the provider's tokens. Returns whether a row existed.
    async fn delete(&self, provider: ProviderKind) -> Result<bool>;
}

#[derive(Debug, FromRow)]
struct TokenRow {
    provider: String,
    access_token: String,
    refresh_token: String,
    expires_at: i64,
    scopes: String,
}

impl TryFrom<TokenRow> for OAuthTokens {
    type Error = AuthError;

    fn try_from(row: TokenRow) -> Result<Self> {
        let expires_at = DateTime::from_timestamp(row.expires_at, 0).ok_or_else(|| {
            AuthError::Storage(format!(
                "Invalid expiry {} stored for {}",
                row.expires_at, row.provider
            ))
        })?;

        Ok(OAuthTokens {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at,
            scopes: OAuthTokens::parse_scopes(&row.scopes),
        })
    }
}

/// SQLite implementation of [`TokenRepository`]
pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table when running without the record-store migrations.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_tokens (
                provider TEXT PRIMARY KEY NOT NULL,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                scopes TEXT NOT NULL DEFAULT '',
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn get(&self, provider: ProviderKind) -> Result<Option<OAuthTokens>> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT provider, access_token, refresh_token, expires_at, scopes
            FROM oauth_tokens
            WHERE provider = ?
            "#,
        )
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(OAuthTokens::try_from).transpose()
    }

    async fn upsert(&self, provider: ProviderKind, tokens: &OAuthTokens) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_tokens (provider, access_token, refresh_token, expires_at, scopes, updated_at)
            VALUES (?, ?, ?, ?, ?, strftime('%s', 'now'))
            ON CONFLICT(provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scopes = excluded.scopes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(provider.as_str())
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.expires_at.timestamp())
        .bind(tokens.scope_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, provider: ProviderKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE provider = ?")
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
