//! Refresh token storage and rotation.
//!
//! Only refresh tokens are stored in the database; access tokens are
//! stateless. The invariant is at most one live refresh token per user:
//! creating a new one deletes any existing row for that user first, so a new
//! login always invalidates the prior session's refresh token.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sqlx::sqlite::SqlitePool;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Length of the random opaque token material, in bytes.
const TOKEN_BYTES: usize = 32;

/// A persisted refresh token row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub token: String,
    pub user_id: i64,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
}

/// Outcome of looking up a refresh token presented by a client.
#[derive(Debug)]
pub enum RefreshLookup {
    /// The token exists and has not expired.
    Valid(RefreshToken),
    /// The token existed but was past expiry; the row has been deleted.
    Expired,
    /// No such token (never issued, rotated away, or already revoked).
    NotFound,
}

/// Store for managing refresh tokens.
pub struct RefreshTokenStore {
    pool: SqlitePool,
}

impl RefreshTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a refresh token for a user, rotating out any existing one.
    /// Delete-then-insert runs in a single transaction so there is never a
    /// moment with two live tokens for the same user.
    pub async fn create(&self, user_id: i64, ttl_secs: i64) -> Result<RefreshToken, sqlx::Error> {
        let token = generate_token();
        let expires_at = unix_now() + ttl_secs;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES (?, ?, ?)",
        )
        .bind(&token)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(RefreshToken {
            id: result.last_insert_rowid(),
            token,
            user_id,
            expires_at,
        })
    }

    /// Look up a token by value and verify it is still live.
    /// An expired row is deleted as a side effect; the delete is guarded by
    /// the expiry condition so two concurrent callers cannot both succeed
    /// against the same expired token.
    pub async fn find_and_verify(
        &self,
        token: &str,
        now: i64,
    ) -> Result<RefreshLookup, sqlx::Error> {
        let row: Option<RefreshToken> = sqlx::query_as(
            "SELECT id, token, user_id, expires_at FROM refresh_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(RefreshLookup::NotFound);
        };

        if row.expires_at <= now {
            sqlx::query("DELETE FROM refresh_tokens WHERE token = ? AND expires_at <= ?")
                .bind(token)
                .bind(now)
                .execute(&self.pool)
                .await?;
            return Ok(RefreshLookup::Expired);
        }

        Ok(RefreshLookup::Valid(row))
    }

    /// Delete the token owned by a user (explicit logout).
    pub async fn delete_by_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete a single token by value (single-session invalidation).
    pub async fn delete_by_token(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete all rows past expiry. Run on a schedule, never per request.
    pub async fn delete_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Generate a 256-bit random opaque token, base64url-encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
