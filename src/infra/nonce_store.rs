//! Replay protection for signed submissions
//!
//! A signature nonce may be accepted at most once per account while it is
//! still fresh. The store provides one operation, an atomic set-if-absent
//! with a TTL, so that two concurrent submissions carrying the same nonce
//! can never both pass.
//!
//! Two backends:
//! - `PgNonceStore`: cross-process, uses `INSERT .. ON CONFLICT DO NOTHING`
//!   against the table created by `crate::migrations`
//! - `InMemoryNonceStore`: single-process fallback for dev and tests

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use sqlx::postgres::PgPool;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Errors from the nonce store backend
#[derive(Debug, thiserror::Error)]
pub enum NonceStoreError {
    #[error("nonce store backend error: {0}")]
    Backend(#[from] sqlx::Error),
}

/// Atomic set-if-absent reservation of `(account_id, nonce)`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Reserve a nonce for an account.
    ///
    /// Returns `true` when the reservation was created, `false` when the
    /// pair is already held and still unexpired (a replay).
    async fn reserve(
        &self,
        account_id: &str,
        nonce_b64: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError>;
}

// ============================================================================
// PostgreSQL backend
// ============================================================================

/// PostgreSQL-backed nonce store
pub struct PgNonceStore {
    pool: PgPool,
}

impl PgNonceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop reservations whose freshness window has passed.
    ///
    /// Correctness does not depend on this running; `reserve` clears an
    /// expired row for its own pair before inserting. This keeps the table
    /// from growing without bound.
    pub async fn purge_expired(&self) -> Result<u64, NonceStoreError> {
        let result = sqlx::query("DELETE FROM signature_nonces WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NonceStore for PgNonceStore {
    async fn reserve(
        &self,
        account_id: &str,
        nonce_b64: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError> {
        // An expired row for this pair no longer blocks re-use.
        sqlx::query(
            r#"
            DELETE FROM signature_nonces
            WHERE account_id = $1 AND nonce = $2 AND expires_at <= NOW()
            "#,
        )
        .bind(account_id)
        .bind(nonce_b64)
        .execute(&self.pool)
        .await?;

        let expires_at = Utc::now() + chrono::Duration::milliseconds(ttl.as_millis() as i64);
        let result = sqlx::query(
            r#"
            INSERT INTO signature_nonces (account_id, nonce, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (account_id, nonce) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(nonce_b64)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Single-process nonce store for dev deployments without a database
pub struct InMemoryNonceStore {
    entries: RwLock<HashMap<(String, String), Instant>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn reserve(
        &self,
        account_id: &str,
        nonce_b64: &str,
        ttl: Duration,
    ) -> Result<bool, NonceStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        // Purge and check under the same write lock so the set-if-absent
        // stays atomic with respect to concurrent reservations.
        entries.retain(|_, expires_at| *expires_at > now);

        let key = (account_id.to_string(), nonce_b64.to_string());
        if entries.contains_key(&key) {
            return Ok(false);
        }
        entries.insert(key, now + ttl);
        Ok(true)
    }
}

// ============================================================================
// Tests
// ============================================================================
