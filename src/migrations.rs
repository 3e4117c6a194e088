//! Database schema bootstrap.
//!
//! The gateway owns a single table, the signature-nonce reservations backing
//! replay protection. Every statement here is idempotent, so this runs
//! unconditionally on startup whenever a database is configured; concurrent
//! instances racing through it are harmless.

use sqlx::PgPool;

pub async fn run_postgres(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signature_nonces (
            account_id  TEXT NOT NULL,
            nonce       TEXT NOT NULL,
            reserved_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            expires_at  TIMESTAMPTZ NOT NULL,

            PRIMARY KEY (account_id, nonce)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_signature_nonces_expires_at
        ON signature_nonces (expires_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
