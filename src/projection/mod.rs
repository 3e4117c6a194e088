//! Session status projections
//!
//! The chain is the authoritative record of a completed verification; the
//! session store is a read-side cache that lets clients poll the outcome of a
//! submission without hitting the contract. Entries are written best-effort
//! by the pipeline and expire after a configurable TTL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::SessionProjection;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("session store backend error: {0}")]
    Backend(String),
}

// ============================================================================
// Store trait
// ============================================================================

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the projection for a session, if one exists and has not expired.
    async fn get(&self, session_id: &str) -> Result<Option<SessionProjection>, ProjectionError>;

    /// Insert or overwrite the projection for a session.
    async fn upsert(&self, projection: SessionProjection) -> Result<(), ProjectionError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// TTL-bounded in-memory session store.
///
/// Expired entries are dropped lazily: reads skip them, writes purge them.
pub struct InMemorySessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<String, (SessionProjection, Instant)>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionProjection>, ProjectionError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(session_id)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(projection, _)| projection.clone()))
    }

    async fn upsert(&self, mut projection: SessionProjection) -> Result<(), ProjectionError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);

        // A status transition keeps the original submission time.
        if let Some((existing, _)) = entries.get(&projection.session_id) {
            projection.created_at = existing.created_at;
        }

        entries.insert(
            projection.session_id.clone(),
            (projection, now + self.ttl),
        );
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
