//! Key registration bootstrapper
//!
//! At process start every derived pool key must exist as a full-access key
//! on the backend account. The registrar diffs the on-chain key list
//! against the pool, batches all missing keys into one AddKey transaction
//! (one batch avoids nonce races between the additions themselves), and
//! loops with backoff on transient trouble. It re-probes chain state
//! before every attempt, so a racing replica finishing first ends the loop
//! early.
//!
//! The registrar never blocks or fails startup. A degraded outcome just
//! means fewer concurrent submission lanes until the next restart; the
//! readiness endpoint surfaces it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infra::RetryConfig;

use super::key_pool::SigningKeyPool;
use super::rpc::{AccessKeyInfo, ChainAction, ChainRpc};

/// Terminal state of one bootstrap run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// Every pool key was already registered
    AlreadyComplete,
    /// Keys newly registered since the run started (by this or a racing
    /// instance)
    Registered { added: usize },
    /// Retry budget exhausted with keys still missing; the pool runs with
    /// fewer lanes
    Partial { missing: usize },
    /// Bootstrap could not make progress at all
    Failed { reason: String },
}

/// What the readiness endpoint reports about bootstrap.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BootstrapReport {
    pub outcome: Option<BootstrapOutcome>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BootstrapReport {
    pub fn record(&mut self, outcome: BootstrapOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self.outcome,
            Some(BootstrapOutcome::Partial { .. } | BootstrapOutcome::Failed { .. })
        )
    }
}

pub struct KeyRegistrar {
    rpc: Arc<dyn ChainRpc>,
    pool: Arc<SigningKeyPool>,
    config: RetryConfig,
}

impl KeyRegistrar {
    pub fn new(rpc: Arc<dyn ChainRpc>, pool: Arc<SigningKeyPool>) -> Self {
        Self {
            rpc,
            pool,
            config: RetryConfig::bootstrap(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Register every missing pool key, idempotently.
    pub async fn ensure_pool_registered(&self) -> BootstrapOutcome {
        let account_id = self.pool.account_id();
        let pool_keys = self.pool.public_keys();
        let mut initial_missing: Option<usize> = None;
        let mut attempt: u32 = 0;
        let mut rounds: u32 = 0;

        loop {
            // Each submission round re-lists first; success verification
            // and the pre-retry probe are the same query.
            rounds += 1;
            if rounds > self.config.max_retries + 4 {
                break;
            }

            let on_chain = match self.rpc.list_access_keys(account_id).await {
                Ok(keys) => keys,
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.delay_for_attempt(attempt - 1);
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis(),
                        "listing backend keys failed, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) if e.is_retryable() => break,
                Err(e) => {
                    return BootstrapOutcome::Failed {
                        reason: format!("listing backend keys: {e}"),
                    };
                }
            };

            let registered: HashSet<&str> =
                on_chain.iter().map(|k| k.public_key.as_str()).collect();
            let missing: Vec<String> = pool_keys
                .iter()
                .filter(|k| !registered.contains(k.as_str()))
                .cloned()
                .collect();
            if initial_missing.is_none() {
                initial_missing = Some(missing.len());
            }

            if missing.is_empty() {
                return match initial_missing.unwrap_or(0) {
                    0 => BootstrapOutcome::AlreadyComplete,
                    added => BootstrapOutcome::Registered { added },
                };
            }

            // One already-registered pool key has to sign the additions.
            let Some(signer_lane) = pool_keys
                .iter()
                .position(|k| registered.contains(k.as_str()))
            else {
                return BootstrapOutcome::Failed {
                    reason: format!(
                        "no pool key is registered on {account_id}; register the lane-0 key once by hand"
                    ),
                };
            };
            self.seed_lane_from_listing(signer_lane, &pool_keys[signer_lane], &on_chain);

            let actions: Vec<ChainAction> = missing
                .iter()
                .map(|public_key| ChainAction::AddFullAccessKey {
                    public_key: public_key.clone(),
                })
                .collect();
            let signer = self.pool.signer(signer_lane);

            tracing::info!(count = missing.len(), signer = %signer.public_key,
                "registering missing backend keys");

            match self.rpc.sign_and_submit(&signer, account_id, actions).await {
                Ok(_) => continue,
                Err(e) if e.is_key_exists() => {
                    // A racing instance added some of them; re-diff.
                    tracing::debug!("keys were added concurrently, re-checking");
                    continue;
                }
                Err(e)
                    if (e.is_retryable() || e.is_invalid_nonce())
                        && attempt < self.config.max_retries =>
                {
                    if e.is_invalid_nonce() {
                        self.pool.lane(signer_lane).mark_stale();
                    }
                    attempt += 1;
                    let delay = self.config.delay_for_attempt(attempt - 1);
                    tracing::warn!(error = %e, attempt, delay_ms = delay.as_millis(),
                        "adding backend keys failed, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) if e.is_retryable() || e.is_invalid_nonce() => break,
                Err(e) => {
                    return BootstrapOutcome::Failed {
                        reason: format!("adding backend keys: {e}"),
                    };
                }
            }
        }

        // Budget exhausted: probe once more and report the degraded state.
        match self.rpc.list_access_keys(account_id).await {
            Ok(on_chain) => {
                let registered: HashSet<&str> =
                    on_chain.iter().map(|k| k.public_key.as_str()).collect();
                let missing = pool_keys
                    .iter()
                    .filter(|k| !registered.contains(k.as_str()))
                    .count();
                match (missing, initial_missing.unwrap_or(0)) {
                    (0, 0) => BootstrapOutcome::AlreadyComplete,
                    (0, added) => BootstrapOutcome::Registered { added },
                    (missing, _) => BootstrapOutcome::Partial { missing },
                }
            }
            Err(e) => BootstrapOutcome::Failed {
                reason: format!("final key probe: {e}"),
            },
        }
    }

    /// Seed the signer lane's nonce from a listing we already hold.
    fn seed_lane_from_listing(&self, lane: usize, public_key: &str, listing: &[AccessKeyInfo]) {
        if let Some(info) = listing.iter().find(|k| k.public_key == public_key) {
            self.pool.lane(lane).sync_nonce(info.access_key.nonce);
        }
    }
}
