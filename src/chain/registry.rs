//! Identity registry contract client
//!
//! Wraps the view and change methods the gateway uses on the registry
//! contract. The write path takes one lane from the key pool, lazily seeds
//! the lane's nonce counter from chain on first use, submits a single
//! `register_verification` call, and separates the contract's duplicate
//! rejection from every other failure. No retry happens here; a stale lane
//! is only marked for resync so the next request reseeds it.

use std::sync::Arc;

use serde_json::json;

use crate::domain::VerifiedRecord;

use super::error::ChainError;
use super::key_pool::SigningKeyPool;
use super::rpc::{ChainAction, ChainRpc, TxOutcome, DEFAULT_FUNCTION_CALL_GAS};

/// Change method storing one verified record.
pub const REGISTER_METHOD: &str = "register_verification";

/// Chain-write failures as the pipeline needs to distinguish them.
#[derive(Debug, thiserror::Error)]
pub enum StoreRecordError {
    /// The contract already holds a record for this nullifier or account
    #[error("record already registered on chain")]
    Duplicate,
    #[error(transparent)]
    Chain(#[from] ChainError),
}

pub struct IdentityRegistry {
    rpc: Arc<dyn ChainRpc>,
    contract_id: String,
}

impl IdentityRegistry {
    pub fn new(rpc: Arc<dyn ChainRpc>, contract_id: impl Into<String>) -> Self {
        Self {
            rpc,
            contract_id: contract_id.into(),
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.contract_id
    }

    /// Has any record already consumed this nullifier?
    pub async fn is_nullifier_used(&self, nullifier: &str) -> Result<bool, ChainError> {
        let value = self
            .rpc
            .view_function(
                &self.contract_id,
                "is_nullifier_used",
                &json!({ "nullifier": nullifier }),
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| ChainError::Malformed(format!("is_nullifier_used returned {value}")))
    }

    /// Does the account already hold a verification record?
    pub async fn is_account_verified(&self, account_id: &str) -> Result<bool, ChainError> {
        let value = self
            .rpc
            .view_function(
                &self.contract_id,
                "is_account_verified",
                &json!({ "account_id": account_id }),
            )
            .await?;
        value
            .as_bool()
            .ok_or_else(|| ChainError::Malformed(format!("is_account_verified returned {value}")))
    }

    /// Commit one verified record on one pool lane, single attempt.
    pub async fn store_record(
        &self,
        pool: &SigningKeyPool,
        record: &VerifiedRecord,
    ) -> Result<TxOutcome, StoreRecordError> {
        let lane_index = pool.next_lane();
        let lane = pool.lane(lane_index);

        if lane.needs_sync() {
            let view = self
                .rpc
                .view_access_key(pool.account_id(), lane.public_key())
                .await?;
            lane.sync_nonce(view.nonce);
        }

        let args = serde_json::to_vec(record)
            .map_err(|e| ChainError::Malformed(format!("record encoding: {e}")))?;
        let signer = pool.signer(lane_index);

        tracing::info!(
            account_id = %record.account_id,
            lane = lane_index,
            tx_nonce = signer.tx_nonce,
            "committing verification record"
        );

        let submitted = self
            .rpc
            .sign_and_submit(
                &signer,
                &self.contract_id,
                vec![ChainAction::FunctionCall {
                    method_name: REGISTER_METHOD.to_string(),
                    args,
                    gas: DEFAULT_FUNCTION_CALL_GAS,
                    deposit: 0,
                }],
            )
            .await;

        match submitted {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_duplicate_record() => Err(StoreRecordError::Duplicate),
            Err(e) => {
                if e.is_invalid_nonce() {
                    // Reseed this lane from chain before its next use
                    lane.mark_stale();
                }
                Err(StoreRecordError::Chain(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::rpc::{AccessKeyView, MockChainRpc};
    use crate::domain::{AttestationKind, ProofTriple, SignaturePayload, VerificationRequest};

    fn record() -> VerifiedRecord {
        let request = VerificationRequest {
            attestation: AttestationKind::Passport,
            proof: ProofTriple {
                a: ["1".into(), "2".into()],
                b: [["3".into(), "4".into()], ["5".into(), "6".into()]],
                c: ["7".into(), "8".into()],
            },
            public_signals: vec!["9".into()],
            user_context: "ctx".into(),
        };
        let payload = SignaturePayload {
            account_id: "alice.near".into(),
            signature_b64: "c2ln".into(),
            public_key: "ed25519:abc".into(),
            nonce: serde_json::Value::String("bm9uY2U=".into()),
            timestamp_ms: 1000,
        };
        VerifiedRecord::new(&request, "null-1", &payload, &[7u8; 32], 2000)
    }

    fn pool() -> SigningKeyPool {
        SigningKeyPool::derive("backend.near", &[8u8; 32], 1)
    }

    #[tokio::test]
    async fn test_nullifier_view_parses_bool() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_function()
            .withf(|contract, method, args| {
                contract == "registry.near"
                    && method == "is_nullifier_used"
                    && args["nullifier"] == "null-1"
            })
            .returning(|_, _, _| Ok(json!(true)));

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        assert!(registry.is_nullifier_used("null-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_bool_view_result_is_malformed() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_function()
            .returning(|_, _, _| Ok(json!({"unexpected": 1})));

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        assert!(matches!(
            registry.is_account_verified("alice.near").await,
            Err(ChainError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_store_record_syncs_lane_once_and_submits() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_access_key()
            .withf(|account, key| account == "backend.near" && key.starts_with("ed25519:"))
            .times(1)
            .returning(|_, _| {
                Ok(AccessKeyView {
                    nonce: 41,
                    permission: json!("FullAccess"),
                })
            });
        rpc.expect_sign_and_submit()
            .withf(|signer, receiver, actions| {
                let call_ok = matches!(
                    &actions[0],
                    ChainAction::FunctionCall { method_name, deposit, .. }
                        if method_name == REGISTER_METHOD && *deposit == 0
                );
                receiver == "registry.near" && signer.tx_nonce >= 42 && call_ok
            })
            .times(2)
            .returning(|_, _, _| {
                Ok(TxOutcome {
                    transaction_hash: "hash".into(),
                    success_value: None,
                })
            });

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        let pool = pool();

        // first call seeds the lane, second reuses the counter
        registry.store_record(&pool, &record()).await.unwrap();
        registry.store_record(&pool, &record()).await.unwrap();
        assert!(!pool.lane(0).needs_sync());
    }

    #[tokio::test]
    async fn test_contract_duplicate_rejection_is_classified() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_access_key().returning(|_, _| {
            Ok(AccessKeyView {
                nonce: 1,
                permission: json!("FullAccess"),
            })
        });
        rpc.expect_sign_and_submit().returning(|_, _, _| {
            Err(ChainError::Execution(
                "Smart contract panicked: nullifier already used".into(),
            ))
        });

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        assert!(matches!(
            registry.store_record(&pool(), &record()).await,
            Err(StoreRecordError::Duplicate)
        ));
    }

    #[tokio::test]
    async fn test_invalid_nonce_marks_lane_stale() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_access_key().returning(|_, _| {
            Ok(AccessKeyView {
                nonce: 7,
                permission: json!("FullAccess"),
            })
        });
        rpc.expect_sign_and_submit().returning(|_, _, _| {
            Err(ChainError::InvalidNonce {
                tx_nonce: 8,
                key_nonce: 20,
            })
        });

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        let pool = pool();

        let result = registry.store_record(&pool, &record()).await;
        assert!(matches!(result, Err(StoreRecordError::Chain(_))));
        assert!(pool.lane(0).needs_sync());
    }

    #[tokio::test]
    async fn test_lane_sync_failure_surfaces_without_submitting() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_view_access_key()
            .returning(|_, _| Err(ChainError::Transport("connection refused".into())));
        rpc.expect_sign_and_submit().times(0);

        let registry = IdentityRegistry::new(Arc::new(rpc), "registry.near");
        assert!(matches!(
            registry.store_record(&pool(), &record()).await,
            Err(StoreRecordError::Chain(ChainError::Transport(_)))
        ));
    }
}
