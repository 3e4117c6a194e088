//! Verification pipeline: proof check, signature check, chain commit.
//!
//! A submission either completes every stage or fails with a classified
//! error; there are no partial successes. Once the verifier has vouched for
//! the proof the pipeline also mirrors the outcome into the session store so
//! clients can poll it, but the chain write remains the authoritative step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::chain::{ChainRpc, IdentityRegistry, SigningKeyPool, StoreRecordError};
use crate::crypto::{verify_signed_message, SignedMessagePayload};
use crate::domain::{
    check_freshness, nonce_to_b64, AttestationKind, DiscloseOutput, FreshnessError,
    SessionProjection, SignaturePayload, SubmissionBody, VerificationRequest, VerifiedRecord,
    VerifierOutcome, VerifyErrorCode,
};
use crate::infra::NonceStore;
use crate::pipeline::{ProofVerifier, VerifierError};
use crate::projection::SessionStore;

// ============================================================================
// Policy
// ============================================================================

/// Server-side expectations a wallet signature must meet.
///
/// The challenge and recipient are never taken from the request; both come
/// from configuration so a signature is only valid for this deployment.
#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    /// Message the wallet must have signed.
    pub challenge: String,
    /// Recipient account the wallet must have addressed.
    pub recipient: String,
    /// Oldest acceptable signature age.
    pub max_signature_age: Duration,
    /// Tolerance for clock drift, applied on both ends of the window.
    pub clock_skew: Duration,
    /// Floor for nonce reservation lifetimes.
    pub min_reservation_ttl: Duration,
    /// Whether a sanctions-list hit rejects the submission.
    pub sanctions_check_enabled: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            challenge: String::new(),
            recipient: String::new(),
            max_signature_age: Duration::from_millis(600_000),
            clock_skew: Duration::from_millis(10_000),
            min_reservation_ttl: Duration::from_secs(60),
            sanctions_check_enabled: true,
        }
    }
}

impl VerificationPolicy {
    /// How long a consumed nonce must stay reserved.
    ///
    /// A replay of the same signature stays verifiable until the freshness
    /// window closes, so the reservation must outlive the remainder of that
    /// window. The floor covers signatures that arrive near expiry.
    pub fn reservation_ttl(&self, age_ms: i64) -> Duration {
        let window_ms = (self.max_signature_age + self.clock_skew).as_millis() as i64;
        let remaining_ms = window_ms - age_ms.max(0);
        if remaining_ms <= self.min_reservation_ttl.as_millis() as i64 {
            self.min_reservation_ttl
        } else {
            Duration::from_millis(remaining_ms as u64)
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Who is at fault when a submission fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The submission itself is unacceptable.
    Client,
    /// A dependency the gateway relies on misbehaved.
    Upstream,
    /// The gateway failed internally.
    Internal,
}

/// Terminal failure of a verification submission.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("required fields are missing: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("proof verification failed: {0}")]
    VerificationFailed(String),
    #[error("proof verifier unavailable: {0}")]
    VerifierUnavailable(String),
    #[error("minimum age requirement not met")]
    MinimumAgeNotMet,
    #[error("sanctions screening rejected the submission")]
    SanctionsCheckFailed,
    #[error("proof did not disclose a nullifier")]
    NullifierMissing,
    #[error("missing wallet signature data: {0}")]
    SignatureMissing(String),
    #[error("wallet signature rejected: {0}")]
    SignatureInvalid(String),
    #[error("signature timestamp invalid: {0}")]
    TimestampInvalid(String),
    #[error("signature is too old: signed {} seconds ago", .age_ms / 1000)]
    SignatureExpired { age_ms: i64 },
    #[error("passport already registered")]
    DuplicatePassport,
    #[error("failed to store verification record: {0}")]
    StorageFailed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> VerifyErrorCode {
        match self {
            PipelineError::MissingFields(_) => VerifyErrorCode::MissingFields,
            PipelineError::VerificationFailed(_) | PipelineError::VerifierUnavailable(_) => {
                VerifyErrorCode::VerificationFailed
            }
            PipelineError::MinimumAgeNotMet => VerifyErrorCode::MinimumAgeNotMet,
            PipelineError::SanctionsCheckFailed => VerifyErrorCode::OfacCheckFailed,
            PipelineError::NullifierMissing => VerifyErrorCode::NullifierMissing,
            PipelineError::SignatureMissing(_) => VerifyErrorCode::NearSignatureMissing,
            PipelineError::SignatureInvalid(_) => VerifyErrorCode::NearSignatureInvalid,
            PipelineError::TimestampInvalid(_) => VerifyErrorCode::SignatureTimestampInvalid,
            PipelineError::SignatureExpired { .. } => VerifyErrorCode::SignatureExpired,
            PipelineError::DuplicatePassport => VerifyErrorCode::DuplicatePassport,
            PipelineError::StorageFailed(_) => VerifyErrorCode::StorageFailed,
            PipelineError::Internal(_) => VerifyErrorCode::InternalError,
        }
    }

    pub fn severity(&self) -> FailureClass {
        match self {
            PipelineError::VerifierUnavailable(_) => FailureClass::Upstream,
            PipelineError::StorageFailed(_) | PipelineError::Internal(_) => FailureClass::Internal,
            _ => FailureClass::Client,
        }
    }

    /// Reason safe to hand back to a client. Infrastructure detail stays in
    /// the logs.
    pub fn public_reason(&self) -> String {
        match self {
            PipelineError::VerifierUnavailable(_) => {
                "proof verification service is unavailable".to_string()
            }
            PipelineError::StorageFailed(_) => "failed to store verification record".to_string(),
            PipelineError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<VerifierError> for PipelineError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::Rejected(reason) => PipelineError::VerificationFailed(reason),
            VerifierError::Unreachable(detail) | VerifierError::MalformedResponse(detail) => {
                PipelineError::VerifierUnavailable(detail)
            }
        }
    }
}

// ============================================================================
// Success
// ============================================================================

/// Everything a completed verification hands back to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct VerifySuccess {
    pub attestation: AttestationKind,
    pub user_identifier: String,
    pub account_id: String,
    pub signature_b64: String,
    pub disclose: DiscloseOutput,
    pub transaction_hash: String,
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct VerificationPipeline {
    verifier: Arc<dyn ProofVerifier>,
    rpc: Arc<dyn ChainRpc>,
    registry: Arc<IdentityRegistry>,
    nonces: Arc<dyn NonceStore>,
    sessions: Arc<dyn SessionStore>,
    keys: Arc<SigningKeyPool>,
    policy: VerificationPolicy,
}

impl VerificationPipeline {
    pub fn new(
        verifier: Arc<dyn ProofVerifier>,
        rpc: Arc<dyn ChainRpc>,
        registry: Arc<IdentityRegistry>,
        nonces: Arc<dyn NonceStore>,
        sessions: Arc<dyn SessionStore>,
        keys: Arc<SigningKeyPool>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            verifier,
            rpc,
            registry,
            nonces,
            sessions,
            keys,
            policy,
        }
    }

    /// Run a submission through the full pipeline.
    pub async fn handle_submission(
        &self,
        body: SubmissionBody,
    ) -> Result<VerifySuccess, PipelineError> {
        let request = body.into_request().map_err(PipelineError::MissingFields)?;

        let outcome = self.verifier.verify(&request).await?;
        let session_id = outcome.user_identifier.clone();
        self.project(SessionProjection::pending(&session_id)).await;

        match self.complete(&request, &outcome).await {
            Ok(success) => {
                self.project(SessionProjection::success(&session_id, &success.account_id))
                    .await;
                tracing::info!(
                    session_id = %session_id,
                    account_id = %success.account_id,
                    tx_hash = %success.transaction_hash,
                    "verification completed"
                );
                Ok(success)
            }
            Err(err) => {
                self.project(SessionProjection::error(
                    &session_id,
                    err.code(),
                    &err.public_reason(),
                ))
                .await;
                tracing::warn!(
                    session_id = %session_id,
                    code = %err.code(),
                    error = %err,
                    "verification failed"
                );
                Err(err)
            }
        }
    }

    /// Stages that run after the proof itself has been accepted.
    async fn complete(
        &self,
        request: &VerificationRequest,
        outcome: &VerifierOutcome,
    ) -> Result<VerifySuccess, PipelineError> {
        let flags = &outcome.validity;
        if !flags.is_minimum_age_valid {
            return Err(PipelineError::MinimumAgeNotMet);
        }
        if self.policy.sanctions_check_enabled && flags.is_ofac_match {
            return Err(PipelineError::SanctionsCheckFailed);
        }
        if !flags.is_valid {
            return Err(PipelineError::VerificationFailed(
                "verifier reported the proof as not valid".to_string(),
            ));
        }

        let nullifier = outcome
            .disclose
            .nullifier
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(PipelineError::NullifierMissing)?;

        let payload = SignaturePayload::extract(&outcome.user_defined_data)
            .map_err(|e| PipelineError::SignatureMissing(e.to_string()))?;
        let nonce = payload
            .decode_nonce()
            .map_err(|e| PipelineError::SignatureInvalid(e.to_string()))?;

        let now_ms = Utc::now().timestamp_millis();
        let age_ms = check_freshness(
            payload.timestamp_ms,
            now_ms,
            self.policy.max_signature_age,
            self.policy.clock_skew,
        )
        .map_err(|e| match e {
            FreshnessError::TooOld { age_ms } => PipelineError::SignatureExpired { age_ms },
            other => PipelineError::TimestampInvalid(other.to_string()),
        })?;

        let signed = SignedMessagePayload::new(&self.policy.challenge, nonce, &self.policy.recipient);
        verify_signed_message(&signed, &payload.public_key, &payload.signature_b64)
            .map_err(|e| PipelineError::SignatureInvalid(e.to_string()))?;

        self.confirm_signer_authority(&payload.account_id, &payload.public_key)
            .await?;

        let ttl = self.policy.reservation_ttl(age_ms);
        let reserved = self
            .nonces
            .reserve(&payload.account_id, &nonce_to_b64(&nonce), ttl)
            .await
            .map_err(|e| PipelineError::Internal(format!("nonce store: {e}")))?;
        if !reserved {
            return Err(PipelineError::SignatureInvalid(
                "nonce already used".to_string(),
            ));
        }

        // Cheap duplicate check before the chain write; the contract still
        // rejects duplicates if this view misses one.
        match self.registry.is_nullifier_used(nullifier).await {
            Ok(true) => return Err(PipelineError::DuplicatePassport),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "duplicate pre-check failed, deferring to contract");
            }
        }

        let record = VerifiedRecord::new(request, nullifier, &payload, &nonce, now_ms);
        let committed = self
            .registry
            .store_record(&self.keys, &record)
            .await
            .map_err(|e| match e {
                StoreRecordError::Duplicate => PipelineError::DuplicatePassport,
                StoreRecordError::Chain(chain) => PipelineError::StorageFailed(chain.to_string()),
            })?;

        Ok(VerifySuccess {
            attestation: request.attestation,
            user_identifier: outcome.user_identifier.clone(),
            account_id: payload.account_id.clone(),
            signature_b64: payload.signature_b64.clone(),
            disclose: outcome.disclose.clone(),
            transaction_hash: committed.transaction_hash,
        })
    }

    /// Confirm the signing key is a full-access key on the claimed account.
    ///
    /// Any failure to confirm, including RPC trouble, counts as not
    /// authorized. The check is advisory about WHY, so the detail is logged
    /// but the caller always sees an invalid-signature rejection.
    async fn confirm_signer_authority(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<(), PipelineError> {
        match self.rpc.view_access_key(account_id, public_key).await {
            Ok(view) if view.is_full_access() => Ok(()),
            Ok(_) => Err(PipelineError::SignatureInvalid(
                "signing key lacks full-access permission".to_string(),
            )),
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    public_key = %public_key,
                    error = %e,
                    "signer authority check failed"
                );
                Err(PipelineError::SignatureInvalid(
                    "signing key is not registered on the claimed account".to_string(),
                ))
            }
        }
    }

    /// Best-effort projection write. The pipeline result never depends on it.
    async fn project(&self, projection: SessionProjection) {
        if let Err(e) = self.sessions.upsert(projection).await {
            tracing::warn!(error = %e, "session projection write failed");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
