//! External proof verifier adapter
//!
//! The pipeline depends on the [`ProofVerifier`] capability, never on the
//! concrete verification engine. The HTTP implementation forwards a
//! submission to the verifier service and schema-validates the untrusted
//! response before any field is read. Three failure classes matter
//! downstream: a well-formed rejection (the proof is bad), an unreachable
//! upstream, and a response whose shape cannot be trusted.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{json, Value};

use crate::domain::{VerificationRequest, VerifierOutcome};

/// Why a verification attempt produced no usable outcome.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    /// The verifier judged the proof invalid
    #[error("proof rejected: {0}")]
    Rejected(String),
    /// The verifier could not be reached, or failed server-side
    #[error("verifier unreachable: {0}")]
    Unreachable(String),
    /// The verifier answered with a shape that cannot be trusted
    #[error("verifier response malformed: {0}")]
    MalformedResponse(String),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofVerifier: Send + Sync {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerifierOutcome, VerifierError>;
}

/// Forwards submissions to the external verifier service over HTTP.
pub struct HttpProofVerifier {
    http: reqwest::Client,
    verify_url: String,
}

impl HttpProofVerifier {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, VerifierError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifierError::Unreachable(e.to_string()))?;
        Ok(Self {
            http,
            verify_url: format!("{}/verify", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl ProofVerifier for HttpProofVerifier {
    async fn verify(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerifierOutcome, VerifierError> {
        let body = json!({
            "attestationId": request.attestation.as_u32(),
            "proof": request.proof,
            "publicSignals": request.public_signals,
            "userContextData": request.user_context,
        });

        let response = self
            .http
            .post(&self.verify_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| VerifierError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(VerifierError::Unreachable(format!(
                "verifier returned {status}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| VerifierError::MalformedResponse(e.to_string()))?;

        // A well-formed rejection carries an `error` string whether the
        // upstream used a 2xx or a 4xx for it.
        if let Some(message) = payload.get("error").and_then(Value::as_str) {
            return Err(VerifierError::Rejected(message.to_string()));
        }
        if !status.is_success() {
            return Err(VerifierError::MalformedResponse(format!(
                "verifier returned {status} without an error body"
            )));
        }

        VerifierOutcome::from_untrusted(payload)
            .map_err(|e| VerifierError::MalformedResponse(e.to_string()))
    }
}
