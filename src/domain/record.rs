//! The durable on-chain verification record.

use crate::domain::attestation::{AttestationKind, ProofTriple, VerificationRequest};
use crate::domain::signature::{nonce_to_b64, SignaturePayload};
use serde::Serialize;

/// Everything the registry contract persists for one verified identity.
///
/// Written exactly once per (nullifier, account) by a successful pipeline
/// run and never mutated; the proof material is retained so the record can
/// be re-verified later without the original submission. Field names are the
/// contract's argument names.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedRecord {
    pub nullifier: String,
    pub account_id: String,
    pub attestation: u32,
    pub proof: ProofTriple,
    pub public_signals: Vec<String>,
    pub user_context: String,
    pub signature: SignatureRecord,
    /// Server-assigned commit time in Unix milliseconds.
    pub verified_at_ms: i64,
}

/// The wallet signature exactly as verified, in canonical encodings.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureRecord {
    pub signature_b64: String,
    pub public_key: String,
    pub nonce_b64: String,
    pub timestamp_ms: i64,
}

impl VerifiedRecord {
    pub fn new(
        request: &VerificationRequest,
        nullifier: &str,
        payload: &SignaturePayload,
        nonce: &[u8; 32],
        verified_at_ms: i64,
    ) -> Self {
        VerifiedRecord {
            nullifier: nullifier.to_string(),
            account_id: payload.account_id.clone(),
            attestation: request.attestation.as_u32(),
            proof: request.proof.clone(),
            public_signals: request.public_signals.clone(),
            user_context: request.user_context.clone(),
            signature: SignatureRecord {
                signature_b64: payload.signature_b64.clone(),
                public_key: payload.public_key.clone(),
                nonce_b64: nonce_to_b64(nonce),
                timestamp_ms: payload.timestamp_ms,
            },
            verified_at_ms,
        }
    }

    /// Attestation kind, if the stored discriminator is still recognized.
    pub fn attestation_kind(&self) -> Option<AttestationKind> {
        AttestationKind::from_u32(self.attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contract_argument_shape() {
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
            nonce: json!("ignored"),
            timestamp_ms: 1_700_000_000_000,
        };
        let record = VerifiedRecord::new(&request, "null-1", &payload, &[0u8; 32], 42);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["nullifier"], "null-1");
        assert_eq!(value["account_id"], "alice.near");
        assert_eq!(value["attestation"], 1);
        assert_eq!(value["proof"]["b"][1][0], "5");
        assert_eq!(value["signature"]["nonce_b64"], json!("A".repeat(43) + "="));
        assert_eq!(value["verified_at_ms"], 42);
        assert_eq!(record.attestation_kind(), Some(AttestationKind::Passport));
    }
}
