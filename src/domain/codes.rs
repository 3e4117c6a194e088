//! Stable machine-readable failure codes for the verification flow.
//!
//! These codes are part of the wire contract: clients branch on them
//! programmatically, so variants are append-only and renames are breaking.

use serde::{Deserialize, Serialize};

/// Terminal failure classification for a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifyErrorCode {
    /// Request body is malformed or required fields are absent.
    MissingFields,
    /// Proof did not verify, or the upstream verifier failed/misbehaved.
    VerificationFailed,
    /// Proof verified but the minimum-age disclosure did not pass.
    MinimumAgeNotMet,
    /// Proof verified but the sanctions screening matched.
    OfacCheckFailed,
    /// Proof disclosed no uniqueness nullifier.
    NullifierMissing,
    /// Embedded wallet signature payload absent or unparseable.
    NearSignatureMissing,
    /// Signature, nonce, signer authority, or replay check failed.
    NearSignatureInvalid,
    /// Signature timestamp absent, zero, or too far in the future.
    SignatureTimestampInvalid,
    /// Signature timestamp older than the freshness window.
    SignatureExpired,
    /// The nullifier or account already has a verification record.
    DuplicatePassport,
    /// Chain write failed for a reason other than duplication.
    StorageFailed,
    /// Configuration or unexpected internal failure.
    InternalError,
}

impl std::fmt::Display for VerifyErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            VerifyErrorCode::MissingFields => "MISSING_FIELDS",
            VerifyErrorCode::VerificationFailed => "VERIFICATION_FAILED",
            VerifyErrorCode::MinimumAgeNotMet => "MINIMUM_AGE_NOT_MET",
            VerifyErrorCode::OfacCheckFailed => "OFAC_CHECK_FAILED",
            VerifyErrorCode::NullifierMissing => "NULLIFIER_MISSING",
            VerifyErrorCode::NearSignatureMissing => "NEAR_SIGNATURE_MISSING",
            VerifyErrorCode::NearSignatureInvalid => "NEAR_SIGNATURE_INVALID",
            VerifyErrorCode::SignatureTimestampInvalid => "SIGNATURE_TIMESTAMP_INVALID",
            VerifyErrorCode::SignatureExpired => "SIGNATURE_EXPIRED",
            VerifyErrorCode::DuplicatePassport => "DUPLICATE_PASSPORT",
            VerifyErrorCode::StorageFailed => "STORAGE_FAILED",
            VerifyErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{code}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_matches_display() {
        let codes = [
            VerifyErrorCode::MissingFields,
            VerifyErrorCode::VerificationFailed,
            VerifyErrorCode::MinimumAgeNotMet,
            VerifyErrorCode::OfacCheckFailed,
            VerifyErrorCode::NullifierMissing,
            VerifyErrorCode::NearSignatureMissing,
            VerifyErrorCode::NearSignatureInvalid,
            VerifyErrorCode::SignatureTimestampInvalid,
            VerifyErrorCode::SignatureExpired,
            VerifyErrorCode::DuplicatePassport,
            VerifyErrorCode::StorageFailed,
            VerifyErrorCode::InternalError,
        ];
        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }

    #[test]
    fn test_wire_stability() {
        assert_eq!(
            serde_json::to_string(&VerifyErrorCode::NearSignatureInvalid).unwrap(),
            "\"NEAR_SIGNATURE_INVALID\""
        );
        assert_eq!(
            serde_json::to_string(&VerifyErrorCode::DuplicatePassport).unwrap(),
            "\"DUPLICATE_PASSPORT\""
        );
        let parsed: VerifyErrorCode = serde_json::from_str("\"OFAC_CHECK_FAILED\"").unwrap();
        assert_eq!(parsed, VerifyErrorCode::OfacCheckFailed);
    }
}
