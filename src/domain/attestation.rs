//! Proof submission types: attestation kinds, the Groth16-shaped proof
//! triple, and shape validation of the inbound request body.

use serde::{Deserialize, Serialize};

/// Which class of identity document a proof was derived from.
///
/// Transmitted as a bare number (`attestationId`) on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr,
)]
#[repr(u32)]
pub enum AttestationKind {
    /// Machine-readable passport.
    Passport = 1,
    /// Biometric identity card.
    BiometricIdCard = 2,
    /// National identity document.
    NationalId = 3,
}

impl AttestationKind {
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(AttestationKind::Passport),
            2 => Some(AttestationKind::BiometricIdCard),
            3 => Some(AttestationKind::NationalId),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttestationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttestationKind::Passport => "passport",
            AttestationKind::BiometricIdCard => "biometric-id-card",
            AttestationKind::NationalId => "national-id",
        };
        write!(f, "{name}")
    }
}

/// Groth16-shaped proof: two group elements `a` and `c`, and a 2x2 matrix `b`.
///
/// The elements are opaque decimal strings; this service never interprets
/// them, it only checks their shape and forwards them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofTriple {
    pub a: [String; 2],
    pub b: [[String; 2]; 2],
    pub c: [String; 2],
}

/// Raw submission body as received over the wire.
///
/// Every field is optional so that shape problems surface as a single
/// enumerated `MISSING_FIELDS` rejection instead of a serde abort on the
/// first absent member.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionBody {
    pub attestation_id: Option<u32>,
    pub proof: Option<RawProof>,
    pub public_signals: Option<Vec<String>>,
    pub user_context_data: Option<String>,
}

/// Unvalidated proof triple; lengths are checked during validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProof {
    pub a: Option<Vec<String>>,
    pub b: Option<Vec<Vec<String>>>,
    pub c: Option<Vec<String>>,
}

/// A fully-validated proof submission. Immutable once constructed; lives for
/// the duration of one request.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub attestation: AttestationKind,
    pub proof: ProofTriple,
    pub public_signals: Vec<String>,
    pub user_context: String,
}

impl SubmissionBody {
    /// Validate the request shape, collecting every offender so the caller
    /// can report them all at once.
    pub fn into_request(self) -> Result<VerificationRequest, Vec<String>> {
        let mut offenders = Vec::new();

        let attestation = match self.attestation_id {
            None => {
                offenders.push("attestationId".to_string());
                None
            }
            Some(raw) => match AttestationKind::from_u32(raw) {
                Some(kind) => Some(kind),
                None => {
                    offenders.push(format!(
                        "attestationId (unrecognized value {raw}; expected 1, 2 or 3)"
                    ));
                    None
                }
            },
        };

        let proof = match self.proof {
            None => {
                offenders.push("proof".to_string());
                None
            }
            Some(raw) => validate_proof(raw, &mut offenders),
        };

        let public_signals = match self.public_signals {
            None => {
                offenders.push("publicSignals".to_string());
                None
            }
            Some(signals) if signals.is_empty() => {
                offenders.push("publicSignals (must be non-empty)".to_string());
                None
            }
            Some(signals) => Some(signals),
        };

        let user_context = match self.user_context_data {
            None => {
                offenders.push("userContextData".to_string());
                None
            }
            Some(data) => Some(data),
        };

        match (attestation, proof, public_signals, user_context) {
            (Some(attestation), Some(proof), Some(public_signals), Some(user_context))
                if offenders.is_empty() =>
            {
                Ok(VerificationRequest {
                    attestation,
                    proof,
                    public_signals,
                    user_context,
                })
            }
            _ => Err(offenders),
        }
    }
}

fn validate_proof(raw: RawProof, offenders: &mut Vec<String>) -> Option<ProofTriple> {
    let a = match raw.a {
        None => {
            offenders.push("proof.a".to_string());
            None
        }
        Some(v) => match <[String; 2]>::try_from(v) {
            Ok(pair) => Some(pair),
            Err(v) => {
                offenders.push(format!("proof.a (expected 2 elements, got {})", v.len()));
                None
            }
        },
    };

    let b = match raw.b {
        None => {
            offenders.push("proof.b".to_string());
            None
        }
        Some(rows) => {
            let mut rows = rows.into_iter();
            let parsed = match (rows.next(), rows.next(), rows.next()) {
                (Some(r0), Some(r1), None) => {
                    match (<[String; 2]>::try_from(r0), <[String; 2]>::try_from(r1)) {
                        (Ok(first), Ok(second)) => Some([first, second]),
                        _ => None,
                    }
                }
                _ => None,
            };
            if parsed.is_none() {
                offenders.push("proof.b (expected a 2x2 matrix)".to_string());
            }
            parsed
        }
    };

    let c = match raw.c {
        None => {
            offenders.push("proof.c".to_string());
            None
        }
        Some(v) => match <[String; 2]>::try_from(v) {
            Ok(pair) => Some(pair),
            Err(v) => {
                offenders.push(format!("proof.c (expected 2 elements, got {})", v.len()));
                None
            }
        },
    };

    match (a, b, c) {
        (Some(a), Some(b), Some(c)) => Some(ProofTriple { a, b, c }),
        _ => None,
    }
}
