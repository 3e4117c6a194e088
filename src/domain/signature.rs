//! Embedded wallet-signature payload: decoding, salvage, and freshness.
//!
//! The signature payload rides inside the proof's user-defined-data field,
//! whose carrier is size-constrained and lossy at the edges. Depending on the
//! client stack it shows up as a hex string, a raw string, a byte array, or a
//! byte-indexed object, usually padded with NUL bytes. The decode here is an
//! explicit discriminated dispatch, followed by a salvage step that recovers
//! the JSON object between the first `{` and the last `}`.

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Decode the user-defined-data carrier into a string, if possible.
///
/// Dispatch order: fully-hex even-length strings are hex-decoded; other
/// strings are taken as-is; arrays and byte-indexed objects are interpreted
/// as raw bytes. Anything else is undecodable.
pub fn decode_user_context(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            if is_fully_hex(s) {
                if let Ok(bytes) = hex::decode(s) {
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
            Some(s.clone())
        }
        Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                bytes.push(byte_from_value(item)?);
            }
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Value::Object(map) => {
            let mut indexed: Vec<(usize, u8)> = Vec::with_capacity(map.len());
            for (key, item) in map {
                let index: usize = key.parse().ok()?;
                indexed.push((index, byte_from_value(item)?));
            }
            indexed.sort_by_key(|(index, _)| *index);
            let bytes: Vec<u8> = indexed.into_iter().map(|(_, b)| b).collect();
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => None,
    }
}

fn is_fully_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn byte_from_value(value: &Value) -> Option<u8> {
    value.as_u64().and_then(|n| u8::try_from(n).ok())
}

/// Recover the JSON object embedded in a decoded carrier string: strip NUL
/// bytes, then take the substring between the first `{` and the last `}`.
pub fn salvage_json_object(decoded: &str) -> Option<String> {
    let cleaned: String = decoded.chars().filter(|c| *c != '\0').collect();
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    Some(cleaned[start..=end].to_string())
}

/// The wallet-signature payload a client embeds next to its proof.
///
/// The signed challenge and the recipient are deliberately not transmitted;
/// the server reconstructs both from configuration, so a signature only
/// verifies against the server's current expectations.
#[derive(Debug, Clone)]
pub struct SignaturePayload {
    pub account_id: String,
    /// Base64-encoded Ed25519 signature bytes.
    pub signature_b64: String,
    /// `ed25519:`-prefixed base58 public key text.
    pub public_key: String,
    /// Raw nonce as transmitted (base64 string or byte array).
    pub nonce: Value,
    /// Client-claimed signing time in Unix milliseconds; 0 when absent.
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignaturePayload {
    account_id: Option<String>,
    signature: Option<String>,
    public_key: Option<String>,
    nonce: Option<Value>,
    timestamp: Option<i64>,
}

/// Why the embedded payload could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadExtractError {
    #[error("user-defined data could not be decoded to text")]
    Undecodable,
    #[error("no JSON object found in user-defined data")]
    NoJsonObject,
    #[error("embedded payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("embedded payload is missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
}

impl SignaturePayload {
    /// Extract and parse the payload from the verifier's user-defined-data.
    pub fn extract(user_defined: &Value) -> Result<Self, PayloadExtractError> {
        let decoded =
            decode_user_context(user_defined).ok_or(PayloadExtractError::Undecodable)?;
        let object = salvage_json_object(&decoded).ok_or(PayloadExtractError::NoJsonObject)?;
        let raw: RawSignaturePayload = serde_json::from_str(&object)
            .map_err(|e| PayloadExtractError::Malformed(e.to_string()))?;

        let mut missing = Vec::new();
        if raw.account_id.is_none() {
            missing.push("accountId");
        }
        if raw.signature.is_none() {
            missing.push("signature");
        }
        if raw.public_key.is_none() {
            missing.push("publicKey");
        }
        if raw.nonce.is_none() {
            missing.push("nonce");
        }
        if !missing.is_empty() {
            return Err(PayloadExtractError::MissingFields(missing));
        }

        match (raw.account_id, raw.signature, raw.public_key, raw.nonce) {
            (Some(account_id), Some(signature_b64), Some(public_key), Some(nonce)) => {
                Ok(SignaturePayload {
                    account_id,
                    signature_b64,
                    public_key,
                    nonce,
                    timestamp_ms: raw.timestamp.unwrap_or(0),
                })
            }
            _ => Err(PayloadExtractError::MissingFields(missing)),
        }
    }

    /// Decode the transmitted nonce, requiring exactly 32 bytes.
    pub fn decode_nonce(&self) -> Result<[u8; 32], NonceError> {
        let bytes = match &self.nonce {
            Value::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map_err(|_| NonceError::Undecodable)?,
            Value::Array(items) => {
                let mut bytes = Vec::with_capacity(items.len());
                for item in items {
                    bytes.push(byte_from_value(item).ok_or(NonceError::Undecodable)?);
                }
                bytes
            }
            _ => return Err(NonceError::Undecodable),
        };
        let len = bytes.len();
        <[u8; 32]>::try_from(bytes).map_err(|_| NonceError::WrongLength(len))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    #[error("nonce is not base64 or a byte array")]
    Undecodable,
    #[error("nonce must decode to exactly 32 bytes, got {0}")]
    WrongLength(usize),
}

/// Canonical text form used as the reservation key, regardless of how the
/// client transmitted the nonce.
pub fn nonce_to_b64(nonce: &[u8; 32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Why a signature timestamp was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FreshnessError {
    #[error("timestamp is zero or absent")]
    Missing,
    #[error("signature is {age_ms} ms old")]
    TooOld { age_ms: i64 },
    #[error("signature timestamp is too far in the future (age {age_ms} ms)")]
    InFuture { age_ms: i64 },
}

/// Check a claimed signing time against the freshness window.
///
/// Accepts ages in `[-skew, max_age + skew]` inclusive on both ends and
/// returns the age for TTL derivation.
pub fn check_freshness(
    timestamp_ms: i64,
    now_ms: i64,
    max_age: Duration,
    skew: Duration,
) -> Result<i64, FreshnessError> {
    if timestamp_ms <= 0 {
        return Err(FreshnessError::Missing);
    }
    let age_ms = now_ms - timestamp_ms;
    let max_ms = max_age.as_millis() as i64 + skew.as_millis() as i64;
    if age_ms > max_ms {
        return Err(FreshnessError::TooOld { age_ms });
    }
    if age_ms < -(skew.as_millis() as i64) {
        return Err(FreshnessError::InFuture { age_ms });
    }
    Ok(age_ms)
}
