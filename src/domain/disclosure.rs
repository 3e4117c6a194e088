//! The external verifier's result shape and its strict validation.
//!
//! The verifier response crosses a trust boundary: nothing here may assume a
//! field is present or correctly typed. Every read goes through
//! [`VerifierOutcome::from_untrusted`], which turns shape problems into a
//! descriptive violation instead of a panic or a silent default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-rule outcome flags disclosed by the proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityFlags {
    /// Overall cryptographic validity of the proof.
    pub is_valid: bool,
    /// Whether the minimum-age disclosure passed.
    pub is_minimum_age_valid: bool,
    /// Whether the holder matched a sanctions list. `true` means a hit.
    pub is_ofac_match: bool,
}

/// Attributes the proof chose to disclose.
///
/// Only the nullifier is load-bearing for this service; everything else is
/// echoed back to the client and selectively persisted on-chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscloseOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuing_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    /// Attributes this service does not interpret but passes through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Validated verifier response.
#[derive(Debug, Clone)]
pub struct VerifierOutcome {
    pub validity: ValidityFlags,
    pub disclose: DiscloseOutput,
    /// Session correlation id chosen by the client before proving.
    pub user_identifier: String,
    /// Carrier for the embedded wallet-signature payload; decoded later.
    pub user_defined_data: Value,
}

/// A description of where and how the verifier response violated the
/// expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SchemaViolation(pub String);

impl VerifierOutcome {
    /// Validate an untrusted verifier response field by field.
    pub fn from_untrusted(value: Value) -> Result<Self, SchemaViolation> {
        let obj = value
            .as_object()
            .ok_or_else(|| SchemaViolation("response is not a JSON object".to_string()))?;

        let validity_raw = obj
            .get("validity")
            .ok_or_else(|| SchemaViolation("missing field `validity`".to_string()))?
            .as_object()
            .ok_or_else(|| SchemaViolation("`validity` is not an object".to_string()))?;

        let validity = ValidityFlags {
            is_valid: require_bool(validity_raw, "isValid")?,
            is_minimum_age_valid: require_bool(validity_raw, "isMinimumAgeValid")?,
            is_ofac_match: require_bool(validity_raw, "isOfacMatch")?,
        };

        let disclose_raw = obj
            .get("disclose")
            .ok_or_else(|| SchemaViolation("missing field `disclose`".to_string()))?;
        if !disclose_raw.is_object() {
            return Err(SchemaViolation("`disclose` is not an object".to_string()));
        }
        let disclose: DiscloseOutput = serde_json::from_value(disclose_raw.clone())
            .map_err(|e| SchemaViolation(format!("`disclose`: {e}")))?;

        let user_identifier = obj
            .get("userIdentifier")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaViolation("`userIdentifier`: expected a string".to_string()))?
            .to_string();
        if user_identifier.is_empty() {
            return Err(SchemaViolation("`userIdentifier` is empty".to_string()));
        }

        let user_defined_data = obj.get("userDefinedData").cloned().unwrap_or(Value::Null);

        Ok(VerifierOutcome {
            validity,
            disclose,
            user_identifier,
            user_defined_data,
        })
    }
}

fn require_bool(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<bool, SchemaViolation> {
    obj.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| SchemaViolation(format!("`validity.{field}`: expected a boolean")))
}
