//! Wire DTOs for the verification API.
//!
//! The submission body itself lives in `crate::domain` (it doubles as the
//! pipeline's input type); everything here is response-side shaping.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DiscloseOutput, SessionProjection, SessionStatus, VerifyErrorCode};
use crate::pipeline::VerifySuccess;

/// Body of a successful verification response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySuccessBody {
    pub status: &'static str,
    pub result: bool,
    pub attestation_id: u32,
    pub user_data: UserData,
    pub disclose_output: DiscloseOutput,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_id: String,
    pub near_account_id: String,
    pub near_signature: String,
}

impl From<VerifySuccess> for VerifySuccessBody {
    fn from(success: VerifySuccess) -> Self {
        VerifySuccessBody {
            status: "success",
            result: true,
            attestation_id: success.attestation.as_u32(),
            user_data: UserData {
                user_id: success.user_identifier,
                near_account_id: success.account_id,
                near_signature: success.signature_b64,
            },
            disclose_output: success.disclose,
        }
    }
}

/// Body of a status-poll response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub session_id: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<VerifyErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<SessionProjection> for StatusBody {
    fn from(projection: SessionProjection) -> Self {
        StatusBody {
            session_id: projection.session_id,
            status: projection.status,
            account_id: projection.account_id,
            code: projection.code,
            reason: projection.reason,
            updated_at: projection.updated_at,
        }
    }
}
