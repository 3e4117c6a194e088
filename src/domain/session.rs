//! Pollable, non-authoritative session status records.
//!
//! A projection mirrors the most recent known state of one verification
//! attempt so a client can poll while the chain write is in flight. The
//! registry contract remains the source of truth; projections may lag, be
//! lost, or be reconstructed from chain state at any time.

use crate::domain::codes::VerifyErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Success,
    Error,
}

/// Current known state of one verification attempt, keyed by the
/// correlation id the client chose before proving.
#[derive(Debug, Clone, Serialize)]
pub struct SessionProjection {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<VerifyErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionProjection {
    pub fn pending(session_id: &str) -> Self {
        let now = Utc::now();
        SessionProjection {
            session_id: session_id.to_string(),
            account_id: None,
            status: SessionStatus::Pending,
            code: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn success(session_id: &str, account_id: &str) -> Self {
        let now = Utc::now();
        SessionProjection {
            session_id: session_id.to_string(),
            account_id: Some(account_id.to_string()),
            status: SessionStatus::Success,
            code: None,
            reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn error(session_id: &str, code: VerifyErrorCode, reason: &str) -> Self {
        let now = Utc::now();
        SessionProjection {
            session_id: session_id.to_string(),
            account_id: None,
            status: SessionStatus::Error,
            code: Some(code),
            reason: Some(reason.to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this projection has sat in `pending` beyond the grace period,
    /// meaning the chain should be consulted instead.
    pub fn is_stuck_pending(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Pending
            && now.signed_duration_since(self.updated_at).num_milliseconds()
                > grace.as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuck_pending_detection() {
        let mut projection = SessionProjection::pending("s-1");
        let grace = Duration::from_millis(5_000);

        assert!(!projection.is_stuck_pending(grace, Utc::now()));

        projection.updated_at = Utc::now() - chrono::Duration::milliseconds(6_000);
        assert!(projection.is_stuck_pending(grace, Utc::now()));

        // Terminal states are never stuck.
        projection.status = SessionStatus::Error;
        assert!(!projection.is_stuck_pending(grace, Utc::now()));
    }

    #[test]
    fn test_serialized_shape_omits_empty_fields() {
        let value = serde_json::to_value(SessionProjection::pending("s-2")).unwrap();
        assert_eq!(value["status"], "pending");
        assert!(value.get("code").is_none());
        assert!(value.get("reason").is_none());

        let err = SessionProjection::error("s-2", VerifyErrorCode::SignatureExpired, "too old");
        let value = serde_json::to_value(err).unwrap();
        assert_eq!(value["code"], "SIGNATURE_EXPIRED");
        assert_eq!(value["reason"], "too old");
    }
}
