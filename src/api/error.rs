//! Failure responses for the verification API.
//!
//! Every failure body carries `status: "error"`, a human-readable reason,
//! and (for pipeline failures) a stable machine-readable code clients can
//! branch on. The HTTP status follows the failure class: the caller's fault
//! is 400, a misbehaving upstream is 502, our own trouble is 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::VerifyErrorCode;
use crate::pipeline::{FailureClass, PipelineError};

/// Wire body of a failed request.
#[derive(Debug, Clone, Serialize)]
pub struct FailureBody {
    pub status: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<VerifyErrorCode>,
}

/// A failure ready to be written out as an HTTP response.
#[derive(Debug, Clone)]
pub struct ApiFailure {
    pub http_status: StatusCode,
    pub body: FailureBody,
}

impl ApiFailure {
    pub fn new(http_status: StatusCode, code: VerifyErrorCode, reason: impl Into<String>) -> Self {
        Self {
            http_status,
            body: FailureBody {
                status: "error",
                reason: reason.into(),
                code: Some(code),
            },
        }
    }

    /// A 400 without a pipeline code, for request-shape problems the
    /// pipeline never saw (e.g. a malformed session id).
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            http_status: StatusCode::BAD_REQUEST,
            body: FailureBody {
                status: "error",
                reason: reason.into(),
                code: None,
            },
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            http_status: StatusCode::NOT_FOUND,
            body: FailureBody {
                status: "error",
                reason: reason.into(),
                code: None,
            },
        }
    }
}

impl From<PipelineError> for ApiFailure {
    fn from(err: PipelineError) -> Self {
        let http_status = match err.severity() {
            FailureClass::Client => StatusCode::BAD_REQUEST,
            FailureClass::Upstream => StatusCode::BAD_GATEWAY,
            FailureClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiFailure::new(http_status, err.code(), err.public_reason())
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        (self.http_status, Json(self.body)).into_response()
    }
}
