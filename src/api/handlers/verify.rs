//! Proof submission handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::{ApiFailure, VerifySuccessBody};
use crate::domain::{SubmissionBody, VerifyErrorCode};
use crate::server::AppState;

/// `POST /api/verify`
///
/// Runs a proof submission through the verification pipeline and returns
/// either the success payload or a coded failure.
pub async fn verify_submission(
    State(state): State<AppState>,
    body: Result<Json<SubmissionBody>, JsonRejection>,
) -> Result<Json<VerifySuccessBody>, ApiFailure> {
    // A body that does not even deserialize gets the same code as one with
    // absent fields; clients treat both as "fix your request".
    let Json(body) = body.map_err(|rejection| {
        ApiFailure::new(
            StatusCode::BAD_REQUEST,
            VerifyErrorCode::MissingFields,
            format!("invalid request body: {}", rejection.body_text()),
        )
    })?;

    let success = state.pipeline.handle_submission(body).await?;
    Ok(Json(VerifySuccessBody::from(success)))
}
