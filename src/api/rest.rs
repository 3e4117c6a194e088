//! Router assembly for the verification API.

use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{verification_status, verify_submission};
use crate::server::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verify", post(verify_submission))
        .route("/verify/status/:session_id", get(verification_status))
}
