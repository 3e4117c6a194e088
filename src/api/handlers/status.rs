//! Session status polling handler.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{ApiFailure, StatusBody};
use crate::domain::SessionProjection;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Optional account hint enabling the chain fallback when the
    /// projection is missing or stale.
    pub account: Option<String>,
}

/// `GET /api/verify/status/:session_id`
///
/// Serves the session projection when it is conclusive. When the projection
/// is absent or stuck pending past the grace period and the caller supplied
/// an account hint, the registry contract is consulted instead; the contract
/// wins, and the projection is patched to match it.
pub async fn verification_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusBody>, ApiFailure> {
    // Reject malformed ids before touching any store.
    if Uuid::parse_str(&session_id).is_err() {
        return Err(ApiFailure::bad_request("session id must be a UUID"));
    }

    let projection = match state.sessions.get(&session_id).await {
        Ok(projection) => projection,
        Err(e) => {
            tracing::warn!(error = %e, "session store read failed, falling back to chain");
            None
        }
    };

    match projection {
        Some(p) if p.is_stuck_pending(state.status_fallback_grace, Utc::now()) => {
            if let Some(patched) = chain_truth(&state, &session_id, query.account.as_deref()).await
            {
                return Ok(Json(patched.into()));
            }
            Ok(Json(p.into()))
        }
        Some(p) => Ok(Json(p.into())),
        None => {
            if let Some(patched) = chain_truth(&state, &session_id, query.account.as_deref()).await
            {
                return Ok(Json(patched.into()));
            }
            Err(ApiFailure::not_found(
                "no verification attempt found for this session",
            ))
        }
    }
}

/// Ask the registry whether the hinted account is verified; on yes, patch
/// the projection so later polls are served from the store again.
async fn chain_truth(
    state: &AppState,
    session_id: &str,
    account: Option<&str>,
) -> Option<SessionProjection> {
    let account = account?;

    match state.registry.is_account_verified(account).await {
        Ok(true) => {
            let patched = SessionProjection::success(session_id, account);
            if let Err(e) = state.sessions.upsert(patched.clone()).await {
                tracing::warn!(error = %e, "projection patch after chain fallback failed");
            }
            Some(patched)
        }
        Ok(false) => None,
        Err(e) => {
            tracing::warn!(account_id = %account, error = %e, "chain fallback query failed");
            None
        }
    }
}
