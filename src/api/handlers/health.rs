//! Liveness and readiness handlers.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::chain::BootstrapOutcome;
use crate::server::AppState;

/// `GET /health`: static liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Serialize)]
pub struct ReadyBody {
    pub status: &'static str,
    /// Signing lanes the key pool offers.
    pub lanes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_finished_at: Option<DateTime<Utc>>,
}

/// `GET /ready`
///
/// Reports the key-registration bootstrap outcome. A degraded pool means
/// fewer concurrent lanes, not an unusable service, so this always answers
/// 200 and leaves the judgement to the operator.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyBody> {
    let report = state.bootstrap.read().await;

    let status = match &report.outcome {
        None => "starting",
        Some(_) if report.is_degraded() => "degraded",
        Some(_) => "ready",
    };

    Json(ReadyBody {
        status,
        lanes: state.keys.len(),
        bootstrap: report.outcome.clone(),
        bootstrap_finished_at: report.finished_at,
    })
}
