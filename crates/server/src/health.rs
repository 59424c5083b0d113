use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    started_at: DateTime<Utc>,
    sandbox_email: bool,
}

impl HealthState {
    pub fn new(sandbox_email: bool) -> Self {
        Self { started_at: Utc::now(), sandbox_email }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Liveness only. CRM and email providers are not checked; their failures
/// surface per request.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let mode = if state.sandbox_email { "sandbox email" } else { "live email" };
    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: format!(
                "qnc-server up since {} ({mode})",
                state.started_at.format("%Y-%m-%dT%H:%M:%SZ")
            ),
        },
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}
