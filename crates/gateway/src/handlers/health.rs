//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub datastore: CheckResult,
    pub operations: CheckResult,
    pub vectors: CheckResult,
    pub llm_model: String,
    pub embedding_model: String,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
}

impl CheckResult {
    fn from_up(up: bool) -> Self {
        Self {
            status: if up { "up" } else { "down" }.to_string(),
        }
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Healthy".to_string(),
    })
}

/// Readiness probe - pings every database
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.dbs.ping().await;
    let all_up = health.all_up();

    let body = ReadyResponse {
        status: if all_up { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            datastore: CheckResult::from_up(health.datastore),
            operations: CheckResult::from_up(health.operations),
            vectors: CheckResult::from_up(health.vectors),
            llm_model: state.llm.model_name().to_string(),
            embedding_model: state.embedder.model_name().to_string(),
        },
    };

    let status = if all_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support;

    #[tokio::test]
    async fn test_health_is_healthy() {
        let Json(body) = health().await;
        assert_eq!(body.status, "Healthy");
    }

    #[tokio::test]
    async fn test_ready_reports_unavailable_databases() {
        let response = ready(State(test_support::state())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_disabled_without_recorder() {
        let response = metrics(State(test_support::state())).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
