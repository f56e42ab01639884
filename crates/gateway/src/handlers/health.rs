//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
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
    pub index: CheckResult,
    pub language_model: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn up(detail: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            detail: Some(detail.into()),
        }
    }

    fn down(detail: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            detail: Some(detail.into()),
        }
    }
}

/// Liveness check - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness check. An empty index makes the service not ready; a missing
/// language model only degrades answers to the deterministic fallback.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let index = if state.indexed_chunks > 0 {
        CheckResult::up(format!("{} chunks", state.indexed_chunks))
    } else {
        CheckResult::down("vector index is empty")
    };

    let language_model = if state.llm_configured {
        CheckResult::up(
            state
                .config
                .llm
                .model
                .clone()
                .unwrap_or_else(|| "configured".to_string()),
        )
    } else {
        CheckResult {
            status: "degraded".to_string(),
            detail: Some("no API key; answers use the fallback".to_string()),
        }
    };

    let ready = index.status == "up";
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                index,
                language_model,
            },
        }),
    )
}
