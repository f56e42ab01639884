//! In-process metrics snapshot

use axum::{extract::State, Json};
use geoqa_common::metrics::MetricsSnapshot;

use crate::AppState;

/// Current counters. The Prometheus exporter serves the same events on its
/// own port.
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[cfg(test)]
mod tests {
    use crate::test_support::router;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_metrics_count_requests() {
        let (app, _) = router().await;

        let ask = Request::builder()
            .method("POST")
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "question": "Calculate the settlement for load=100 kN and E=20000 kPa" })
                    .to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(ask).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["requests"]["total"], 1);
        assert_eq!(body["questions"]["total"], 1);
        assert_eq!(body["tool_calls"]["settlement"], 1);
        assert_eq!(body["llm"]["calls"], 0);
    }
}
