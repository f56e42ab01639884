//! Question answering handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use geoqa_common::{
    errors::{AppError, TracedError},
    trace::TraceId,
};
use geoqa_pipeline::AnswerEnvelope;
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::AppState;

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    #[serde(default)]
    #[validate(length(max = 5000))]
    pub context: Option<String>,
}

/// The trace id is the request id set (or propagated) by the request-id layer
fn trace_id(headers: &HeaderMap) -> TraceId {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(TraceId::from_external)
        .unwrap_or_default()
}

/// Answer a question
pub async fn ask(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AnswerEnvelope>, TracedError> {
    let start = Instant::now();
    let trace_id = trace_id(&headers);

    let request = payload
        .map_err(|rejection| AppError::InvalidFormat {
            message: rejection.body_text(),
        })
        .and_then(|Json(request)| {
            request.validate().map_err(|e| AppError::Validation {
                field: e.field_errors().keys().next().map(|field| field.to_string()),
                message: e.to_string(),
            })?;
            Ok(request)
        });

    let request = match request {
        Ok(request) => request,
        Err(error) => {
            state.metrics.record_error(&error);
            state.metrics.record_request(false, start.elapsed());
            return Err(TracedError::new(trace_id, error));
        }
    };

    let run = state
        .orchestrator
        .run_with_deadline(
            trace_id,
            &request.question,
            request.context.as_deref(),
            state.config.request_timeout(),
        )
        .await?;

    Ok(Json(run.answer))
}
