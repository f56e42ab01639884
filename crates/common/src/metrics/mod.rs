//! Metrics and observability utilities
//!
//! Two layers:
//! - `MetricsRegistry`: injected, process-wide monotonic counters backing the
//!   JSON `/metrics` surface (atomic, lock-free, resettable in tests)
//! - the `metrics` facade: every increment is mirrored as a Prometheus-style
//!   counter or histogram under the `geoqa_` prefix
//!
//! Emission is fire-and-forget; nothing here can fail the answer path.

use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::errors::{AppError, ErrorKind};
use crate::trace::TraceId;

/// Metrics prefix for all Geotech Q&A metrics
pub const METRICS_PREFIX: &str = "geoqa";

/// Histogram buckets for pipeline stage latency (in seconds)
pub const STAGE_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s - synthesis attempt timeout
    10.00,  // 10s
    30.00,  // 30s - request deadline
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of answered requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end request latency in seconds"
    );

    describe_counter!(
        format!("{}_questions_total", METRICS_PREFIX),
        Unit::Count,
        "Total questions received"
    );

    describe_counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total calculator invocations"
    );

    describe_counter!(
        format!("{}_llm_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total LLM synthesis attempts"
    );

    describe_counter!(
        format!("{}_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total errors by kind"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Pipeline stage latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Which calculator a tool call used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    BearingCapacity,
    Settlement,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::BearingCapacity => "bearing_capacity",
            ToolKind::Settlement => "settlement",
        }
    }
}

/// Outcome of a pipeline stage, used as a metric label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Success,
    Degraded,
}

impl StageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Success => "success",
            StageOutcome::Degraded => "degraded",
        }
    }
}

/// Process-wide counter registry.
///
/// Counters only ever increase (except through `reset`); no ordering is
/// guaranteed between different counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    requests_successful: AtomicU64,
    requests_failed: AtomicU64,

    questions_total: AtomicU64,
    questions_with_context: AtomicU64,

    tool_calls_total: AtomicU64,
    bearing_capacity_calculations: AtomicU64,
    settlement_calculations: AtomicU64,
    tool_call_failures: AtomicU64,

    llm_calls: AtomicU64,
    llm_successes: AtomicU64,
    llm_failures: AtomicU64,
    llm_retries: AtomicU64,

    validation_errors: AtomicU64,
    timeout_errors: AtomicU64,
    dependency_errors: AtomicU64,
    internal_errors: AtomicU64,

    total_processing_micros: AtomicU64,
    // 0 means "no request yet"
    first_request_millis: AtomicU64,
    last_request_millis: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished request and its end-to-end latency
    pub fn record_request(&self, success: bool, duration: Duration) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_successful.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_processing_micros
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        let now = Utc::now().timestamp_millis().max(1) as u64;
        let _ = self.first_request_millis.compare_exchange(
            0,
            now,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        self.last_request_millis.fetch_max(now, Ordering::Relaxed);

        let status = if success { "success" } else { "failure" };
        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "status" => status
        )
        .increment(1);
        histogram!(format!("{}_request_duration_seconds", METRICS_PREFIX))
            .record(duration.as_secs_f64());
    }

    pub fn record_question(&self, has_context: bool) {
        self.questions_total.fetch_add(1, Ordering::Relaxed);
        if has_context {
            self.questions_with_context.fetch_add(1, Ordering::Relaxed);
        }
        counter!(
            format!("{}_questions_total", METRICS_PREFIX),
            "context" => if has_context { "yes" } else { "no" }
        )
        .increment(1);
    }

    pub fn record_tool_call(&self, tool: ToolKind, success: bool) {
        self.tool_calls_total.fetch_add(1, Ordering::Relaxed);
        match tool {
            ToolKind::BearingCapacity => {
                self.bearing_capacity_calculations.fetch_add(1, Ordering::Relaxed)
            }
            ToolKind::Settlement => self.settlement_calculations.fetch_add(1, Ordering::Relaxed),
        };
        if !success {
            self.tool_call_failures.fetch_add(1, Ordering::Relaxed);
        }
        counter!(
            format!("{}_tool_calls_total", METRICS_PREFIX),
            "tool" => tool.as_str(),
            "status" => if success { "success" } else { "failure" }
        )
        .increment(1);
    }

    /// Record one LLM attempt; `retry` marks attempts after the first
    pub fn record_llm_call(&self, success: bool, retry: bool) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        if retry {
            self.llm_retries.fetch_add(1, Ordering::Relaxed);
        }
        if success {
            self.llm_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.llm_failures.fetch_add(1, Ordering::Relaxed);
        }
        counter!(
            format!("{}_llm_calls_total", METRICS_PREFIX),
            "status" => if success { "success" } else { "failure" },
            "retry" => if retry { "yes" } else { "no" }
        )
        .increment(1);
    }

    /// Count an error under its caller-visible category
    pub fn record_error(&self, error: &AppError) {
        let kind = error.kind();
        let slot = match kind {
            ErrorKind::ClientError => &self.validation_errors,
            ErrorKind::Timeout => &self.timeout_errors,
            ErrorKind::ServiceUnavailable => &self.dependency_errors,
            ErrorKind::ServerError => &self.internal_errors,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!(
            format!("{}_errors_total", METRICS_PREFIX),
            "kind" => error_kind_label(kind)
        )
        .increment(1);
    }

    /// Emit a timing event for one pipeline stage of one request
    pub fn record_stage(
        &self,
        trace_id: &TraceId,
        stage: &'static str,
        outcome: StageOutcome,
        duration: Duration,
    ) {
        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => stage,
            "outcome" => outcome.as_str()
        )
        .record(duration.as_secs_f64());

        tracing::debug!(
            trace_id = %trace_id,
            stage,
            outcome = outcome.as_str(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Stage finished"
        );
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        let requests_total = load(&self.requests_total);
        let requests_successful = load(&self.requests_successful);
        let questions_total = load(&self.questions_total);
        let questions_with_context = load(&self.questions_with_context);
        let tool_total = load(&self.tool_calls_total);
        let tool_failures = load(&self.tool_call_failures);
        let llm_calls = load(&self.llm_calls);
        let llm_successes = load(&self.llm_successes);
        let total_ms = load(&self.total_processing_micros) as f64 / 1000.0;

        let validation = load(&self.validation_errors);
        let timeout = load(&self.timeout_errors);
        let dependency = load(&self.dependency_errors);
        let internal = load(&self.internal_errors);

        MetricsSnapshot {
            requests: RequestStats {
                total: requests_total,
                successful: requests_successful,
                failed: load(&self.requests_failed),
                success_rate: percentage(requests_successful, requests_total),
            },
            questions: QuestionStats {
                total: questions_total,
                with_context: questions_with_context,
                context_rate: percentage(questions_with_context, questions_total),
            },
            tool_calls: ToolCallStats {
                total: tool_total,
                bearing_capacity: load(&self.bearing_capacity_calculations),
                settlement: load(&self.settlement_calculations),
                failures: tool_failures,
                success_rate: percentage(tool_total.saturating_sub(tool_failures), tool_total),
            },
            llm: LlmStats {
                calls: llm_calls,
                successes: llm_successes,
                failures: load(&self.llm_failures),
                retries: load(&self.llm_retries),
                success_rate: percentage(llm_successes, llm_calls),
            },
            performance: PerformanceStats {
                total_processing_time_ms: round2(total_ms),
                average_response_time_ms: if requests_total > 0 {
                    round2(total_ms / requests_total as f64)
                } else {
                    0.0
                },
            },
            errors: ErrorStats {
                validation,
                timeout,
                dependency,
                internal,
                total: validation + timeout + dependency + internal,
            },
            first_request: millis_to_datetime(load(&self.first_request_millis)),
            last_request: millis_to_datetime(load(&self.last_request_millis)),
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.requests_total,
            &self.requests_successful,
            &self.requests_failed,
            &self.questions_total,
            &self.questions_with_context,
            &self.tool_calls_total,
            &self.bearing_capacity_calculations,
            &self.settlement_calculations,
            &self.tool_call_failures,
            &self.llm_calls,
            &self.llm_successes,
            &self.llm_failures,
            &self.llm_retries,
            &self.validation_errors,
            &self.timeout_errors,
            &self.dependency_errors,
            &self.internal_errors,
            &self.total_processing_micros,
            &self.first_request_millis,
            &self.last_request_millis,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        tracing::info!("Metrics reset");
    }
}

fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ClientError => "validation",
        ErrorKind::Timeout => "timeout",
        ErrorKind::ServiceUnavailable => "dependency",
        ErrorKind::ServerError => "internal",
    }
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn millis_to_datetime(millis: u64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Serializable view of the registry, rendered by `/metrics`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub requests: RequestStats,
    pub questions: QuestionStats,
    pub tool_calls: ToolCallStats,
    pub llm: LlmStats,
    pub performance: PerformanceStats,
    pub errors: ErrorStats,
    pub first_request: Option<DateTime<Utc>>,
    pub last_request: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionStats {
    pub total: u64,
    pub with_context: u64,
    pub context_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallStats {
    pub total: u64,
    pub bearing_capacity: u64,
    pub settlement: u64,
    pub failures: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmStats {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceStats {
    pub total_processing_time_ms: f64,
    pub average_response_time_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorStats {
    pub validation: u64,
    pub timeout: u64,
    pub dependency: u64,
    pub internal: u64,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stage_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in STAGE_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
        assert!(STAGE_BUCKETS.contains(&5.0));
    }

    #[test]
    fn test_request_counters_and_average() {
        let registry = MetricsRegistry::new();
        registry.record_request(true, Duration::from_millis(100));
        registry.record_request(false, Duration::from_millis(300));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.requests.total, 2);
        assert_eq!(snapshot.requests.successful, 1);
        assert_eq!(snapshot.requests.failed, 1);
        assert_eq!(snapshot.requests.success_rate, 50.0);
        assert_eq!(snapshot.performance.total_processing_time_ms, 400.0);
        assert_eq!(snapshot.performance.average_response_time_ms, 200.0);
        assert!(snapshot.first_request.is_some());
        assert!(snapshot.first_request <= snapshot.last_request);
    }

    #[test]
    fn test_tool_and_llm_counters() {
        let registry = MetricsRegistry::new();
        registry.record_tool_call(ToolKind::BearingCapacity, true);
        registry.record_tool_call(ToolKind::Settlement, false);
        registry.record_llm_call(false, false);
        registry.record_llm_call(true, true);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.tool_calls.total, 2);
        assert_eq!(snapshot.tool_calls.bearing_capacity, 1);
        assert_eq!(snapshot.tool_calls.settlement, 1);
        assert_eq!(snapshot.tool_calls.failures, 1);
        assert_eq!(snapshot.llm.calls, 2);
        assert_eq!(snapshot.llm.successes, 1);
        assert_eq!(snapshot.llm.failures, 1);
        assert_eq!(snapshot.llm.retries, 1);
    }

    #[test]
    fn test_errors_grouped_by_kind() {
        let registry = MetricsRegistry::new();
        registry.record_error(&AppError::validation("question", "empty"));
        registry.record_error(&AppError::Timeout {
            operation: "synthesis".into(),
            timeout_ms: 5000,
        });
        registry.record_error(&AppError::unavailable("retriever", "index missing"));

        let errors = registry.snapshot().errors;
        assert_eq!(errors.validation, 1);
        assert_eq!(errors.timeout, 1);
        assert_eq!(errors.dependency, 1);
        assert_eq!(errors.internal, 0);
        assert_eq!(errors.total, 3);
    }

    #[test]
    fn test_reset() {
        let registry = MetricsRegistry::new();
        registry.record_question(true);
        registry.record_request(true, Duration::from_millis(5));
        registry.reset();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.questions.total, 0);
        assert_eq!(snapshot.requests.total, 0);
        assert_eq!(snapshot.first_request, None);
    }

    #[test]
    fn test_concurrent_increments() {
        let registry = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.record_question(false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.snapshot().questions.total, 8000);
    }

    #[test]
    fn test_record_stage_does_not_panic() {
        let registry = MetricsRegistry::new();
        registry.record_stage(
            &TraceId::new(),
            "retrieval",
            StageOutcome::Degraded,
            Duration::from_millis(3),
        );
    }
}
