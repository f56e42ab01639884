//! Pipeline orchestrator
//!
//! RECEIVED → PLANNED → {RETRIEVING, COMPUTING} → SYNTHESIZING → DONE.
//! Retrieval and computation run concurrently; synthesis waits for both.
//! Stage failures become partial results: a failed retrieval is an empty
//! context, a rejected calculation is an inline note, and a synthesis that
//! still fails after its retry is replaced by a templated answer. Only
//! question validation and a caller deadline surface as errors.

use crate::decision::{Decision, DecisionEngine};
use crate::fallback::fallback_answer;
use crate::report::{
    collect_citations, AnswerEnvelope, AnswerSource, ComputationOutcome, PipelineRun,
    StageTiming, SynthesisOutcome,
};
use crate::retry::RetryPolicy;
use crate::synthesis::{SynthesisRequest, Synthesizer};
use geoqa_common::config::{AppConfig, LimitsConfig};
use geoqa_common::errors::{AppError, Result, TracedError};
use geoqa_common::metrics::{MetricsRegistry, StageOutcome, ToolKind};
use geoqa_common::trace::TraceId;
use geoqa_search::{RetrievedChunk, Retriever};
use geoqa_tools::CalculatorKind;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// A validated question
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    text: String,
    context: Option<String>,
}

impl Question {
    /// Trim and check lengths; blank context is treated as absent
    pub fn parse(text: &str, context: Option<&str>, limits: &LimitsConfig) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::validation("question", "Question cannot be empty"));
        }
        let length = text.chars().count();
        if length > limits.max_question_length {
            return Err(AppError::validation(
                "question",
                format!(
                    "Question exceeds {} characters (got {})",
                    limits.max_question_length, length
                ),
            ));
        }

        let context = context.map(str::trim).filter(|c| !c.is_empty());
        if let Some(context) = context {
            let length = context.chars().count();
            if length > limits.max_context_length {
                return Err(AppError::validation(
                    "context",
                    format!(
                        "Context exceeds {} characters (got {})",
                        limits.max_context_length, length
                    ),
                ));
            }
        }

        Ok(Self {
            text: text.to_string(),
            context: context.map(str::to_string),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

fn tool_kind(kind: CalculatorKind) -> ToolKind {
    match kind {
        CalculatorKind::BearingCapacity => ToolKind::BearingCapacity,
        CalculatorKind::Settlement => ToolKind::Settlement,
    }
}

/// Answers questions by coordinating decision, retrieval, calculators and
/// synthesis
pub struct Orchestrator {
    decision: DecisionEngine,
    retriever: Arc<dyn Retriever>,
    synthesizer: Arc<dyn Synthesizer>,
    metrics: Arc<MetricsRegistry>,
    retry: RetryPolicy,
    limits: LimitsConfig,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        synthesizer: Arc<dyn Synthesizer>,
        metrics: Arc<MetricsRegistry>,
        config: &AppConfig,
    ) -> Result<Self> {
        Ok(Self {
            decision: DecisionEngine::new()?,
            retriever,
            synthesizer,
            metrics,
            retry: RetryPolicy::from_config(&config.llm),
            limits: config.limits.clone(),
            top_k: config.retrieval.effective_top_k(),
        })
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Answer under a fresh trace id
    pub async fn answer(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> std::result::Result<AnswerEnvelope, TracedError> {
        self.answer_traced(TraceId::new(), question, context).await
    }

    /// Answer under a trace id assigned by the caller
    pub async fn answer_traced(
        &self,
        trace_id: TraceId,
        question: &str,
        context: Option<&str>,
    ) -> std::result::Result<AnswerEnvelope, TracedError> {
        self.run(trace_id, question, context)
            .await
            .map(|run| run.answer)
    }

    /// Like `run`, but gives up once `deadline` elapses. The in-flight
    /// synthesis call is dropped and the caller gets a timeout.
    pub async fn run_with_deadline(
        &self,
        trace_id: TraceId,
        question: &str,
        context: Option<&str>,
        deadline: Duration,
    ) -> std::result::Result<PipelineRun, TracedError> {
        let started = Instant::now();
        match tokio::time::timeout(deadline, self.run(trace_id.clone(), question, context)).await {
            Ok(result) => result,
            Err(_) => {
                let error = AppError::Timeout {
                    operation: "answer".to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                };
                warn!(trace_id = %trace_id, timeout_ms = deadline.as_millis() as u64, "Request deadline elapsed");
                self.metrics.record_error(&error);
                self.metrics.record_request(false, started.elapsed());
                Err(TracedError::new(trace_id, error))
            }
        }
    }

    /// Validate the question and run every stage, returning the full report
    #[instrument(skip_all, fields(trace_id = %trace_id))]
    pub async fn run(
        &self,
        trace_id: TraceId,
        question: &str,
        context: Option<&str>,
    ) -> std::result::Result<PipelineRun, TracedError> {
        let started = Instant::now();

        let question = match Question::parse(question, context, &self.limits) {
            Ok(question) => question,
            Err(error) => {
                warn!(error = %error, "Question rejected");
                self.metrics.record_error(&error);
                self.metrics.record_request(false, started.elapsed());
                return Err(TracedError::new(trace_id, error));
            }
        };

        self.metrics.record_question(question.context().is_some());
        let run = self.execute(trace_id, &question).await;
        self.metrics.record_request(true, started.elapsed());

        info!(
            action = %run.decision.plan.action(),
            chunks = run.chunks.len(),
            citations = run.answer.citations.len(),
            source = ?run.synthesis.source,
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Question answered"
        );

        Ok(run)
    }

    fn finish_stage(
        &self,
        trace_id: &TraceId,
        timings: &mut Vec<StageTiming>,
        stage: &'static str,
        outcome: StageOutcome,
        duration: Duration,
    ) {
        self.metrics.record_stage(trace_id, stage, outcome, duration);
        timings.push(StageTiming {
            stage,
            outcome: outcome.as_str(),
            duration_ms: duration.as_secs_f64() * 1000.0,
        });
    }

    async fn execute(&self, trace_id: TraceId, question: &Question) -> PipelineRun {
        let mut timings = Vec::with_capacity(4);

        let started = Instant::now();
        let decision: Decision = self.decision.classify(question.text(), question.context());
        self.finish_stage(&trace_id, &mut timings, "decision", StageOutcome::Success, started.elapsed());
        info!(
            action = %decision.plan.action(),
            reasoning = %decision.reasoning,
            "Question planned"
        );

        let retrieval = async {
            if !decision.plan.needs_retrieval() {
                return None;
            }
            let started = Instant::now();
            let result = self.retriever.search(question.text(), self.top_k).await;
            Some((result, started.elapsed()))
        };
        let computation = async {
            let started = Instant::now();
            let outcome = match (decision.plan.calculation(), &decision.rejected) {
                (Some(request), _) => match request.compute() {
                    Ok(result) => ComputationOutcome::Completed(result),
                    Err(error) => ComputationOutcome::Failed {
                        calculator: request.kind(),
                        error,
                    },
                },
                // Rejected during planning; reported like a failed calculation
                (None, Some(rejected)) => ComputationOutcome::Failed {
                    calculator: rejected.request.kind(),
                    error: rejected.error.clone(),
                },
                (None, None) => return None,
            };
            Some((outcome, started.elapsed()))
        };
        let (retrieval, computation) = tokio::join!(retrieval, computation);

        let chunks: Vec<RetrievedChunk> = match retrieval {
            None => Vec::new(),
            Some((Ok(chunks), elapsed)) => {
                self.finish_stage(&trace_id, &mut timings, "retrieval", StageOutcome::Success, elapsed);
                chunks
            }
            Some((Err(error), elapsed)) => {
                warn!(error = %error, "Retrieval failed, continuing without context");
                self.metrics.record_error(&error);
                self.finish_stage(&trace_id, &mut timings, "retrieval", StageOutcome::Degraded, elapsed);
                Vec::new()
            }
        };

        let computation = match computation {
            None => None,
            Some((outcome, elapsed)) => {
                let success = outcome.result().is_some();
                self.metrics.record_tool_call(tool_kind(outcome.calculator()), success);
                let stage_outcome = if success {
                    StageOutcome::Success
                } else {
                    if let ComputationOutcome::Failed { error, .. } = &outcome {
                        warn!(calculator = %outcome.calculator(), error = %error, "Calculation rejected");
                    }
                    StageOutcome::Degraded
                };
                self.finish_stage(&trace_id, &mut timings, "computation", stage_outcome, elapsed);
                Some(outcome)
            }
        };

        let request = SynthesisRequest {
            question: question.text(),
            context: question.context(),
            action: decision.plan.action(),
            chunks: &chunks,
            computation: computation.as_ref(),
        };

        let started = Instant::now();
        let (mut answer, synthesis) = self.synthesize(&request).await;
        let stage_outcome = match synthesis.source {
            AnswerSource::LanguageModel => StageOutcome::Success,
            AnswerSource::Fallback => StageOutcome::Degraded,
        };
        self.finish_stage(&trace_id, &mut timings, "synthesis", stage_outcome, started.elapsed());

        if let Some(note) = computation.as_ref().and_then(ComputationOutcome::failure_note) {
            answer.push_str("\n\n");
            answer.push_str(&note);
        }

        let citations = collect_citations(&chunks, self.limits.max_citations);

        PipelineRun {
            answer: AnswerEnvelope {
                answer,
                citations,
                trace_id: trace_id.clone(),
            },
            trace_id,
            decision,
            chunks,
            computation,
            synthesis,
            timings,
        }
    }

    /// Bounded-retry synthesis, falling back to a templated answer
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> (String, SynthesisOutcome) {
        if !self.synthesizer.is_available() {
            debug!("Synthesizer unavailable, using templated answer");
            return (
                fallback_answer(request),
                SynthesisOutcome {
                    source: AnswerSource::Fallback,
                    attempts: Vec::new(),
                    error: Some("language model not configured".to_string()),
                },
            );
        }

        let synthesizer = &self.synthesizer;
        let outcome = self
            .retry
            .run("synthesis", move |_| synthesizer.synthesize(request))
            .await;

        for report in &outcome.attempts {
            self.metrics.record_llm_call(report.succeeded(), report.attempt > 1);
        }

        match outcome.result {
            Ok(text) => (
                text,
                SynthesisOutcome {
                    source: AnswerSource::LanguageModel,
                    attempts: outcome.attempts,
                    error: None,
                },
            ),
            Err(error) => {
                warn!(
                    error = %error,
                    attempts = outcome.attempts.len(),
                    "Synthesis failed, using templated answer"
                );
                self.metrics.record_error(&error);
                (
                    fallback_answer(request),
                    SynthesisOutcome {
                        source: AnswerSource::Fallback,
                        attempts: outcome.attempts,
                        error: Some(error.to_string()),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Action, ActionPlan};
    use crate::synthesis::LlmSynthesizer;
    use async_trait::async_trait;
    use geoqa_common::config::LlmConfig;
    use geoqa_common::embeddings::HashingEmbedder;
    use geoqa_common::errors::ErrorKind;
    use geoqa_common::llm::{create_language_model, CompletionOptions};
    use geoqa_ingestion::chunker::ChunkingConfig;
    use geoqa_ingestion::loader::{extract_title, Document};
    use geoqa_search::{VectorIndex, VectorRetriever};
    use geoqa_tools::{BearingCapacityParams, CalculationRequest};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    const BEARING_QUESTION: &str = "Calculate the bearing capacity for a 2m wide foundation with soil unit weight 18 kN/m³, depth 1.5m, and friction angle 30°";

    const KNOWLEDGE_BASE: [(&str, &str); 6] = [
        ("cpt_analysis.md", include_str!("../../../knowledge_base/cpt_analysis.md")),
        ("settlement_analysis.md", include_str!("../../../knowledge_base/settlement_analysis.md")),
        ("shear_strength.md", include_str!("../../../knowledge_base/shear_strength.md")),
        ("soil_classification.md", include_str!("../../../knowledge_base/soil_classification.md")),
        ("standard_penetration_test.md", include_str!("../../../knowledge_base/standard_penetration_test.md")),
        ("terzaghi_bearing_capacity.md", include_str!("../../../knowledge_base/terzaghi_bearing_capacity.md")),
    ];

    async fn seed_index() -> VectorIndex {
        let documents: Vec<Document> = KNOWLEDGE_BASE
            .iter()
            .map(|(source, content)| {
                let stem = source.trim_end_matches(".md");
                Document {
                    source: source.to_string(),
                    stem: stem.to_string(),
                    title: extract_title(content, stem),
                    content: content.to_string(),
                    path: PathBuf::from("knowledge_base").join(source),
                }
            })
            .collect();
        geoqa_ingestion::build_index(&documents, &HashingEmbedder::new(384), &ChunkingConfig::default())
            .await
            .unwrap()
    }

    /// Retriever over the seed notes that counts its calls
    struct CountingRetriever {
        inner: VectorRetriever,
        calls: AtomicU32,
    }

    impl CountingRetriever {
        async fn seeded() -> Arc<Self> {
            Arc::new(Self {
                inner: VectorRetriever::new(Arc::new(HashingEmbedder::new(384)), Arc::new(seed_index().await)),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Retriever for CountingRetriever {
        async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.search(query, top_k).await
        }

        fn indexed_chunks(&self) -> usize {
            self.inner.indexed_chunks()
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievedChunk>> {
            Err(AppError::unavailable("vector_index", "index not loaded"))
        }

        fn indexed_chunks(&self) -> usize {
            0
        }
    }

    enum Script {
        Reply(&'static str),
        Hang,
    }

    struct ScriptedSynthesizer {
        script: Script,
        calls: AtomicU32,
    }

    impl ScriptedSynthesizer {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Synthesizer for ScriptedSynthesizer {
        async fn synthesize(&self, _request: &SynthesisRequest<'_>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Reply(text) => Ok(text.to_string()),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    fn orchestrator(retriever: Arc<dyn Retriever>, synthesizer: Arc<dyn Synthesizer>) -> Orchestrator {
        Orchestrator::new(
            retriever,
            synthesizer,
            Arc::new(MetricsRegistry::new()),
            &AppConfig::default(),
        )
        .unwrap()
    }

    fn unconfigured_synthesizer() -> Arc<dyn Synthesizer> {
        let model = create_language_model(&LlmConfig::default()).unwrap();
        Arc::new(LlmSynthesizer::new(model, CompletionOptions::default()))
    }

    fn q_ult(run: &PipelineRun) -> f64 {
        run.computation
            .as_ref()
            .and_then(ComputationOutcome::result)
            .and_then(|r| r.primary())
            .map(|q| q.value)
            .unwrap()
    }

    #[tokio::test]
    async fn test_definition_question_cites_cpt_note() {
        let synthesizer = ScriptedSynthesizer::new(Script::Reply(
            "CPT analysis interprets cone resistance and sleeve friction.",
        ));
        let orchestrator = orchestrator(CountingRetriever::seeded().await, synthesizer.clone());
        let trace_id = TraceId::new();

        let run = assert_ok!(orchestrator.run(trace_id.clone(), "What is CPT analysis?", None).await);

        assert_eq!(run.decision.plan, ActionPlan::Retrieve);
        assert!(!run.answer.answer.is_empty());
        assert!(run.answer.citations.iter().any(|c| c.source == "cpt_analysis.md"));
        assert_eq!(run.chunks[0].source, "cpt_analysis.md");
        assert_eq!(run.answer.trace_id, trace_id);
        assert_eq!(run.trace_id, trace_id);
        assert_eq!(run.synthesis.source, AnswerSource::LanguageModel);
        assert_eq!(synthesizer.calls(), 1);

        let confidences: Vec<f32> = run.answer.citations.iter().map(|c| c.confidence).collect();
        assert!(confidences.windows(2).all(|w| w[0] >= w[1]));
        assert!(confidences.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[tokio::test]
    async fn test_bearing_capacity_question_computes() {
        let retriever = CountingRetriever::seeded().await;
        let orchestrator = orchestrator(retriever.clone(), unconfigured_synthesizer());

        let run = assert_ok!(orchestrator.run(TraceId::new(), BEARING_QUESTION, None).await);

        assert_eq!(
            run.decision.plan,
            ActionPlan::Compute(CalculationRequest::BearingCapacity(BearingCapacityParams {
                width: 2.0,
                unit_weight: 18.0,
                depth: 1.5,
                friction_angle: 30.0,
            }))
        );
        assert!((q_ult(&run) - 962.1).abs() < 1e-9);
        assert!(run.answer.answer.contains("962.10"));
        assert!(run.answer.citations.is_empty());
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert_eq!(run.synthesis.source, AnswerSource::Fallback);
        assert!(run.synthesis.attempts.is_empty());

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.tool_calls.bearing_capacity, 1);
        assert_eq!(snapshot.llm.calls, 0);
        assert_eq!(snapshot.requests.successful, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_timeouts_fall_back_after_one_retry() {
        let synthesizer = ScriptedSynthesizer::new(Script::Hang);
        let orchestrator = orchestrator(CountingRetriever::seeded().await, synthesizer.clone());

        let run = assert_ok!(orchestrator.run(TraceId::new(), BEARING_QUESTION, None).await);

        assert_eq!(synthesizer.calls(), 2);
        assert_eq!(run.synthesis.source, AnswerSource::Fallback);
        assert_eq!(run.synthesis.attempts.len(), 2);
        assert!(run.answer.answer.contains("962.10"));
        assert!(run.synthesis.error.is_some());

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.llm.calls, 2);
        assert_eq!(snapshot.llm.failures, 2);
        assert_eq!(snapshot.llm.retries, 1);
        assert_eq!(snapshot.errors.timeout, 1);
        assert_eq!(snapshot.requests.successful, 1);
    }

    #[tokio::test]
    async fn test_overlong_question_rejected_before_any_stage() {
        let retriever = CountingRetriever::seeded().await;
        let synthesizer = ScriptedSynthesizer::new(Script::Reply("unused"));
        let orchestrator = orchestrator(retriever.clone(), synthesizer.clone());

        let question = "a".repeat(2001);
        let err = assert_err!(orchestrator.answer(&question, None).await);

        assert_eq!(err.error.kind(), ErrorKind::ClientError);
        assert!(matches!(err.error, AppError::Validation { ref field, .. } if field.as_deref() == Some("question")));
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 0);
        assert_eq!(synthesizer.calls(), 0);

        let snapshot = orchestrator.metrics().snapshot();
        assert_eq!(snapshot.requests.failed, 1);
        assert_eq!(snapshot.errors.validation, 1);
        assert_eq!(snapshot.questions.total, 0);
        assert_eq!(snapshot.tool_calls.total, 0);
    }

    #[tokio::test]
    async fn test_question_limits() {
        let limits = LimitsConfig::default();
        assert_ok!(Question::parse(&"a".repeat(2000), None, &limits));
        assert_err!(Question::parse("   ", None, &limits));
        assert_err!(Question::parse("q", Some(&"c".repeat(5001)), &limits));

        let question = assert_ok!(Question::parse("  What is CPT?  ", Some("   "), &limits));
        assert_eq!(question.text(), "What is CPT?");
        assert_eq!(question.context(), None);
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_empty_context() {
        let synthesizer = ScriptedSynthesizer::new(Script::Reply("Settlement is about 5 mm."));
        let orchestrator = orchestrator(Arc::new(FailingRetriever), synthesizer.clone());

        let run = assert_ok!(
            orchestrator
                .run(TraceId::new(), "What is the settlement for load=100 kN and E=20000 kPa?", None)
                .await
        );

        assert_eq!(run.decision.plan.action(), Action::Both);
        assert!(run.chunks.is_empty());
        assert!(run.answer.citations.is_empty());
        assert_eq!(run.answer.answer, "Settlement is about 5 mm.");
        assert!(run.timings.iter().any(|t| t.stage == "retrieval" && t.outcome == "degraded"));
        assert_eq!(orchestrator.metrics().snapshot().errors.dependency, 1);
    }

    #[tokio::test]
    async fn test_nothing_available_still_answers() {
        let orchestrator = orchestrator(Arc::new(FailingRetriever), unconfigured_synthesizer());
        let envelope = assert_ok!(orchestrator.answer("What is CPT analysis?", None).await);
        assert!(envelope.answer.contains("unable to answer"));
        assert!(envelope.citations.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_calculation_reported_inline() {
        let synthesizer = ScriptedSynthesizer::new(Script::Reply("The friction angle is outside the supported range."));
        let retriever = CountingRetriever::seeded().await;
        let orchestrator = orchestrator(retriever.clone(), synthesizer);

        let run = assert_ok!(
            orchestrator
                .run(TraceId::new(), "Calculate bearing capacity for B=2, gamma=18, Df=1.5, phi=50", None)
                .await
        );

        assert_eq!(run.decision.plan, ActionPlan::Retrieve);
        assert!(run.decision.rejected.is_some());
        assert_eq!(retriever.calls.load(Ordering::SeqCst), 1);
        assert!(!run.answer.citations.is_empty());
        assert!(matches!(run.computation, Some(ComputationOutcome::Failed { .. })));
        assert!(run.answer.answer.starts_with("The friction angle is outside"));
        assert!(run
            .answer
            .answer
            .contains("Note: the Terzaghi bearing capacity calculation could not be performed (invalid phi"));
        assert_eq!(orchestrator.metrics().snapshot().tool_calls.failures, 1);
    }

    #[tokio::test]
    async fn test_rejected_calculation_fallback_quotes_knowledge_base() {
        let orchestrator = orchestrator(CountingRetriever::seeded().await, unconfigured_synthesizer());

        let envelope = assert_ok!(
            orchestrator
                .answer("Calculate bearing capacity for B=2, gamma=18, Df=1.5, phi=50", None)
                .await
        );

        assert!(envelope.answer.starts_with("According to "));
        assert!(!envelope.answer.contains("could not be completed with the values provided"));
        assert!(envelope.answer.ends_with("(invalid phi: friction angle must be between 0 and 45 degrees, got 50)."));
        assert!(!envelope.citations.is_empty());
    }

    #[tokio::test]
    async fn test_context_fills_parameters_and_is_counted() {
        let orchestrator = orchestrator(CountingRetriever::seeded().await, unconfigured_synthesizer());
        let run = assert_ok!(
            orchestrator
                .run(
                    TraceId::new(),
                    "Estimate the settlement of this footing",
                    Some("Column load of 500 kN, Young's modulus E = 20000 kPa, footing width 2 m"),
                )
                .await
        );

        match run.computation.as_ref().and_then(ComputationOutcome::result) {
            Some(result) => assert!((result.primary().unwrap().value - 12.5).abs() < 1e-9),
            None => panic!("expected a settlement result, got {:?}", run.computation),
        }
        assert_eq!(orchestrator.metrics().snapshot().questions.with_context, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_synthesis() {
        let synthesizer = ScriptedSynthesizer::new(Script::Hang);
        let orchestrator = orchestrator(CountingRetriever::seeded().await, synthesizer.clone());
        let trace_id = TraceId::new();

        let err = assert_err!(
            orchestrator
                .run_with_deadline(trace_id.clone(), "What is CPT analysis?", None, Duration::from_secs(1))
                .await
        );

        assert_eq!(err.trace_id, trace_id);
        assert_eq!(err.error.kind(), ErrorKind::Timeout);
        assert_eq!(synthesizer.calls(), 1);
        assert_eq!(orchestrator.metrics().snapshot().requests.failed, 1);
    }

    #[tokio::test]
    async fn test_stage_timings_recorded() {
        let synthesizer = ScriptedSynthesizer::new(Script::Reply("Both explained."));
        let orchestrator = orchestrator(CountingRetriever::seeded().await, synthesizer);
        let run = assert_ok!(
            orchestrator
                .run(
                    TraceId::new(),
                    "Explain bearing capacity and calculate it for B=2, Df=1.5, gamma=18, phi=30",
                    None,
                )
                .await
        );

        assert_eq!(run.decision.plan.action(), Action::Both);
        let stages: Vec<&str> = run.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stages[0], "decision");
        assert!(stages.contains(&"retrieval"));
        assert!(stages.contains(&"computation"));
        assert_eq!(*stages.last().unwrap(), "synthesis");
        assert!(!run.answer.citations.is_empty());
    }
}
