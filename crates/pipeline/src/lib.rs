//! Geotech Q&A Pipeline
//!
//! Decides per question whether to retrieve, compute or both, runs those
//! stages, and synthesizes one cited answer:
//! - Decision: pattern-driven intent and parameter extraction
//! - Retry: bounded attempts with per-attempt timeouts
//! - Synthesis: prompt assembly over a language model
//! - Fallback: deterministic answers when synthesis is unavailable
//! - Orchestrator: stage coordination, metrics and the answer envelope

pub mod decision;
pub mod fallback;
pub mod orchestrator;
pub mod report;
pub mod retry;
pub mod synthesis;

pub use decision::{Action, ActionPlan, Decision, DecisionEngine, ExtractedParameters, RejectedCalculation};
pub use orchestrator::{Orchestrator, Question};
pub use report::{AnswerEnvelope, AnswerSource, Citation, ComputationOutcome, PipelineRun};
pub use retry::RetryPolicy;
pub use synthesis::{LlmSynthesizer, SynthesisRequest, Synthesizer};
