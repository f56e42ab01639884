//! Pipeline outputs: the answer envelope and the per-run report

use crate::decision::Decision;
use crate::retry::AttemptReport;
use geoqa_common::trace::TraceId;
use geoqa_search::RetrievedChunk;
use geoqa_tools::{CalculatorKind, ComputationResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cited knowledge-base document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub confidence: f32,
}

/// The only value returned across the system boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub trace_id: TraceId,
}

/// Result of the computation stage
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComputationOutcome {
    Completed(ComputationResult),
    Failed {
        calculator: CalculatorKind,
        #[serde(serialize_with = "serialize_display")]
        error: ValidationError,
    },
}

fn serialize_display<S: serde::Serializer>(
    error: &ValidationError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

impl ComputationOutcome {
    pub fn calculator(&self) -> CalculatorKind {
        match self {
            ComputationOutcome::Completed(result) => result.calculator,
            ComputationOutcome::Failed { calculator, .. } => *calculator,
        }
    }

    pub fn result(&self) -> Option<&ComputationResult> {
        match self {
            ComputationOutcome::Completed(result) => Some(result),
            ComputationOutcome::Failed { .. } => None,
        }
    }

    /// Citation-free note describing a rejected calculation
    pub fn failure_note(&self) -> Option<String> {
        match self {
            ComputationOutcome::Completed(_) => None,
            ComputationOutcome::Failed { calculator, error } => Some(format!(
                "Note: the {} calculation could not be performed ({}).",
                calculator.display_name(),
                error
            )),
        }
    }
}

/// Where the final answer text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    LanguageModel,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesisOutcome {
    pub source: AnswerSource,
    pub attempts: Vec<AttemptReport>,
    /// Last error when the fallback was used
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: &'static str,
    pub outcome: &'static str,
    pub duration_ms: f64,
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub trace_id: TraceId,
    pub decision: Decision,
    pub chunks: Vec<RetrievedChunk>,
    pub computation: Option<ComputationOutcome>,
    pub synthesis: SynthesisOutcome,
    pub timings: Vec<StageTiming>,
    pub answer: AnswerEnvelope,
}

/// Deduplicate by source keeping the highest confidence, order by
/// descending confidence (ties keep retrieval order), cap at `limit`
pub fn collect_citations(chunks: &[RetrievedChunk], limit: usize) -> Vec<Citation> {
    let mut best: HashMap<&str, usize> = HashMap::new();
    let mut citations: Vec<Citation> = Vec::new();

    for chunk in chunks {
        match best.get(chunk.source.as_str()) {
            Some(&slot) => {
                if chunk.confidence > citations[slot].confidence {
                    citations[slot].confidence = chunk.confidence;
                }
            }
            None => {
                best.insert(chunk.source.as_str(), citations.len());
                citations.push(Citation {
                    source: chunk.source.clone(),
                    confidence: chunk.confidence.clamp(0.0, 1.0),
                });
            }
        }
    }

    citations.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    citations.truncate(limit);
    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, confidence: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{source}_chunk_0"),
            source: source.to_string(),
            title: source.to_string(),
            content: String::new(),
            score: confidence,
            confidence,
        }
    }

    #[test]
    fn test_citations_dedup_and_sort() {
        let chunks = vec![
            chunk("a.md", 0.4),
            chunk("b.md", 0.7),
            chunk("a.md", 0.9),
            chunk("c.md", 0.7),
        ];
        let citations = collect_citations(&chunks, 3);
        let sources: Vec<&str> = citations.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, ["a.md", "b.md", "c.md"]);
        assert_eq!(citations[0].confidence, 0.9);
    }

    #[test]
    fn test_citations_capped() {
        let chunks: Vec<_> = (0..5).map(|i| chunk(&format!("{i}.md"), 0.5)).collect();
        assert_eq!(collect_citations(&chunks, 3).len(), 3);
        assert!(collect_citations(&[], 3).is_empty());
    }

    #[test]
    fn test_failure_note_names_parameter() {
        let outcome = ComputationOutcome::Failed {
            calculator: CalculatorKind::BearingCapacity,
            error: ValidationError::new("phi", "friction angle must be between 0 and 45 degrees, got 50"),
        };
        let note = outcome.failure_note().unwrap();
        assert!(note.contains("Terzaghi bearing capacity"));
        assert!(note.contains("phi"));
    }
}
