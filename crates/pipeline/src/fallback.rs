//! Deterministic answers used when synthesis is unavailable
//!
//! Built only from calculation results and retrieved text, so they always
//! succeed and never return an empty string.

use crate::report::ComputationOutcome;
use crate::synthesis::{truncate_chars, SynthesisRequest};
use geoqa_search::RetrievedChunk;
use geoqa_tools::ComputationResult;
use std::fmt::Write;

/// Longest knowledge-base excerpt quoted in a fallback answer
pub const FALLBACK_EXCERPT_CHARS: usize = 400;

const UNABLE_TO_ANSWER: &str = "I'm unable to answer this question right now: no relevant \
    reference material was found and the answer service is unavailable. Please try again later \
    or rephrase the question.";

/// Templated answer for `request`; calculation failure notes are appended
/// by the caller
pub fn fallback_answer(request: &SynthesisRequest<'_>) -> String {
    let top_chunk = request.chunks.first();

    match request.computation.and_then(ComputationOutcome::result) {
        Some(result) => {
            let mut answer = computation_summary(result);
            if let Some(chunk) = top_chunk {
                let _ = write!(answer, "\n\nRelated reference: {} ({}).", chunk.title, chunk.source);
            }
            answer
        }
        None => match top_chunk {
            Some(chunk) => excerpt_answer(chunk),
            None if request.computation.is_some() => {
                "The requested calculation could not be completed with the values provided."
                    .to_string()
            }
            None => UNABLE_TO_ANSWER.to_string(),
        },
    }
}

fn computation_summary(result: &ComputationResult) -> String {
    let mut text = format!("{}: {}.", result.calculator.display_name(), result.summary());
    let _ = write!(text, "\nFormula: {}", result.formula);
    if !result.inputs.is_empty() {
        let inputs: Vec<String> = result.inputs.iter().map(|q| q.to_string()).collect();
        let _ = write!(text, "\nInputs: {}", inputs.join(", "));
    }
    for step in &result.steps {
        let _ = write!(text, "\n- {}", step);
    }
    for note in &result.notes {
        let _ = write!(text, "\nNote: {}", note);
    }
    text
}

/// Quote the start of the best chunk, cut at a sentence end when possible
fn excerpt_answer(chunk: &RetrievedChunk) -> String {
    let content = chunk.content.trim();
    let (excerpt, truncated) = truncate_chars(content, FALLBACK_EXCERPT_CHARS);
    let excerpt = if truncated {
        match excerpt.rfind(". ") {
            Some(end) if end > 0 => &excerpt[..=end],
            _ => excerpt,
        }
    } else {
        excerpt
    };

    format!(
        "According to {} ({}): {}{}",
        chunk.title,
        chunk.source,
        excerpt,
        if truncated && !excerpt.ends_with('.') { "..." } else { "" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Action;
    use geoqa_ingestion::chunker::{chunk_document, ChunkingConfig};
    use geoqa_ingestion::loader::Document;
    use std::path::PathBuf;
    use geoqa_tools::{CalculationRequest, CalculatorKind, SettlementParams, ValidationError};

    fn chunk(content: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "cpt_analysis_chunk_0".into(),
            source: "cpt_analysis.md".into(),
            title: "CPT Analysis".into(),
            content: content.into(),
            score: 0.8,
            confidence: 0.8,
        }
    }

    fn request<'a>(
        chunks: &'a [RetrievedChunk],
        computation: Option<&'a ComputationOutcome>,
    ) -> SynthesisRequest<'a> {
        SynthesisRequest {
            question: "q",
            context: None,
            action: Action::Both,
            chunks,
            computation,
        }
    }

    #[test]
    fn test_computation_fallback_reports_value() {
        let result = CalculationRequest::Settlement(SettlementParams {
            load: 100.0,
            modulus: 10_000.0,
            width: None,
        })
        .compute()
        .unwrap();
        let outcome = ComputationOutcome::Completed(result);
        let chunks = [chunk("Settlement is vertical displacement.")];
        let answer = fallback_answer(&request(&chunks, Some(&outcome)));
        assert!(answer.starts_with("Elastic settlement: elastic settlement s = 10.00 mm."));
        assert!(answer.contains("Formula: s = P / (E · B) × 1000"));
        assert!(answer.contains("Related reference: CPT Analysis (cpt_analysis.md)."));
    }

    #[test]
    fn test_excerpt_fallback_cuts_at_sentence() {
        let sentence = "The cone penetration test pushes a cone into soil. ";
        let content = sentence.repeat(20);
        let answer = fallback_answer(&request(&[chunk(&content)], None));
        assert!(answer.starts_with("According to CPT Analysis (cpt_analysis.md): The cone"));
        assert!(answer.ends_with("into soil."));
        assert!(answer.len() < content.len());
    }

    #[test]
    fn test_excerpt_from_indexed_note() {
        let document = Document {
            source: "cpt_analysis.md".into(),
            stem: "cpt_analysis".into(),
            title: "CPT Analysis".into(),
            content: include_str!("../../../knowledge_base/cpt_analysis.md").into(),
            path: PathBuf::from("cpt_analysis.md"),
        };
        let indexed = chunk_document(&document, &ChunkingConfig::default());
        let chunks = [chunk(&indexed[0].content)];

        let answer = fallback_answer(&request(&chunks, None));
        assert!(answer.starts_with("According to CPT Analysis (cpt_analysis.md): The Cone"));
        assert!(answer.ends_with('.'));
        assert!(!answer.ends_with("..."));
        assert!(!answer.contains('#'));
        assert!(answer.chars().count() < FALLBACK_EXCERPT_CHARS + 60);
    }

    #[test]
    fn test_nothing_available() {
        let answer = fallback_answer(&request(&[], None));
        assert_eq!(answer, UNABLE_TO_ANSWER);

        let failed = ComputationOutcome::Failed {
            calculator: CalculatorKind::Settlement,
            error: ValidationError::new("load", "must be greater than 0"),
        };
        let answer = fallback_answer(&request(&[], Some(&failed)));
        assert!(!answer.is_empty());
    }
}
