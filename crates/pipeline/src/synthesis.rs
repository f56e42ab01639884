//! LLM Synthesizer - turns retrieved context and calculation results into
//! a natural-language answer
//!
//! The synthesizer is a fallible remote call; the orchestrator owns the
//! timeout, retry and fallback policy around it.

use crate::decision::Action;
use crate::report::ComputationOutcome;
use async_trait::async_trait;
use geoqa_common::errors::{AppError, Result};
use geoqa_common::llm::{CompletionOptions, LanguageModel};
use geoqa_search::RetrievedChunk;
use std::fmt::Write;
use std::sync::Arc;

/// Chunks included in the prompt
pub const PROMPT_CHUNKS: usize = 2;

/// Longest excerpt of a non-formula chunk placed in the prompt
pub const EXCERPT_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You are a geotechnical engineering expert. \
    Answer precisely, using the supplied reference material and calculation results. \
    Do not invent values that are not given.";

/// Everything the synthesizer may use for one answer
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub question: &'a str,
    pub context: Option<&'a str>,
    pub action: Action,
    pub chunks: &'a [RetrievedChunk],
    pub computation: Option<&'a ComputationOutcome>,
}

/// Answer generator
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<String>;

    /// False when every call is known to fail, so callers skip straight to
    /// their fallback
    fn is_available(&self) -> bool {
        true
    }
}

/// Synthesizer backed by a `LanguageModel`
pub struct LlmSynthesizer {
    model: Arc<dyn LanguageModel>,
    options: CompletionOptions,
}

impl LlmSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, mut options: CompletionOptions) -> Self {
        if options.system_prompt.is_none() {
            options.system_prompt = Some(SYSTEM_PROMPT.to_string());
        }
        Self { model, options }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> Result<String> {
        let prompt = build_prompt(request);
        let completion = self.model.complete(&prompt, &self.options).await?;
        let answer = strip_answer_prefix(&completion);
        if answer.is_empty() {
            return Err(AppError::unavailable(self.model.name(), "empty completion"));
        }
        Ok(answer.to_string())
    }

    fn is_available(&self) -> bool {
        self.model.is_configured()
    }
}

fn task_instruction(action: Action) -> &'static str {
    match action {
        Action::Retrieve => {
            "Answer the question using the reference material. Be concise (under 150 words) \
             and mention which source the information comes from."
        }
        Action::Compute => {
            "Present the calculation result with its formula and inputs, then interpret the value \
             in one or two sentences. Be concise (under 150 words)."
        }
        Action::Both => {
            "Explain the concept using the reference material, then present and interpret the \
             calculation result. Be concise (under 150 words)."
        }
    }
}

/// Cut `text` to at most `max` characters on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (&text[..cut], true),
        None => (text, false),
    }
}

/// Chunks for the prompt: formula-bearing ones first when a calculation is
/// involved, stable otherwise
fn prompt_chunks<'a>(chunks: &'a [RetrievedChunk], action: Action) -> Vec<&'a RetrievedChunk> {
    let mut ordered: Vec<&RetrievedChunk> = chunks.iter().collect();
    if action != Action::Retrieve {
        ordered.sort_by_key(|c| !c.has_formula());
    }
    ordered.truncate(PROMPT_CHUNKS);
    ordered
}

/// Assemble the synthesis prompt
pub fn build_prompt(request: &SynthesisRequest<'_>) -> String {
    let mut prompt = String::new();

    let _ = writeln!(prompt, "Question: {}", request.question.trim());
    if let Some(context) = request.context {
        let _ = writeln!(prompt, "Additional context from the user: {}", context.trim());
    }
    let _ = writeln!(prompt, "\nTask: {}", task_instruction(request.action));

    let chunks = prompt_chunks(request.chunks, request.action);
    if !chunks.is_empty() {
        prompt.push_str("\nRelevant Knowledge Base Information:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            let content = chunk.content.trim();
            let (body, cut) = if chunk.has_formula() {
                (content, false)
            } else {
                truncate_chars(content, EXCERPT_CHARS)
            };
            let _ = writeln!(
                prompt,
                "{}. From {} (chunk_id: {}): {}{}",
                i + 1,
                chunk.source,
                chunk.chunk_id,
                body,
                if cut { "..." } else { "" }
            );
        }
    }

    match request.computation {
        Some(ComputationOutcome::Completed(result)) => {
            prompt.push_str("\nCalculation Results:\n");
            let _ = writeln!(prompt, "Calculator: {}", result.calculator.display_name());
            let _ = writeln!(prompt, "Formula: {}", result.formula);
            for quantity in result.inputs.iter().chain(result.outputs.iter()) {
                let _ = writeln!(prompt, "- {} ({})", quantity, quantity.name);
            }
            for step in &result.steps {
                let _ = writeln!(prompt, "  {}", step);
            }
            for note in &result.notes {
                let _ = writeln!(prompt, "Note: {}", note);
            }
        }
        Some(failed @ ComputationOutcome::Failed { .. }) => {
            prompt.push_str("\nCalculation Results:\n");
            if let Some(note) = failed.failure_note() {
                let _ = writeln!(prompt, "{}", note);
            }
            prompt.push_str("Explain briefly which input was rejected and why.\n");
        }
        None => {}
    }

    prompt.push_str("\nDo not start the reply with \"Answer:\".\n");
    prompt
}

fn strip_answer_prefix(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("answer:") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}
